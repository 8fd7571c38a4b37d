//! TCP listener and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{ServerError, ServerResult};
use super::handle::ServerHandle;
use super::tls::TlsIdentity;
use crate::config::ServerConfig;
use crate::handler::{Handler, HandlerContext, Services};
use crate::session::BoxedStream;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Accepts TCP connections and runs one session task per connection.
///
/// At most `max_connections` connection tasks exist at once. When the limit
/// is reached the listener stops calling `accept` until a task finishes, so
/// excess clients wait in the kernel backlog.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    handle: ServerHandle,
    limiter: Arc<Semaphore>,
    tls: Option<TlsAcceptor>,
    services: Services,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("tls", &self.tls.is_some())
            .field("available_permits", &self.limiter.available_permits())
            .finish_non_exhaustive()
    }
}

impl Listener {
    /// Validate `config` and bind to its listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or binding fails.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        Self::bind_with_handle(ServerHandle::new(config)?).await
    }

    /// Bind using an existing server handle.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind_with_handle(handle: ServerHandle) -> ServerResult<Self> {
        let addr = handle.config().listener.socket_addr();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError {
                address: addr,
                source: e,
            })?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError {
                address: addr,
                source: e,
            })?;

        info!(address = %local_addr, "WebSocket listener bound");

        let limiter = Arc::new(Semaphore::new(handle.config().max_connections));
        Ok(Self {
            listener,
            local_addr,
            handle,
            limiter,
            tls: None,
            services: Services::default(),
        })
    }

    /// Terminate TLS on every accepted connection.
    ///
    /// # Errors
    ///
    /// Returns an error if rustls rejects the identity.
    pub fn with_tls(mut self, identity: &TlsIdentity) -> ServerResult<Self> {
        self.tls = Some(identity.acceptor()?);
        Ok(self)
    }

    /// Dependencies handed to every handler context.
    #[must_use]
    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// The bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the server this listener feeds.
    #[must_use]
    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Connection slots currently free.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Serve with a fresh `H::default()` per connection.
    ///
    /// # Errors
    ///
    /// See [`Listener::serve_with`].
    pub async fn serve<H>(self, cancel: CancellationToken) -> ServerResult<()>
    where
        H: Handler + Default + 'static,
    {
        self.serve_with(|_: &HandlerContext| H::default(), cancel).await
    }

    /// Accept connections until `cancel` fires, creating one handler per
    /// connection with `factory`.
    ///
    /// On shutdown every session is cancelled and disposed, and this returns
    /// only after every connection task has finished.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AcceptError`] if accepting fails unrecoverably.
    pub async fn serve_with<H, F>(self, factory: F, cancel: CancellationToken) -> ServerResult<()>
    where
        H: Handler + 'static,
        F: Fn(&HandlerContext) -> H + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        let mut tasks = JoinSet::new();
        let nodelay = self.handle.config().listener.tcp_nodelay;

        info!(
            address = %self.local_addr,
            max_connections = self.handle.config().max_connections,
            tls = self.tls.is_some(),
            "Accept loop started"
        );

        let outcome = loop {
            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }

            let permit = tokio::select! {
                () = cancel.cancelled() => break Ok(()),
                permit = Arc::clone(&self.limiter).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let (stream, peer) = tokio::select! {
                () = cancel.cancelled() => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) if is_fatal_accept_error(&e) => {
                        error!(error = %e, "Fatal accept error");
                        break Err(ServerError::AcceptError(e));
                    },
                    Err(e) => {
                        self.handle.stats().record_accept_error();
                        warn!(error = %e, "Transient accept error");
                        drop(permit);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    },
                },
            };

            if let Err(e) = stream.set_nodelay(nodelay) {
                warn!(peer = %peer, error = %e, "Failed to configure stream");
            }
            self.handle.stats().record_accept();
            debug!(peer = %peer, "Accepted connection");

            let handle = self.handle.clone();
            let tls = self.tls.clone();
            let services = self.services.clone();
            let factory = Arc::clone(&factory);
            tasks.spawn(async move {
                serve_connection(handle, stream, peer, tls, services, &*factory).await;
                drop(permit);
            });
        };

        info!(active = tasks.len(), "Accept loop stopping, draining connections");
        self.handle.shutdown().await;
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        info!("Accept loop stopped");

        outcome
    }
}

async fn serve_connection<H, F>(
    handle: ServerHandle,
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    services: Services,
    factory: &F,
) where
    H: Handler + 'static,
    F: Fn(&HandlerContext) -> H,
{
    let stream: BoxedStream = match tls {
        Some(acceptor) => {
            let timeout = handle.config().upgrade_timeout;
            let accepted = tokio::select! {
                () = handle.cancellation_token().cancelled() => return,
                accepted = tokio::time::timeout(timeout, acceptor.accept(stream)) => accepted,
            };
            match accepted {
                Ok(Ok(tls_stream)) => Box::new(tls_stream),
                Ok(Err(e)) => {
                    handle.stats().record_tls_failure();
                    warn!(peer = %peer, error = %e, "TLS handshake failed");
                    return;
                },
                Err(_) => {
                    handle.stats().record_tls_failure();
                    warn!(peer = %peer, timeout_ms = timeout.as_millis() as u64, "TLS handshake timeout");
                    return;
                },
            }
        },
        None => Box::new(stream),
    };

    let session = handle.open_session(stream, Some(peer));
    let ctx = HandlerContext::new(handle.clone(), Arc::clone(&session), services);
    let mut handler = factory(&ctx);

    match session.run(&mut handler, &ctx).await {
        Ok(()) => debug!(session = %session.id(), peer = %peer, "Connection closed"),
        Err(e) => debug!(session = %session.id(), peer = %peer, error = %e, "Connection closed with error"),
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Connection task panicked");
        }
    }
}

/// Check if an accept error is fatal.
fn is_fatal_accept_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::InvalidInput
            | std::io::ErrorKind::InvalidData
            | std::io::ErrorKind::NotFound
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn local_config() -> ServerConfig {
        ServerConfig::default().with_listen(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = Listener::bind(local_config()).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert_eq!(listener.available_permits(), 1024);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = Listener::bind(local_config()).await.unwrap();
        let port = first.local_addr().port();

        let config = ServerConfig::default().with_listen(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let result = Listener::bind(config).await;
        assert!(matches!(result, Err(ServerError::BindError { .. })));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let result = Listener::bind(local_config().with_max_connections(0)).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_fatal_accept_errors() {
        let fatal = std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad");
        let transient = std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "aborted");
        assert!(is_fatal_accept_error(&fatal));
        assert!(!is_fatal_accept_error(&transient));
    }
}
