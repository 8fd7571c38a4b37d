//! Shared server state.

use super::error::ServerResult;
use super::registry::ConnectionRegistry;
use super::stats::ServerStats;
use crate::config::{ConfigLoader, ServerConfig};
use crate::handshake::RequestParser;
use crate::keys::KeyGenerator;
use crate::pool::{BufferPool, DEFAULT_MAX_IDLE};
use crate::session::{BoxedStream, Session, SessionShared};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Cheap, clonable reference to a running server.
///
/// Owns the session registry and the utilities every session shares. The
/// listener, every connection task, and every handler context hold a clone.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    inner: Arc<ServerInner>,
}

#[derive(Debug)]
struct ServerInner {
    shared: SessionShared,
    registry: ConnectionRegistry,
    shutdown: CancellationToken,
}

impl ServerHandle {
    /// Validate `config` and build the shared state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        Self::with_keys(config, KeyGenerator::new())
    }

    /// Like [`ServerHandle::new`] with a caller-supplied key generator,
    /// e.g. a seeded one for reproducible ping payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_keys(config: ServerConfig, keys: KeyGenerator) -> ServerResult<Self> {
        ConfigLoader::check(&config)?;
        let parser = RequestParser::new()?;

        let shared = SessionShared {
            config: Arc::new(config),
            parser: Arc::new(parser),
            pool: Arc::new(BufferPool::new(DEFAULT_MAX_IDLE)),
            keys: Arc::new(keys),
            stats: Arc::new(ServerStats::default()),
        };

        Ok(Self {
            inner: Arc::new(ServerInner {
                shared,
                registry: ConnectionRegistry::new(),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.shared.config
    }

    /// Server counters.
    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.inner.shared.stats
    }

    /// Buffer pool shared by every session.
    #[must_use]
    pub fn pool(&self) -> &BufferPool {
        &self.inner.shared.pool
    }

    /// Random key source shared by every session.
    #[must_use]
    pub fn keys(&self) -> &KeyGenerator {
        &self.inner.shared.keys
    }

    /// Token cancelled by [`ServerHandle::shutdown`]. Every session token
    /// is a child of it.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Whether [`ServerHandle::shutdown`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Wrap an accepted stream in a new session and register it.
    pub fn open_session(&self, stream: BoxedStream, peer: Option<SocketAddr>) -> Arc<Session> {
        let session = Arc::new(Session::new(
            Uuid::new_v4(),
            peer,
            stream,
            self.inner.shared.clone(),
            self.inner.shutdown.child_token(),
        ));
        self.inner.registry.register(Arc::clone(&session));
        debug!(session = %session.id(), peer = ?peer, "Session registered");
        session
    }

    /// Look up a live session.
    #[must_use]
    pub fn session(&self, id: Uuid) -> Option<Arc<Session>> {
        self.inner.registry.get(id)
    }

    /// Every live session at this instant.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.registry.snapshot()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.registry.count()
    }

    /// Remove `session` from the registry and dispose it.
    ///
    /// Safe to call any number of times; only the first call that finds the
    /// session registered returns `true` and counts as a disconnect.
    pub async fn disconnect(&self, session: &Session) -> bool {
        let removed = self.inner.registry.unregister(session.id()).is_some();
        if removed {
            self.stats().record_disconnect();
            debug!(session = %session.id(), "Session unregistered");
        }
        session.dispose().await;
        removed
    }

    /// Cancel every session and dispose whatever is still registered.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let sessions = self.sessions();
        info!(sessions = sessions.len(), "Disposing sessions");
        for session in sessions {
            self.disconnect(&session).await;
        }

        let pool = self.pool().stats();
        debug!(
            hit_rate = pool.hit_rate(),
            discards = pool.discards.load(Ordering::Relaxed),
            "Buffer pool usage"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[test]
    fn test_invalid_config_rejected() {
        let config = ServerConfig::default().with_max_connections(0);
        assert!(ServerHandle::new(config).is_err());
    }

    #[tokio::test]
    async fn test_register_and_disconnect() {
        let server = ServerHandle::new(ServerConfig::default()).unwrap();
        let (_client, stream) = tokio::io::duplex(1024);

        let session = server.open_session(Box::new(stream), None);
        assert_eq!(server.connection_count(), 1);
        assert!(server.session(session.id()).is_some());

        assert!(server.disconnect(&session).await);
        assert!(!server.disconnect(&session).await);
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.stats().snapshot().disconnects, 1);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_sessions() {
        let server = ServerHandle::new(ServerConfig::default()).unwrap();
        let (_a, first) = tokio::io::duplex(1024);
        let (_b, second) = tokio::io::duplex(1024);

        let first = server.open_session(Box::new(first), None);
        let second = server.open_session(Box::new(second), None);
        assert_ne!(first.id(), second.id());

        server.shutdown().await;
        assert!(server.is_shutting_down());
        assert_eq!(server.connection_count(), 0);
        assert!(first.cancellation_token().is_cancelled());
        assert!(second.cancellation_token().is_cancelled());

        // Sessions opened after shutdown start cancelled.
        let (_c, late) = tokio::io::duplex(1024);
        let late = server.open_session(Box::new(late), None);
        assert!(late.cancellation_token().is_cancelled());
    }
}
