//! What a handler can reach.

use super::services::Services;
use crate::server::ServerHandle;
use crate::session::Session;
use std::sync::Arc;

/// Binding between a handler, its session, and the server.
///
/// The handler only gets the session's public surface (send, ping, close);
/// state transitions stay inside the session.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    server: ServerHandle,
    session: Arc<Session>,
    services: Services,
}

impl HandlerContext {
    /// Create a context.
    #[must_use]
    pub fn new(server: ServerHandle, session: Arc<Session>, services: Services) -> Self {
        Self {
            server,
            session,
            services,
        }
    }

    /// The owning server.
    #[must_use]
    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    /// The bound session.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Shared dependencies.
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Look up a shared dependency by type.
    #[must_use]
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services.get::<T>()
    }
}
