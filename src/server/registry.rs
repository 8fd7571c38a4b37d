use crate::session::Session;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Registry of live sessions, keyed by session id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<Session>) {
        self.sessions.insert(session.id(), session);
    }

    /// Remove a session. Returns it only for the first caller.
    pub fn unregister(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Get number of active sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
