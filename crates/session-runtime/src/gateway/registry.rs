//! Which sessions each live connection has joined.
//!
//! A joined session owns the forwarder task that copies bus envelopes into
//! the connection's outbox. Removing the entry hands the task back so the
//! caller can stop it.

use std::collections::HashMap;

use dashmap::DashMap;
use shared_types::{ConnectionId, SessionId};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, HashMap<SessionId, JoinHandle<()>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, connection_id: &ConnectionId) {
        self.connections.entry(connection_id.clone()).or_default();
    }

    /// Records `session_id` for the connection, starting its forwarder with
    /// `spawn`. Returns `false` without calling `spawn` if already joined.
    pub fn join_with(
        &self,
        connection_id: &ConnectionId,
        session_id: &SessionId,
        spawn: impl FnOnce() -> JoinHandle<()>,
    ) -> bool {
        let mut sessions = self.connections.entry(connection_id.clone()).or_default();
        if sessions.contains_key(session_id) {
            return false;
        }
        sessions.insert(session_id.clone(), spawn());
        debug!(connection_id = %connection_id, session_id = %session_id, "Session joined");
        true
    }

    pub fn leave(
        &self,
        connection_id: &ConnectionId,
        session_id: &SessionId,
    ) -> Option<JoinHandle<()>> {
        self.connections
            .get_mut(connection_id)
            .and_then(|mut sessions| sessions.remove(session_id))
    }

    /// Forgets the connection, returning every session it had joined.
    pub fn close(&self, connection_id: &ConnectionId) -> Vec<(SessionId, JoinHandle<()>)> {
        self.connections
            .remove(connection_id)
            .map(|(_, sessions)| sessions.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn sessions_of(&self, connection_id: &ConnectionId) -> Vec<SessionId> {
        self.connections
            .get(connection_id)
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_joined(&self, connection_id: &ConnectionId, session_id: &SessionId) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(|sessions| sessions.contains_key(session_id))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
