//! Per-session async locks.
//!
//! Serialises read-modify-write cycles for one session inside this process.
//! Entries are created on demand and dropped as soon as nobody holds or
//! awaits them, so idle sessions cost nothing.

use std::sync::Arc;

use dashmap::DashMap;
use shared_types::SessionId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub(crate) struct SessionLocks {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

pub(crate) struct SessionGuard<'a> {
    owner: &'a SessionLocks,
    session_id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLocks {
    pub(crate) async fn lock(&self, session_id: &SessionId) -> SessionGuard<'_> {
        let mutex = self.locks.entry(session_id.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        SessionGuard {
            owner: self,
            session_id: session_id.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        // Release before checking so our own Arc is gone from the count.
        self.guard.take();
        self.owner
            .locks
            .remove_if(&self.session_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
