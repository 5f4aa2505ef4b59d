//! In-memory session store.
//!
//! Behaves like the shared store for a single process: TTLs are honoured
//! lazily on read, and `compare_and_swap` is atomic under one lock. Can be
//! switched offline to exercise store-failure paths.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::SessionId;

use crate::domain::errors::StoreError;
use crate::ports::outbound::SessionStateStore;

struct Record {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Record {
    fn new(value: &[u8], ttl: Duration) -> Self {
        Self {
            value: value.to_vec(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Default)]
pub struct InMemoryStateStore {
    records: Mutex<HashMap<String, Record>>,
    active: Mutex<BTreeSet<SessionId>>,
    offline: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Successful writes so far (`set` plus winning `compare_and_swap`).
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Live record count.
    pub fn len(&self) -> usize {
        self.records.lock().values().filter(|r| r.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired records. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| r.is_live());
        before - records.len()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_online()?;
        let mut records = self.records.lock();
        match records.get(key) {
            Some(record) if record.is_live() => Ok(Some(record.value.clone())),
            Some(_) => {
                records.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.records
            .lock()
            .insert(key.to_string(), Record::new(value, ttl));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let mut records = self.records.lock();
        let current = records
            .get(key)
            .filter(|r| r.is_live())
            .map(|r| r.value.as_slice());
        if current != expected {
            return Ok(false);
        }
        records.insert(key.to_string(), Record::new(value, ttl));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn mark_active(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.active.lock().insert(session_id.clone());
        Ok(())
    }

    async fn clear_active(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.active.lock().remove(session_id);
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        self.ensure_online()?;
        Ok(self.active.lock().iter().cloned().collect())
    }
}
