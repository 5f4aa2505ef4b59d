//! # Outbound Ports (Driven Ports)
//!
//! Dependencies required by the turn coordinator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_types::{SessionId, Timestamp};

use crate::domain::errors::StoreError;

/// Shared key-value store holding one record per session.
///
/// Production: `RedisStateStore` (adapters/redis.rs, feature `redis-backend`)
/// Testing and single-instance: `InMemoryStateStore` (adapters/memory.rs)
///
/// Every coordinator instance pointed at the same store sees the same
/// sessions. Writes go through `compare_and_swap` so that instances never
/// overwrite each other's transitions.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    /// Raw bytes under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Unconditional overwrite with a fresh TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Writes `value` (with a fresh TTL) only if the current bytes equal
    /// `expected`. `expected: None` means "only if absent".
    ///
    /// Returns `false` when another writer got there first.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Adds `session_id` to the index of sessions with a turn in progress.
    async fn mark_active(&self, session_id: &SessionId) -> Result<(), StoreError>;

    /// Removes `session_id` from that index.
    async fn clear_active(&self, session_id: &SessionId) -> Result<(), StoreError>;

    /// Every indexed session, in no particular order.
    async fn active_sessions(&self) -> Result<Vec<SessionId>, StoreError>;
}

#[async_trait]
impl<S: SessionStateStore + ?Sized> SessionStateStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        (**self).set(key, value, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap(key, expected, value, ttl).await
    }

    async fn mark_active(&self, session_id: &SessionId) -> Result<(), StoreError> {
        (**self).mark_active(session_id).await
    }

    async fn clear_active(&self, session_id: &SessionId) -> Result<(), StoreError> {
        (**self).clear_active(session_id).await
    }

    async fn active_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        (**self).active_sessions().await
    }
}

/// Wall-clock source for turn start times.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Default time source using system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Hand-driven clock for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-utils"))]
impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: std::sync::atomic::AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now
            .fetch_add(millis, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}
