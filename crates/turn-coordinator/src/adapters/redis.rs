//! Redis-backed session store.
//!
//! Records are plain strings under `session:{id}:state` written with `SET
//! ... EX`. Compare-and-swap runs as a Lua script so the comparison and the
//! write happen in one server-side step. The active index is a Redis set.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use shared_types::SessionId;
use tracing::info;

use crate::domain::errors::StoreError;
use crate::ports::outbound::SessionStateStore;

/// Default key of the active-session set.
pub const DEFAULT_ACTIVE_INDEX_KEY: &str = "sessions:active";

// KEYS[1] record key
// ARGV[1] "1" if a current value is expected, "0" if the key must be absent
// ARGV[2] expected bytes
// ARGV[3] new bytes
// ARGV[4] ttl seconds
const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
  if current ~= ARGV[2] then return 0 end
else
  if current then return 0 end
end
redis.call('SET', KEYS[1], ARGV[3], 'EX', ARGV[4])
return 1
"#;

pub struct RedisStateStore {
    connection: ConnectionManager,
    active_index_key: String,
    compare_and_swap: Script,
}

impl RedisStateStore {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// The connection manager reconnects on its own after failures; calls
    /// made while disconnected fail with `StoreError::Unavailable`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        info!(url = %redact(url), "Connected to shared session store");
        Ok(Self {
            connection,
            active_index_key: DEFAULT_ACTIVE_INDEX_KEY.to_string(),
            compare_and_swap: Script::new(COMPARE_AND_SWAP),
        })
    }

    pub fn with_active_index_key(mut self, key: impl Into<String>) -> Self {
        self.active_index_key = key.into();
        self
    }
}

#[async_trait]
impl SessionStateStore for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<Vec<u8>>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let (flag, expected) = match expected {
            Some(bytes) => ("1", bytes),
            None => ("0", &[][..]),
        };
        let swapped: i64 = self
            .compare_and_swap
            .key(key)
            .arg(flag)
            .arg(expected)
            .arg(value)
            .arg(ttl_seconds(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn mark_active(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("SADD")
            .arg(&self.active_index_key)
            .arg(session_id.as_str())
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear_active(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("SREM")
            .arg(&self.active_index_key)
            .arg(session_id.as_str())
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut conn = self.connection.clone();
        let members = redis::cmd("SMEMBERS")
            .arg(&self.active_index_key)
            .query_async::<_, Vec<String>>(&mut conn)
            .await?;
        Ok(members.into_iter().map(SessionId::from).collect())
    }
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Protocol(err.to_string())
        }
    }
}

/// `EX` rejects zero, so sub-second TTLs round up to one second.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Strips credentials from a connection URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
