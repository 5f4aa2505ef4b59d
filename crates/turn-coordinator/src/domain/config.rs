//! Coordinator and supervisor tunables.

use std::time::Duration;

use shared_types::{GridDimensions, SessionId};

/// Default turn budget.
pub const DEFAULT_TURN_BUDGET: Duration = Duration::from_secs(30);

/// Default lifetime of a stored session record, refreshed on every write.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between supervisor scans.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Compare-and-swap attempts before giving up with `Contention`.
pub const DEFAULT_MAX_CAS_RETRIES: u32 = 8;

/// Configuration for `TurnCoordinatorService`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// How long a holder keeps the turn before it may be force-advanced.
    pub turn_budget: Duration,
    /// TTL applied to the record on every write.
    pub state_ttl: Duration,
    /// Shape of the grid created for a new session.
    pub grid: GridDimensions,
    /// Write attempts per operation under contention.
    pub max_cas_retries: u32,
    /// Record keys are `{key_prefix}:{session_id}:state`.
    pub key_prefix: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            turn_budget: DEFAULT_TURN_BUDGET,
            state_ttl: DEFAULT_STATE_TTL,
            grid: GridDimensions::DEFAULT,
            max_cas_retries: DEFAULT_MAX_CAS_RETRIES,
            key_prefix: "session".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Store key holding the session's record.
    pub fn state_key(&self, session_id: &SessionId) -> String {
        format!("{}:{}:state", self.key_prefix, session_id)
    }

    pub fn turn_budget_ms(&self) -> u64 {
        u64::try_from(self.turn_budget.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Configuration for `TimeoutSupervisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub scan_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}
