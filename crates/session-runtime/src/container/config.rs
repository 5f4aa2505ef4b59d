//! # Runtime Configuration
//!
//! Everything is read from `BEATGRID_*` environment variables. Unparseable
//! values keep their default with a warning; `validate` rejects settings
//! the coordinator cannot run with.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BEATGRID_BIND_ADDR` | `0.0.0.0:3001` | Gateway listen address |
//! | `BEATGRID_REDIS_URL` / `REDIS_URL` | unset | Shared store; in-memory when unset |
//! | `BEATGRID_TURN_BUDGET_SECS` | `30` | Turn length before a forced advance |
//! | `BEATGRID_SCAN_INTERVAL_SECS` | `5` | Supervisor scan period |
//! | `BEATGRID_STATE_TTL_SECS` | `86400` | Record lifetime, refreshed on write |
//! | `BEATGRID_GRID_ROWS` / `BEATGRID_GRID_COLUMNS` | `8` / `16` | Shape of a new grid |
//! | `BEATGRID_REQUIRE_AUTH` | `false` | Refuse connections without a known token |
//! | `BEATGRID_AUTH_TOKENS` | empty | `token=user,token=user` |
//! | `BEATGRID_CHANNEL_CAPACITY` | `1000` | Per-session broadcast buffer |
//! | `BEATGRID_MAX_MESSAGE_BYTES` | `1048576` | Largest accepted client frame |

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use shared_bus::DEFAULT_CHANNEL_CAPACITY;
use thiserror::Error;
use tracing::warn;
use turn_coordinator::{CoordinatorConfig, StoreError, SupervisorConfig};

use crate::gateway::GatewaySettings;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("turn budget must be greater than zero")]
    ZeroTurnBudget,

    #[error("supervisor scan interval must be greater than zero")]
    ZeroScanInterval,

    #[error("state TTL must be greater than zero")]
    ZeroStateTtl,

    #[error("grid must have at least one row and one column (got {rows}x{columns})")]
    EmptyGrid { rows: usize, columns: usize },

    #[error("BEATGRID_REQUIRE_AUTH is set but BEATGRID_AUTH_TOKENS is empty")]
    NoTokensConfigured,

    #[error("could not connect to session store: {0}")]
    StoreConnect(#[source] StoreError),

    #[error("a Redis URL is configured but this build has no redis-backend feature")]
    RedisBackendDisabled,
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub redis_url: Option<String>,
    pub coordinator: CoordinatorConfig,
    pub supervisor: SupervisorConfig,
    pub require_auth: bool,
    /// Bearer token → user id.
    pub auth_tokens: HashMap<String, String>,
    pub channel_capacity: usize,
    pub gateway: GatewaySettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            redis_url: None,
            coordinator: CoordinatorConfig::default(),
            supervisor: SupervisorConfig::default(),
            require_auth: false,
            auth_tokens: HashMap::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            gateway: GatewaySettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parsed(&lookup, "BEATGRID_BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.redis_url = lookup("BEATGRID_REDIS_URL")
            .or_else(|| lookup("REDIS_URL"))
            .filter(|url| !url.trim().is_empty());

        if let Some(secs) = parsed::<u64>(&lookup, "BEATGRID_TURN_BUDGET_SECS") {
            config.coordinator.turn_budget = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64>(&lookup, "BEATGRID_STATE_TTL_SECS") {
            config.coordinator.state_ttl = Duration::from_secs(secs);
        }
        if let Some(rows) = parsed(&lookup, "BEATGRID_GRID_ROWS") {
            config.coordinator.grid.rows = rows;
        }
        if let Some(columns) = parsed(&lookup, "BEATGRID_GRID_COLUMNS") {
            config.coordinator.grid.columns = columns;
        }
        if let Some(secs) = parsed::<u64>(&lookup, "BEATGRID_SCAN_INTERVAL_SECS") {
            config.supervisor.scan_interval = Duration::from_secs(secs);
        }

        if let Some(flag) = lookup("BEATGRID_REQUIRE_AUTH") {
            config.require_auth = parse_flag(&flag);
        }
        if let Some(tokens) = lookup("BEATGRID_AUTH_TOKENS") {
            config.auth_tokens = parse_tokens(&tokens);
        }

        if let Some(capacity) = parsed(&lookup, "BEATGRID_CHANNEL_CAPACITY") {
            config.channel_capacity = capacity;
        }
        if let Some(bytes) = parsed(&lookup, "BEATGRID_MAX_MESSAGE_BYTES") {
            config.gateway.max_message_size = bytes;
        }

        config
    }

    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coordinator.turn_budget.is_zero() {
            return Err(ConfigError::ZeroTurnBudget);
        }
        if self.supervisor.scan_interval.is_zero() {
            return Err(ConfigError::ZeroScanInterval);
        }
        if self.coordinator.state_ttl.is_zero() {
            return Err(ConfigError::ZeroStateTtl);
        }
        if self.coordinator.grid.is_empty() {
            return Err(ConfigError::EmptyGrid {
                rows: self.coordinator.grid.rows,
                columns: self.coordinator.grid.columns,
            });
        }
        if self.require_auth && self.auth_tokens.is_empty() {
            return Err(ConfigError::NoTokensConfigured);
        }
        Ok(())
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = key, value = %raw, "Ignoring unparseable setting, keeping default");
            None
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_tokens(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (token, user) = pair.split_once('=')?;
            let (token, user) = (token.trim(), user.trim());
            (!token.is_empty() && !user.is_empty()).then(|| (token.to_string(), user.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_lookup(|_| None);
        assert_eq!(config.bind_addr.port(), 3001);
        assert!(config.redis_url.is_none());
        assert_eq!(config.coordinator.turn_budget, Duration::from_secs(30));
        assert_eq!(config.supervisor.scan_interval, Duration::from_secs(5));
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            ("BEATGRID_BIND_ADDR", "127.0.0.1:9000"),
            ("REDIS_URL", "redis://cache:6379"),
            ("BEATGRID_TURN_BUDGET_SECS", "45"),
            ("BEATGRID_SCAN_INTERVAL_SECS", "2"),
            ("BEATGRID_GRID_ROWS", "4"),
            ("BEATGRID_GRID_COLUMNS", "32"),
            ("BEATGRID_REQUIRE_AUTH", "true"),
            ("BEATGRID_AUTH_TOKENS", "abc=alice, def=bob,broken"),
        ]));

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.coordinator.turn_budget, Duration::from_secs(45));
        assert_eq!(config.supervisor.scan_interval, Duration::from_secs(2));
        assert_eq!(config.coordinator.grid.rows, 4);
        assert_eq!(config.coordinator.grid.columns, 32);
        assert!(config.require_auth);
        assert_eq!(config.auth_tokens.len(), 2);
        assert_eq!(config.auth_tokens.get("def").map(String::as_str), Some("bob"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_prefixed_redis_url_wins() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            ("BEATGRID_REDIS_URL", "redis://primary"),
            ("REDIS_URL", "redis://fallback"),
        ]));
        assert_eq!(config.redis_url.as_deref(), Some("redis://primary"));
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            ("BEATGRID_TURN_BUDGET_SECS", "thirty"),
            ("BEATGRID_BIND_ADDR", "nowhere"),
        ]));
        assert_eq!(config.coordinator.turn_budget, Duration::from_secs(30));
        assert_eq!(config.bind_addr.port(), 3001);
    }

    #[test]
    fn test_validate_rejects_unusable_settings() {
        let zero_budget =
            RuntimeConfig::from_lookup(lookup_from(&[("BEATGRID_TURN_BUDGET_SECS", "0")]));
        assert!(matches!(zero_budget.validate(), Err(ConfigError::ZeroTurnBudget)));

        let zero_scan =
            RuntimeConfig::from_lookup(lookup_from(&[("BEATGRID_SCAN_INTERVAL_SECS", "0")]));
        assert!(matches!(zero_scan.validate(), Err(ConfigError::ZeroScanInterval)));

        let empty_grid = RuntimeConfig::from_lookup(lookup_from(&[("BEATGRID_GRID_ROWS", "0")]));
        assert!(matches!(
            empty_grid.validate(),
            Err(ConfigError::EmptyGrid { rows: 0, columns: 16 })
        ));

        let no_tokens = RuntimeConfig::from_lookup(lookup_from(&[("BEATGRID_REQUIRE_AUTH", "1")]));
        assert!(matches!(no_tokens.validate(), Err(ConfigError::NoTokensConfigured)));
    }
}
