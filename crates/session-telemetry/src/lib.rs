//! # Session Telemetry
//!
//! Observability for the beatgrid services.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an env filter, pretty or JSON output
//! - **Metrics**: Prometheus counters and gauges, exported as text
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! let _guard = init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BEATGRID_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `BEATGRID_JSON_LOGS` | `false` (true in containers) | JSON formatted logs |
//! | `OTEL_SERVICE_NAME` | `beatgrid` | Service name stamped on startup logs |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    gather_text, register_metrics, MetricsHandle, OperationTimer, ACTIVE_CONNECTIONS,
    CAS_CONFLICTS, CORRUPT_STATE_RECOVERED, FORCED_ADVANCES, OPERATION_DURATION,
    REJECTED_ACTIONS, STORE_FAILURES, TURN_TRANSITIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Failed to encode metrics: {0}")]
    Encode(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Initialize metrics first so startup failures are counted
    let metrics_handle = register_metrics()?;

    init_logging(config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
