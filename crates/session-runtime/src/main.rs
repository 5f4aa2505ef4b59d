//! # Beatgrid Session Server
//!
//! ```bash
//! BEATGRID_REDIS_URL=redis://localhost:6379 session-runtime
//! ```
//!
//! See `container::config` for every setting.

use anyhow::{Context, Result};
use session_runtime::{RuntimeConfig, RuntimeContainer, SessionRuntime};
use session_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(&TelemetryConfig::for_service("beatgrid-session"))
        .context("Failed to initialise telemetry")?;

    let config = RuntimeConfig::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        bind_addr = %config.bind_addr,
        turn_budget_secs = config.coordinator.turn_budget.as_secs(),
        scan_interval_secs = config.supervisor.scan_interval.as_secs(),
        shared_store = config.redis_url.is_some(),
        "Configuration loaded"
    );

    let container = RuntimeContainer::build(config)
        .await
        .context("Failed to build runtime")?;
    let mut runtime = SessionRuntime::new(container);
    runtime.start().await.context("Failed to start gateway")?;

    info!("Session server is running. Press Ctrl+C to stop.");
    let mut stopped = runtime.shutdown_signal();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Ctrl+C received");
        }
        _ = stopped.changed() => {
            warn!("Gateway exited, shutting down");
        }
    }

    runtime.shutdown().await;
    Ok(())
}
