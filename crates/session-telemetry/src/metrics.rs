//! Prometheus metrics for the beatgrid services.
//!
//! All metrics follow the naming convention: `beatgrid_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., turn transitions)
//! - **Gauge**: Value that can go up or down (e.g., active connections)
//! - **Histogram**: Distribution of values (e.g., coordinator operation latency)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Registry scraped by the `/metrics` route
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // TURN COORDINATION
    // =========================================================================

    /// Persisted transitions by operation (join/leave/finish/force/submit/init)
    pub static ref TURN_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("beatgrid_turn_transitions_total", "Persisted session state transitions"),
        &["operation"]
    ).expect("metric creation failed");

    /// Finish/submit attempts by a connection that did not hold the turn
    pub static ref REJECTED_ACTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "beatgrid_rejected_actions_total",
            "Actions rejected because the caller did not hold the turn"
        ),
        &["operation"]
    ).expect("metric creation failed");

    /// Timeout-driven rotations
    pub static ref FORCED_ADVANCES: IntCounter = IntCounter::new(
        "beatgrid_forced_advances_total",
        "Turns rotated by the timeout supervisor"
    ).expect("metric creation failed");

    /// Stored records that failed to decode and were re-initialised
    pub static ref CORRUPT_STATE_RECOVERED: IntCounter = IntCounter::new(
        "beatgrid_corrupt_state_recovered_total",
        "Session records that failed to decode and were treated as absent"
    ).expect("metric creation failed");

    /// Compare-and-swap writes that lost a race and were retried
    pub static ref CAS_CONFLICTS: IntCounter = IntCounter::new(
        "beatgrid_cas_conflicts_total",
        "Conditional state writes that lost to a concurrent writer"
    ).expect("metric creation failed");

    /// Coordinator operation latency, store round-trips included
    pub static ref OPERATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "beatgrid_operation_duration_seconds",
            "Time spent in a coordinator read-modify-write"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("valid buckets")),
        &["operation"]
    ).expect("metric creation failed");

    // =========================================================================
    // STORE
    // =========================================================================

    /// Store round-trips that failed
    pub static ref STORE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("beatgrid_store_failures_total", "Shared store operations that failed"),
        &["operation"]
    ).expect("metric creation failed");

    // =========================================================================
    // GATEWAY
    // =========================================================================

    /// Currently open realtime connections
    pub static ref ACTIVE_CONNECTIONS: IntGauge = IntGauge::new(
        "beatgrid_active_connections",
        "Number of currently open realtime connections"
    ).expect("metric creation failed");
}

/// Handle proving metrics were registered.
pub struct MetricsHandle {
    _registered: usize,
}

/// Register all metrics with the crate registry.
///
/// Calling it more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Turn coordination
        Box::new(TURN_TRANSITIONS.clone()),
        Box::new(REJECTED_ACTIONS.clone()),
        Box::new(FORCED_ADVANCES.clone()),
        Box::new(CORRUPT_STATE_RECOVERED.clone()),
        Box::new(CAS_CONFLICTS.clone()),
        Box::new(OPERATION_DURATION.clone()),
        // Store
        Box::new(STORE_FAILURES.clone()),
        // Gateway
        Box::new(ACTIVE_CONNECTIONS.clone()),
    ];

    let registered = metrics.len();
    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registered: registered,
    })
}

/// Encode all metrics as Prometheus text format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::Encode(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Encode(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct OperationTimer {
    histogram: prometheus::Histogram,
    start: std::time::Instant,
}

impl OperationTimer {
    /// Start timing a coordinator operation.
    pub fn start(operation: &str) -> Self {
        Self {
            histogram: OPERATION_DURATION.with_label_values(&[operation]),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
