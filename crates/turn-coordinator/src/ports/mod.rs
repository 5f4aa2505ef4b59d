//! # Ports Layer
//!
//! - `inbound.rs` - What the coordinator offers callers
//! - `outbound.rs` - What it needs from the host (store, clock)

pub mod inbound;
pub mod outbound;

pub use inbound::TurnCoordinatorApi;
pub use outbound::{SessionStateStore, SystemTimeSource, TimeSource};

#[cfg(any(test, feature = "test-utils"))]
pub use outbound::ManualClock;
