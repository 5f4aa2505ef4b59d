//! # Session Runtime
//!
//! The beatgrid server: configuration, dependency wiring, the realtime
//! WebSocket gateway and the timeout supervisor.
//!
//! ## Modular Structure
//!
//! - `container/` - Configuration and construction of every component
//! - `gateway/` - WebSocket routes, client protocol, connection registry
//! - `runtime` - Startup and graceful shutdown
//!
//! The main entry point is the `main.rs` binary.

pub mod container;
pub mod gateway;
pub mod runtime;

pub use container::{ConfigError, RuntimeConfig, RuntimeContainer};
pub use runtime::SessionRuntime;
