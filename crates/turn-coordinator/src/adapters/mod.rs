//! # Adapters Module
//!
//! Store implementations for the `SessionStateStore` port.
//!
//! - `memory`: process-local store for tests and single-instance runs
//! - `redis`: shared Redis store (feature `redis-backend`)

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use memory::InMemoryStateStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStateStore;
