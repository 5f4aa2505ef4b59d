//! # Beatgrid Test Suite
//!
//! Cross-crate tests driving the gateway handlers, the bus adapter and the
//! timeout supervisor against one shared store.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── integration/
//! │   ├── flows.rs           # Client-visible scenarios end to end
//! │   ├── concurrency.rs     # Many connections racing on one session
//! │   └── multi_instance.rs  # Two coordinators sharing a store
//! benches/
//! └── coordinator_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p session-tests
//! cargo test -p session-tests integration::multi_instance
//! cargo bench -p session-tests
//! ```

#[cfg(test)]
pub mod integration;
