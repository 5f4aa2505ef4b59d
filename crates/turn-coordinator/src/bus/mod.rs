//! # Bus Module
//!
//! Connects the coordinator to the session event bus.

pub mod adapter;

pub use adapter::TurnCoordinatorBusAdapter;
