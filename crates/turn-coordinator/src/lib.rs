//! # Turn Coordinator
//!
//! Turn-taking engine for collaborative sessions. Each session has a queue of
//! participants, exactly one of whom holds the turn and may change the shared
//! grid. Turns rotate round-robin when the holder finishes, leaves or runs
//! out of time.
//!
//! ## Architecture
//!
//! ```text
//!   gateway ──┐                              ┌── SessionStateStore (Redis / memory)
//!             ├─→ TurnCoordinatorBusAdapter ─┤
//! supervisor ─┘         │                    └── TurnCoordinatorService
//!                       └──→ EventPublisher (session rooms)
//! ```
//!
//! The service keeps no authoritative state of its own. Every mutation reads
//! the session record from the shared store, applies a pure transition and
//! writes it back with compare-and-swap, so several server instances can
//! share one store.
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Empty queue, no turn | No holder and no start time when the queue is empty |
//! | Holder is queued | `currentTurn` names a queued connection |
//! | Unique membership | A connection is queued at most once |
//! | Timed turns | `turnStartTime` is set exactly when a holder is |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - State, transitions, codec, config, errors
//! - `ports/` - Inbound API and outbound store/clock traits
//! - `service/` - `TurnCoordinatorService` implementing the API
//! - `adapters/` - In-memory and Redis stores
//! - `bus/` - Broadcast after each landed transition
//! - `supervisor.rs` - Periodic forced advance of expired turns
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use turn_coordinator::{
//!     CoordinatorConfig, InMemoryStateStore, SystemTimeSource, TurnCoordinatorApi,
//!     TurnCoordinatorService,
//! };
//!
//! let service = TurnCoordinatorService::new(
//!     Arc::new(InMemoryStateStore::new()),
//!     SystemTimeSource,
//!     CoordinatorConfig::default(),
//! );
//! let joined = service.join_queue(&session_id, participant).await?;
//! ```

pub mod adapters;
pub mod bus;
pub mod domain;
pub mod ports;
pub mod service;
pub mod supervisor;

pub use adapters::InMemoryStateStore;
#[cfg(feature = "redis-backend")]
pub use adapters::RedisStateStore;
pub use bus::TurnCoordinatorBusAdapter;
pub use domain::{
    ArtifactUpdate, CodecError, CoordinatorConfig, CoordinatorError, InvariantViolation,
    SessionTurnState, StoreError, SupervisorConfig, Transition, TurnStatus,
};
pub use ports::{SessionStateStore, SystemTimeSource, TimeSource, TurnCoordinatorApi};
#[cfg(any(test, feature = "test-utils"))]
pub use ports::ManualClock;
pub use service::TurnCoordinatorService;
pub use supervisor::{ScanReport, TimeoutSupervisor};
