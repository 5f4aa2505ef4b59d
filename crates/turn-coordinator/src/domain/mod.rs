//! # Domain Layer
//!
//! Pure turn-coordination logic. Nothing in here performs I/O.
//!
//! - `state.rs` - `SessionTurnState` and its transitions
//! - `outcomes.rs` - Results handed back to callers
//! - `codec.rs` - Stored record encoding
//! - `config.rs` - Coordinator and supervisor tunables
//! - `errors.rs` - Error taxonomy

pub mod codec;
pub mod config;
pub mod errors;
pub mod outcomes;
pub mod state;

pub use config::{CoordinatorConfig, SupervisorConfig};
pub use errors::{CodecError, CoordinatorError, InvariantViolation, StoreError};
pub use outcomes::{ArtifactUpdate, Transition, TurnStatus};
pub use state::SessionTurnState;
