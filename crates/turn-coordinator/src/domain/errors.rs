//! # Domain Errors
//!
//! Error types for the turn coordinator.
//!
//! Not-found and not-your-turn are not errors: they surface as `None` or
//! `accepted: false`. Only failures that leave the requested mutation undone
//! are represented here.

use shared_types::{ConnectionId, SessionId};
use thiserror::Error;

/// A broken `SessionTurnState` invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// Queue is empty but a turn holder or start time is recorded.
    #[error("empty queue still records a turn")]
    TurnWithoutQueue,

    /// Queue is non-empty and nobody holds the turn.
    #[error("non-empty queue has no turn holder")]
    QueueWithoutTurn,

    /// Turn holder is not queued.
    #[error("turn holder {0} is not in the queue")]
    HolderNotQueued(ConnectionId),

    /// A connection appears twice in the queue.
    #[error("connection {0} is queued more than once")]
    DuplicateParticipant(ConnectionId),

    /// `turnStartTime` is set without a holder or vice versa.
    #[error("turn start time does not match turn holder")]
    StartTimeMismatch,
}

/// Errors at the shared store port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached. Retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something unexpected.
    #[error("store protocol error: {0}")]
    Protocol(String),
}

/// Errors while encoding or decoding the stored record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("failed to encode session state: {0}")]
    Encode(String),

    #[error("failed to decode session state: {0}")]
    Decode(String),

    #[error("stored session state is inconsistent: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Failures of a coordinator operation.
///
/// When any of these is returned, the requested transition did not happen
/// and callers must not broadcast it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// The shared store failed during the operation.
    #[error("session store unavailable during {operation}: {source}")]
    StoreUnavailable {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// Every compare-and-swap attempt lost to a concurrent writer.
    #[error("session {session_id} contended: {attempts} conflicting writes")]
    Contention { session_id: SessionId, attempts: u32 },

    /// The new state could not be serialised.
    #[error(transparent)]
    Encode(CodecError),
}

impl CoordinatorError {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::StoreUnavailable { .. } | CoordinatorError::Contention { .. }
        )
    }
}
