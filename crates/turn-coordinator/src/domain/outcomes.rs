//! Results returned by coordinator operations.
//!
//! Each carries the full post-operation state so callers can broadcast
//! without a second read.

use shared_types::ConnectionId;

use super::state::SessionTurnState;

/// Outcome of a join or leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionTurnState,
    /// `false` for no-ops (duplicate join, leave of a non-member).
    pub changed: bool,
}

/// Outcome of an artifact submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactUpdate {
    pub accepted: bool,
    /// `None` only when the session does not exist.
    pub state: Option<SessionTurnState>,
}

impl ArtifactUpdate {
    pub(crate) fn rejected(state: Option<SessionTurnState>) -> Self {
        Self {
            accepted: false,
            state,
        }
    }

    pub(crate) fn accepted(state: SessionTurnState) -> Self {
        Self {
            accepted: true,
            state: Some(state),
        }
    }
}

/// Timing of the current turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnStatus {
    pub holder: ConnectionId,
    pub elapsed_ms: u64,
    /// Whole seconds left, rounded up.
    pub remaining_secs: u64,
    pub expired: bool,
}
