//! # Inbound Ports (Driving Ports)
//!
//! The turn-coordination API. Implemented by `TurnCoordinatorService`,
//! driven by the bus adapter and the timeout supervisor.
//!
//! Every mutating call is serialised per session: concurrent calls for the
//! same session behave as if run one after another, in some order. Calls
//! for different sessions never wait on each other.

use async_trait::async_trait;
use shared_types::{BeatGrid, ConnectionId, Participant, SessionId};

use crate::domain::errors::CoordinatorError;
use crate::domain::outcomes::{ArtifactUpdate, Transition, TurnStatus};
use crate::domain::state::SessionTurnState;

#[async_trait]
pub trait TurnCoordinatorApi: Send + Sync {
    /// Current state, creating and persisting an empty one if the session
    /// has no (readable) record.
    async fn get_or_init(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionTurnState, CoordinatorError>;

    /// Current state without creating anything.
    async fn peek(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError>;

    /// Queues `participant`, creating the session if needed. A duplicate
    /// join changes nothing and writes nothing.
    async fn join_queue(
        &self,
        session_id: &SessionId,
        participant: Participant,
    ) -> Result<Transition, CoordinatorError>;

    /// Removes a connection from the queue. `None` if the session does not
    /// exist; `changed: false` if the connection was not queued.
    async fn leave_queue(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Result<Option<Transition>, CoordinatorError>;

    /// Ends the caller's turn. `None` if the session does not exist or the
    /// caller does not hold the turn.
    async fn finish_turn(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError>;

    /// Replaces the grid if the submitter holds the turn.
    async fn submit_artifact_update(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
        grid: BeatGrid,
    ) -> Result<ArtifactUpdate, CoordinatorError>;

    /// Rotates the turn regardless of who holds it or for how long. `None`
    /// if the session does not exist or nobody holds the turn.
    async fn force_advance(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError>;

    /// Rotates the turn only if the holder's budget is spent, re-checked
    /// inside the serialised section.
    async fn force_advance_if_expired(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError>;

    /// Timing of the current turn, `None` when nobody holds it.
    async fn turn_status(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<TurnStatus>, CoordinatorError>;

    /// Whole seconds left in the current turn, rounded up. Zero when the
    /// session is missing, empty or expired.
    async fn turn_time_remaining(&self, session_id: &SessionId) -> Result<u64, CoordinatorError> {
        Ok(self
            .turn_status(session_id)
            .await?
            .map(|status| status.remaining_secs)
            .unwrap_or(0))
    }

    /// Sessions that may have a turn in progress.
    async fn active_sessions(&self) -> Result<Vec<SessionId>, CoordinatorError>;

    /// Drops `session_id` from the active index if its record is gone or
    /// has no holder. Returns whether it was dropped.
    async fn prune_inactive(&self, session_id: &SessionId) -> Result<bool, CoordinatorError>;
}
