//! # Turn Coordinator Bus Adapter
//!
//! Runs a coordinator operation and, once it has landed in the store,
//! publishes what observers need to see. Nothing is published for failed
//! operations, no-ops or rejections.
//!
//! | Operation | Audience | Events |
//! |-----------|----------|--------|
//! | `open_session` | joiner only | `ArtifactUpdated`, then `QueueUpdated` |
//! | `join_queue` / `leave_queue` | everyone | `QueueUpdated` |
//! | `finish_turn` / `force_advance*` | everyone | `QueueUpdated` |
//! | `submit_artifact_update` | everyone but the submitter | `ArtifactUpdated` |
//! | `turn_timer` | requester only | `TurnTimer` |
//!
//! Each mutating call holds a per-session lock from the coordinator call
//! through its publish, so observers see broadcasts in commit order.

use std::sync::Arc;

use shared_bus::{Audience, EventPublisher, SessionEvent};
use shared_types::{BeatGrid, ConnectionId, Participant, SessionId};
use tracing::debug;

use crate::domain::errors::CoordinatorError;
use crate::domain::outcomes::{ArtifactUpdate, Transition};
use crate::domain::state::SessionTurnState;
use crate::ports::inbound::TurnCoordinatorApi;
use crate::service::locks::SessionLocks;

/// Adapter that pairs each coordinator call with its broadcast.
///
/// Both the realtime gateway and the timeout supervisor go through here, so
/// a forced advance is announced exactly like a finish.
pub struct TurnCoordinatorBusAdapter<C, P>
where
    C: TurnCoordinatorApi,
    P: EventPublisher,
{
    coordinator: Arc<C>,
    publisher: Arc<P>,
    locks: SessionLocks,
}

impl<C, P> TurnCoordinatorBusAdapter<C, P>
where
    C: TurnCoordinatorApi,
    P: EventPublisher,
{
    pub fn new(coordinator: Arc<C>, publisher: Arc<P>) -> Self {
        Self {
            coordinator,
            publisher,
            locks: SessionLocks::default(),
        }
    }

    pub fn coordinator(&self) -> &Arc<C> {
        &self.coordinator
    }

    pub fn publisher(&self) -> &Arc<P> {
        &self.publisher
    }

    /// Initialises the session if needed and sends the full snapshot to the
    /// joining connection alone. The caller must already have subscribed
    /// `connection_id` to the session.
    pub async fn open_session(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Result<SessionTurnState, CoordinatorError> {
        let _guard = self.locks.lock(session_id).await;
        let state = self.coordinator.get_or_init(session_id).await?;
        let audience = Audience::Only(connection_id.clone());
        self.publisher
            .publish(
                session_id,
                audience.clone(),
                SessionEvent::ArtifactUpdated(state.artifact().clone()),
            )
            .await;
        self.publisher
            .publish(session_id, audience, SessionEvent::QueueUpdated(state.snapshot()))
            .await;
        Ok(state)
    }

    pub async fn join_queue(
        &self,
        session_id: &SessionId,
        participant: Participant,
    ) -> Result<Transition, CoordinatorError> {
        let _guard = self.locks.lock(session_id).await;
        let transition = self.coordinator.join_queue(session_id, participant).await?;
        if transition.changed {
            self.publish_queue(session_id, &transition.state).await;
        }
        Ok(transition)
    }

    pub async fn leave_queue(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Result<Option<Transition>, CoordinatorError> {
        let _guard = self.locks.lock(session_id).await;
        let transition = self.coordinator.leave_queue(session_id, connection_id).await?;
        if let Some(t) = transition.as_ref().filter(|t| t.changed) {
            self.publish_queue(session_id, &t.state).await;
        }
        Ok(transition)
    }

    pub async fn finish_turn(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError> {
        let _guard = self.locks.lock(session_id).await;
        let state = self.coordinator.finish_turn(session_id, connection_id).await?;
        if let Some(state) = &state {
            self.publish_queue(session_id, state).await;
        }
        Ok(state)
    }

    pub async fn submit_artifact_update(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
        grid: BeatGrid,
    ) -> Result<ArtifactUpdate, CoordinatorError> {
        let _guard = self.locks.lock(session_id).await;
        let update = self
            .coordinator
            .submit_artifact_update(session_id, connection_id, grid)
            .await?;
        if let Some(state) = update.state.as_ref().filter(|_| update.accepted) {
            self.publisher
                .publish(
                    session_id,
                    Audience::AllExcept(connection_id.clone()),
                    SessionEvent::ArtifactUpdated(state.artifact().clone()),
                )
                .await;
        }
        Ok(update)
    }

    pub async fn force_advance(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError> {
        let _guard = self.locks.lock(session_id).await;
        let state = self.coordinator.force_advance(session_id).await?;
        if let Some(state) = &state {
            self.publish_queue(session_id, state).await;
        }
        Ok(state)
    }

    pub async fn force_advance_if_expired(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError> {
        let _guard = self.locks.lock(session_id).await;
        let state = self.coordinator.force_advance_if_expired(session_id).await?;
        if let Some(state) = &state {
            self.publish_queue(session_id, state).await;
        }
        Ok(state)
    }

    /// Sends the seconds left in the current turn to `connection_id`.
    pub async fn turn_timer(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Result<u64, CoordinatorError> {
        let remaining_secs = self.coordinator.turn_time_remaining(session_id).await?;
        self.publisher
            .publish(
                session_id,
                Audience::Only(connection_id.clone()),
                SessionEvent::TurnTimer { remaining_secs },
            )
            .await;
        Ok(remaining_secs)
    }

    async fn publish_queue(&self, session_id: &SessionId, state: &SessionTurnState) {
        let delivered = self
            .publisher
            .publish(session_id, Audience::All, SessionEvent::QueueUpdated(state.snapshot()))
            .await;
        debug!(
            session_id = %session_id,
            delivered,
            current = ?state.current_turn().map(ConnectionId::as_str),
            "Published queue update"
        );
    }
}
