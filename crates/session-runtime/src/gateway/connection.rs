//! Per-socket message handling.
//!
//! Frames from one socket are handled one at a time. Replies and session
//! broadcasts share the connection's outbox; the socket writer drains it.

use std::sync::Arc;
use std::time::Duration;

use shared_bus::{EventSubscriber, InMemoryEventBus};
use shared_types::{ConnectionId, Participant, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use turn_coordinator::{CoordinatorError, TurnCoordinatorApi, TurnCoordinatorBusAdapter};

use super::protocol::{ClientMessage, RejectReason, ServerMessage};
use super::registry::ConnectionRegistry;

/// Background attempts to take a closed connection out of a queue after the
/// store failed during disconnect.
const LEAVE_RETRY_ATTEMPTS: u32 = 8;

/// Delay before the first background attempt, doubled for each one after.
const LEAVE_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

const LEAVE_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

pub struct ConnectionHandler<C>
where
    C: TurnCoordinatorApi,
{
    connection_id: ConnectionId,
    adapter: Arc<TurnCoordinatorBusAdapter<C, InMemoryEventBus>>,
    registry: Arc<ConnectionRegistry>,
    outbox: mpsc::Sender<ServerMessage>,
}

impl<C> ConnectionHandler<C>
where
    C: TurnCoordinatorApi,
{
    pub fn new(
        connection_id: ConnectionId,
        adapter: Arc<TurnCoordinatorBusAdapter<C, InMemoryEventBus>>,
        registry: Arc<ConnectionRegistry>,
        outbox: mpsc::Sender<ServerMessage>,
    ) -> Self {
        registry.open(&connection_id);
        Self {
            connection_id,
            adapter,
            registry,
            outbox,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Tells the client its connection id.
    pub async fn greet(&self) {
        self.send(ServerMessage::Connected {
            connection_id: self.connection_id.clone(),
        })
        .await;
    }

    /// Parses and handles one text frame.
    pub async fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => self.invalid_frame(e).await,
        }
    }

    /// Replies to a frame that is not a valid client message.
    pub async fn invalid_frame(&self, reason: impl std::fmt::Display) {
        debug!(connection_id = %self.connection_id, error = %reason, "Invalid client frame");
        self.send(ServerMessage::error(format!("invalid message: {reason}"), false))
            .await;
    }

    pub async fn handle(&self, message: ClientMessage) {
        debug!(
            connection_id = %self.connection_id,
            session_id = %message.session_id(),
            action = message.action(),
            "Client message"
        );
        if let Err(e) = self.dispatch(&message).await {
            warn!(
                connection_id = %self.connection_id,
                session_id = %message.session_id(),
                action = message.action(),
                error = %e,
                "Action failed"
            );
            self.send(ServerMessage::error(e.to_string(), e.is_retryable()))
                .await;
        }
    }

    async fn dispatch(&self, message: &ClientMessage) -> Result<(), CoordinatorError> {
        match message {
            ClientMessage::JoinSession { session_id } => {
                self.subscribe(session_id);
                self.adapter
                    .open_session(session_id, &self.connection_id)
                    .await?;
            }
            ClientMessage::LeaveSession { session_id } => {
                if self.registry.is_joined(&self.connection_id, session_id) {
                    self.adapter
                        .leave_queue(session_id, &self.connection_id)
                        .await?;
                    self.unsubscribe(session_id).await;
                }
            }
            ClientMessage::JoinQueue {
                session_id,
                name,
                avatar,
            } => {
                if self.subscribe(session_id) {
                    self.adapter
                        .open_session(session_id, &self.connection_id)
                        .await?;
                }
                let participant =
                    Participant::new(self.connection_id.clone(), name.clone(), avatar.clone());
                self.adapter.join_queue(session_id, participant).await?;
            }
            ClientMessage::LeaveQueue { session_id } => {
                self.adapter
                    .leave_queue(session_id, &self.connection_id)
                    .await?;
            }
            ClientMessage::FinishTurn { session_id } => {
                let advanced = self
                    .adapter
                    .finish_turn(session_id, &self.connection_id)
                    .await?;
                if advanced.is_none() {
                    self.send(ServerMessage::rejected(message, RejectReason::NotTurnHolder))
                        .await;
                }
            }
            ClientMessage::BeatUpdate { session_id, grid } => {
                let update = self
                    .adapter
                    .submit_artifact_update(session_id, &self.connection_id, grid.clone())
                    .await?;
                if !update.accepted {
                    let reason = if update.state.is_some() {
                        RejectReason::NotTurnHolder
                    } else {
                        RejectReason::UnknownSession
                    };
                    self.send(ServerMessage::rejected(message, reason)).await;
                }
            }
            ClientMessage::TurnStatus { session_id } => {
                if self.registry.is_joined(&self.connection_id, session_id) {
                    self.adapter
                        .turn_timer(session_id, &self.connection_id)
                        .await?;
                } else {
                    self.send(ServerMessage::rejected(message, RejectReason::NotInSession))
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Leaves every queue this connection joined, then stops its forwarders.
    ///
    /// Leaves that fail on a retryable error are retried in the background
    /// with exponential backoff.
    pub async fn disconnect(self)
    where
        C: 'static,
    {
        let sessions = self.registry.close(&self.connection_id);
        let mut pending = Vec::new();
        for (session_id, forwarder) in sessions {
            if let Err(e) = self
                .adapter
                .leave_queue(&session_id, &self.connection_id)
                .await
            {
                warn!(
                    connection_id = %self.connection_id,
                    session_id = %session_id,
                    error = %e,
                    retrying = e.is_retryable(),
                    "Leave on disconnect failed"
                );
                if e.is_retryable() {
                    pending.push(session_id);
                }
            }
            stop(forwarder).await;
        }
        if !pending.is_empty() {
            tokio::spawn(retry_leave(
                Arc::clone(&self.adapter),
                self.connection_id.clone(),
                pending,
            ));
        }
        info!(connection_id = %self.connection_id, "Connection closed");
    }

    /// Starts forwarding the session's broadcasts. Returns `false` if the
    /// connection was already subscribed.
    fn subscribe(&self, session_id: &SessionId) -> bool {
        let bus = self.adapter.publisher();
        self.registry
            .join_with(&self.connection_id, session_id, || {
                let mut subscription = bus.subscribe(session_id, &self.connection_id);
                let outbox = self.outbox.clone();
                tokio::spawn(async move {
                    while let Some(envelope) = subscription.recv().await {
                        if outbox.send(ServerMessage::from(&*envelope)).await.is_err() {
                            break;
                        }
                    }
                })
            })
    }

    async fn unsubscribe(&self, session_id: &SessionId) {
        if let Some(forwarder) = self.registry.leave(&self.connection_id, session_id) {
            stop(forwarder).await;
        }
    }

    async fn send(&self, message: ServerMessage) {
        if self.outbox.send(message).await.is_err() {
            debug!(connection_id = %self.connection_id, "Outbox closed, dropping message");
        }
    }
}

async fn retry_leave<C>(
    adapter: Arc<TurnCoordinatorBusAdapter<C, InMemoryEventBus>>,
    connection_id: ConnectionId,
    mut pending: Vec<SessionId>,
) where
    C: TurnCoordinatorApi,
{
    for attempt in 1..=LEAVE_RETRY_ATTEMPTS {
        tokio::time::sleep(leave_retry_delay(attempt)).await;

        let mut failed = Vec::new();
        for session_id in pending {
            match adapter.leave_queue(&session_id, &connection_id).await {
                Ok(_) => info!(
                    connection_id = %connection_id,
                    session_id = %session_id,
                    attempt,
                    "Left queue after disconnect"
                ),
                Err(e) => {
                    debug!(
                        connection_id = %connection_id,
                        session_id = %session_id,
                        attempt,
                        error = %e,
                        "Leave retry failed"
                    );
                    failed.push(session_id);
                }
            }
        }
        if failed.is_empty() {
            return;
        }
        pending = failed;
    }

    error!(
        connection_id = %connection_id,
        sessions = pending.len(),
        attempts = LEAVE_RETRY_ATTEMPTS,
        "Giving up leaving queues for closed connection"
    );
}

fn leave_retry_delay(attempt: u32) -> Duration {
    LEAVE_RETRY_BASE_DELAY
        .saturating_mul(1 << attempt.saturating_sub(1).min(6))
        .min(LEAVE_RETRY_MAX_DELAY)
}

/// Aborts a forwarder and waits for it, releasing its bus membership.
async fn stop(forwarder: tokio::task::JoinHandle<()>) {
    forwarder.abort();
    let _ = forwarder.await;
}
