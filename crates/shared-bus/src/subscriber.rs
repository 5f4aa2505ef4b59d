//! # Event Subscriber
//!
//! Defines the subscription side of the bus.

use crate::events::SessionEnvelope;
use crate::publisher::Rooms;
use shared_types::{ConnectionId, SessionId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The room was closed (last member left or bus dropped).
    #[error("Session room closed")]
    Closed,
}

/// Room membership management.
pub trait EventSubscriber: Send + Sync {
    /// Join a session's room as `connection_id`.
    fn subscribe(&self, session_id: &SessionId, connection_id: &ConnectionId) -> Subscription;

    /// Leave a session's room. Returns `false` if the connection was not a member.
    fn unsubscribe(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool;
}

impl<S: EventSubscriber + ?Sized> EventSubscriber for Arc<S> {
    fn subscribe(&self, session_id: &SessionId, connection_id: &ConnectionId) -> Subscription {
        (**self).subscribe(session_id, connection_id)
    }

    fn unsubscribe(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool {
        (**self).unsubscribe(session_id, connection_id)
    }
}

/// A connection's handle on one session room.
///
/// Yields only envelopes whose audience includes the owning connection.
/// When dropped, the membership is released.
pub struct Subscription {
    receiver: broadcast::Receiver<Arc<SessionEnvelope>>,
    session_id: SessionId,
    connection_id: ConnectionId,
    rooms: Rooms,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<Arc<SessionEnvelope>>,
        session_id: SessionId,
        connection_id: ConnectionId,
        rooms: Rooms,
    ) -> Self {
        Self {
            receiver,
            session_id,
            connection_id,
            rooms,
        }
    }

    /// Receive the next envelope addressed to this connection.
    ///
    /// # Returns
    ///
    /// - `Some(envelope)` - The next matching envelope
    /// - `None` - The room closed or this connection was unsubscribed
    pub async fn recv(&mut self) -> Option<Arc<SessionEnvelope>> {
        loop {
            let envelope = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(
                        session_id = %self.session_id,
                        connection_id = %self.connection_id,
                        lagged = count,
                        "Subscriber lagged, some events dropped"
                    );
                    continue;
                }
            };

            if !self.still_member() {
                return None;
            }
            if envelope.audience.includes(&self.connection_id) {
                return Some(envelope);
            }
        }
    }

    /// Try to receive the next matching envelope without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(envelope))` - An envelope was available and matched
    /// - `Ok(None)` - No envelope available (would block)
    /// - `Err(SubscriptionError::Closed)` - The room was closed
    pub fn try_recv(&mut self) -> Result<Option<Arc<SessionEnvelope>>, SubscriptionError> {
        loop {
            let envelope = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if !self.still_member() {
                return Err(SubscriptionError::Closed);
            }
            if envelope.audience.includes(&self.connection_id) {
                return Ok(Some(envelope));
            }
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    fn still_member(&self) -> bool {
        self.rooms
            .get(&self.session_id)
            .is_some_and(|room| room.members.contains_key(&self.connection_id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let emptied = match self.rooms.get_mut(&self.session_id) {
            Some(mut room) => {
                if let Some(count) = room.members.get_mut(&self.connection_id) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        room.members.remove(&self.connection_id);
                    }
                }
                room.members.is_empty()
            }
            None => false,
        };

        if emptied {
            self.rooms
                .remove_if(&self.session_id, |_, room| room.members.is_empty());
        }
        debug!(
            session_id = %self.session_id,
            connection_id = %self.connection_id,
            "Subscription dropped"
        );
    }
}
