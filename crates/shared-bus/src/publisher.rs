//! # Event Publisher
//!
//! Defines the publishing side of the bus and the in-process room registry.

use crate::events::{Audience, SessionEnvelope, SessionEvent};
use crate::subscriber::{EventSubscriber, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::{ConnectionId, SessionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing session notifications.
///
/// Implementations must deliver the envelopes of one session to each
/// subscriber in the order `publish` was called.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the subscribers of a session.
    ///
    /// # Returns
    ///
    /// The number of room subscriptions that were handed the envelope.
    /// Audience filtering happens on the receiving side.
    async fn publish(&self, session_id: &SessionId, audience: Audience, event: SessionEvent)
        -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(
        &self,
        session_id: &SessionId,
        audience: Audience,
        event: SessionEvent,
    ) -> usize {
        (**self).publish(session_id, audience, event).await
    }

    fn events_published(&self) -> u64 {
        (**self).events_published()
    }
}

/// One session's channel and membership.
pub(crate) struct Room {
    pub(crate) sender: broadcast::Sender<Arc<SessionEnvelope>>,
    /// Connection -> number of live subscription handles.
    pub(crate) members: HashMap<ConnectionId, usize>,
    next_sequence: u64,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            members: HashMap::new(),
            next_sequence: 1,
        }
    }
}

pub(crate) type Rooms = Arc<DashMap<SessionId, Room>>;

/// In-memory implementation of the bus.
///
/// Uses one `tokio::sync::broadcast` channel per session. Suitable for
/// fan-out within one server process; the state store, not this bus, is the
/// shared resource between instances.
pub struct InMemoryEventBus {
    rooms: Rooms,

    /// Total events published.
    events_published: AtomicU64,

    /// Per-room channel capacity.
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory event bus with specified per-room capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            events_published: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Number of sessions that currently have at least one subscriber.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of live subscription handles on a session.
    #[must_use]
    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.rooms
            .get(session_id)
            .map_or(0, |room| room.sender.receiver_count())
    }

    /// Connections currently subscribed to a session, sorted.
    #[must_use]
    pub fn members(&self, session_id: &SessionId) -> Vec<ConnectionId> {
        let mut members: Vec<_> = self
            .rooms
            .get(session_id)
            .map(|room| room.members.keys().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn is_member(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool {
        self.rooms
            .get(session_id)
            .is_some_and(|room| room.members.contains_key(connection_id))
    }

    /// Get the per-room channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(
        &self,
        session_id: &SessionId,
        audience: Audience,
        event: SessionEvent,
    ) -> usize {
        let kind = event.kind();

        // Always increment counter (event was attempted)
        self.events_published.fetch_add(1, Ordering::Relaxed);

        // The shard lock is held while stamping and sending so sequence order
        // and channel order agree.
        let Some(mut room) = self.rooms.get_mut(session_id) else {
            trace!(session_id = %session_id, kind = kind.as_str(), "No room, event dropped");
            return 0;
        };
        let sequence = room.next_sequence;
        room.next_sequence += 1;

        let envelope = Arc::new(SessionEnvelope {
            session_id: session_id.clone(),
            sequence,
            audience,
            event,
        });

        match room.sender.send(envelope) {
            Ok(receivers) => {
                debug!(
                    session_id = %session_id,
                    kind = kind.as_str(),
                    sequence,
                    receivers,
                    "Event published"
                );
                receivers
            }
            Err(_) => {
                trace!(
                    session_id = %session_id,
                    kind = kind.as_str(),
                    "Event dropped (no receivers)"
                );
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe(&self, session_id: &SessionId, connection_id: &ConnectionId) -> Subscription {
        let receiver = {
            let mut room = self
                .rooms
                .entry(session_id.clone())
                .or_insert_with(|| Room::new(self.capacity));
            *room.members.entry(connection_id.clone()).or_insert(0) += 1;
            room.sender.subscribe()
        };

        debug!(session_id = %session_id, connection_id = %connection_id, "Subscribed");

        Subscription::new(
            receiver,
            session_id.clone(),
            connection_id.clone(),
            Arc::clone(&self.rooms),
        )
    }

    fn unsubscribe(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool {
        let removed = self
            .rooms
            .get_mut(session_id)
            .is_some_and(|mut room| room.members.remove(connection_id).is_some());
        if removed {
            self.rooms
                .remove_if(session_id, |_, room| room.members.is_empty());
            debug!(session_id = %session_id, connection_id = %connection_id, "Unsubscribed");
        }
        removed
    }
}
