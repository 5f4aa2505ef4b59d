//! # Session Events
//!
//! Every notification that flows through the bus.

use serde::{Deserialize, Serialize};
use shared_types::{BeatGrid, ConnectionId, QueueSnapshot, SessionId};

/// Notification kinds, named as clients know them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    QueueUpdate,
    #[serde(rename = "beat-update")]
    ArtifactUpdate,
    TurnTimer,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::QueueUpdate => "queue-update",
            EventKind::ArtifactUpdate => "beat-update",
            EventKind::TurnTimer => "turn-timer",
        }
    }
}

/// Payload of a session notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// The queue or the turn holder changed.
    QueueUpdated(QueueSnapshot),

    /// The grid was replaced by the turn holder.
    ArtifactUpdated(BeatGrid),

    /// Whole seconds left in the current turn.
    TurnTimer { remaining_secs: u64 },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::QueueUpdated(_) => EventKind::QueueUpdate,
            SessionEvent::ArtifactUpdated(_) => EventKind::ArtifactUpdate,
            SessionEvent::TurnTimer { .. } => EventKind::TurnTimer,
        }
    }
}

/// Which subscribers of a session receive an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Audience {
    All,
    /// Everyone except the originator, who already holds the content.
    AllExcept(ConnectionId),
    /// A single connection, e.g. the initial snapshot of a joiner.
    Only(ConnectionId),
}

impl Audience {
    pub fn includes(&self, connection_id: &ConnectionId) -> bool {
        match self {
            Audience::All => true,
            Audience::AllExcept(excluded) => excluded != connection_id,
            Audience::Only(target) => target == connection_id,
        }
    }
}

/// A sequenced, addressed event for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub session_id: SessionId,
    /// Per-session publish order, starting at 1.
    pub sequence: u64,
    pub audience: Audience,
    pub event: SessionEvent,
}

impl SessionEnvelope {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}
