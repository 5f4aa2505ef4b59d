//! # Core Entities
//!
//! Identifiers and queue value types.
//!
//! ## Clusters
//!
//! - **Identity**: `SessionId`, `ConnectionId`
//! - **Queue**: `Participant`, `QueueSnapshot`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

// =============================================================================
// IDENTITY
// =============================================================================

/// Opaque identifier of a collaboration room.
///
/// Sessions are never pre-registered; any id names a session as soon as the
/// first connection joins it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of one live realtime connection.
///
/// Unique per socket. Two tabs of the same user are two connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh random connection id.
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// =============================================================================
// QUEUE
// =============================================================================

/// A connection waiting in (or holding) a session's turn queue.
///
/// Immutable once created. Field names on the wire follow the client
/// protocol (`id`, `name`, `avatar`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "id")]
    pub connection_id: ConnectionId,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "avatar")]
    pub avatar_tag: String,
}

impl Participant {
    pub fn new(
        connection_id: ConnectionId,
        display_name: impl Into<String>,
        avatar_tag: impl Into<String>,
    ) -> Self {
        Self {
            connection_id,
            display_name: display_name.into(),
            avatar_tag: avatar_tag.into(),
        }
    }
}

/// The `{queue, currentTurn}` pair every observer renders from.
///
/// Queue order is turn order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub queue: Vec<Participant>,
    pub current_turn: Option<ConnectionId>,
}

impl QueueSnapshot {
    /// Position of a connection in the queue, if present.
    pub fn position_of(&self, connection_id: &ConnectionId) -> Option<usize> {
        self.queue
            .iter()
            .position(|p| &p.connection_id == connection_id)
    }

    pub fn is_turn_of(&self, connection_id: &ConnectionId) -> bool {
        self.current_turn.as_ref() == Some(connection_id)
    }
}
