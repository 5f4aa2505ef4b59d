//! Client/server message formats.
//!
//! Every frame is a JSON object tagged by `type`. Event names match the
//! browser client (`join-session`, `queue-update`, `beat-update`, ...).

use serde::{Deserialize, Serialize};
use shared_bus::{SessionEnvelope, SessionEvent};
use shared_types::{BeatGrid, ConnectionId, Participant, SessionId};

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Start observing a session and receive its snapshot.
    JoinSession {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// Leave the session's queue and stop observing it.
    LeaveSession {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    JoinQueue {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        name: String,
        #[serde(default)]
        avatar: String,
    },

    LeaveQueue {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    FinishTurn {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// Replace the grid. Only the turn holder's update is kept.
    BeatUpdate {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        grid: BeatGrid,
    },

    /// Ask for a `turn-timer` reply.
    TurnStatus {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
}

impl ClientMessage {
    pub fn session_id(&self) -> &SessionId {
        match self {
            ClientMessage::JoinSession { session_id }
            | ClientMessage::LeaveSession { session_id }
            | ClientMessage::JoinQueue { session_id, .. }
            | ClientMessage::LeaveQueue { session_id }
            | ClientMessage::FinishTurn { session_id }
            | ClientMessage::BeatUpdate { session_id, .. }
            | ClientMessage::TurnStatus { session_id } => session_id,
        }
    }

    /// Wire name of the message, used in logs and `rejected` replies.
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::JoinSession { .. } => "join-session",
            ClientMessage::LeaveSession { .. } => "leave-session",
            ClientMessage::JoinQueue { .. } => "join-queue",
            ClientMessage::LeaveQueue { .. } => "leave-queue",
            ClientMessage::FinishTurn { .. } => "finish-turn",
            ClientMessage::BeatUpdate { .. } => "beat-update",
            ClientMessage::TurnStatus { .. } => "turn-status",
        }
    }
}

/// Why an action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    NotTurnHolder,
    UnknownSession,
    /// The connection has not sent `join-session` for this session.
    NotInSession,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First frame on every socket.
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
    },

    QueueUpdate {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        queue: Vec<Participant>,
        #[serde(rename = "currentTurn")]
        current_turn: Option<ConnectionId>,
    },

    BeatUpdate {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        grid: BeatGrid,
    },

    TurnTimer {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        #[serde(rename = "remainingSecs")]
        remaining_secs: u64,
    },

    /// Sent to the caller only.
    Rejected {
        #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none", default)]
        session_id: Option<SessionId>,
        action: String,
        reason: RejectReason,
    },

    Error {
        message: String,
        retryable: bool,
    },
}

impl ServerMessage {
    pub fn rejected(message: &ClientMessage, reason: RejectReason) -> Self {
        ServerMessage::Rejected {
            session_id: Some(message.session_id().clone()),
            action: message.action().to_string(),
            reason,
        }
    }

    pub fn error(message: impl Into<String>, retryable: bool) -> Self {
        ServerMessage::Error {
            message: message.into(),
            retryable,
        }
    }
}

impl From<&SessionEnvelope> for ServerMessage {
    fn from(envelope: &SessionEnvelope) -> Self {
        let session_id = envelope.session_id.clone();
        match &envelope.event {
            SessionEvent::QueueUpdated(snapshot) => ServerMessage::QueueUpdate {
                session_id,
                queue: snapshot.queue.clone(),
                current_turn: snapshot.current_turn.clone(),
            },
            SessionEvent::ArtifactUpdated(grid) => ServerMessage::BeatUpdate {
                session_id,
                grid: grid.clone(),
            },
            SessionEvent::TurnTimer { remaining_secs } => ServerMessage::TurnTimer {
                session_id,
                remaining_secs: *remaining_secs,
            },
        }
    }
}
