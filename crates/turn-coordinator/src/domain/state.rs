//! # Session Turn State
//!
//! The single record kept per session: queue, turn holder, turn start time
//! and the shared grid.
//!
//! ## Invariants
//!
//! - Queue empty ⇔ no holder and no start time
//! - The holder is queued
//! - No connection is queued twice
//! - Start time is set exactly when a holder is
//!
//! Every transition below preserves these. `check_invariants` reports the
//! first one that is broken, which `codec::decode` uses to reject
//! inconsistent records.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use shared_types::{BeatGrid, ConnectionId, GridDimensions, Participant, QueueSnapshot, Timestamp};

use super::errors::InvariantViolation;

/// Per-session coordination record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTurnState {
    queue: Vec<Participant>,
    current_turn: Option<ConnectionId>,
    #[serde(rename = "turnStartTime")]
    turn_started_at: Option<Timestamp>,
    #[serde(rename = "beatData")]
    artifact: BeatGrid,
}

impl SessionTurnState {
    /// Empty queue, nobody's turn, zeroed grid.
    pub fn new(dimensions: GridDimensions) -> Self {
        Self {
            queue: Vec::new(),
            current_turn: None,
            turn_started_at: None,
            artifact: BeatGrid::zeroed(dimensions),
        }
    }

    pub fn queue(&self) -> &[Participant] {
        &self.queue
    }

    pub fn current_turn(&self) -> Option<&ConnectionId> {
        self.current_turn.as_ref()
    }

    pub fn turn_started_at(&self) -> Option<Timestamp> {
        self.turn_started_at
    }

    pub fn artifact(&self) -> &BeatGrid {
        &self.artifact
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.queue.iter().any(|p| &p.connection_id == connection_id)
    }

    pub fn is_turn_of(&self, connection_id: &ConnectionId) -> bool {
        self.current_turn.as_ref() == Some(connection_id)
    }

    /// The participant currently holding the turn.
    pub fn holder(&self) -> Option<&Participant> {
        let current = self.current_turn.as_ref()?;
        self.queue.iter().find(|p| &p.connection_id == current)
    }

    /// What observers render: queue order plus holder.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue: self.queue.clone(),
            current_turn: self.current_turn.clone(),
        }
    }

    /// Milliseconds since the turn began. Clock skew never yields a
    /// negative elapsed time.
    pub fn elapsed_ms(&self, now: Timestamp) -> Option<u64> {
        self.turn_started_at.map(|started| now.saturating_sub(started))
    }

    /// Whole seconds left in the turn, rounded up. Zero when nobody holds
    /// the turn or the budget is spent.
    pub fn remaining_secs(&self, now: Timestamp, budget_ms: u64) -> u64 {
        match self.elapsed_ms(now) {
            Some(elapsed) => budget_ms.saturating_sub(elapsed).div_ceil(1000),
            None => 0,
        }
    }

    /// Whether the holder has used up the budget.
    pub fn is_expired(&self, now: Timestamp, budget_ms: u64) -> bool {
        self.current_turn.is_some()
            && self
                .elapsed_ms(now)
                .map(|elapsed| elapsed >= budget_ms)
                .unwrap_or(false)
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Appends `participant`. The first participant of an empty queue gets
    /// the turn. Returns `false` if the connection was already queued.
    pub fn join(&mut self, participant: Participant, now: Timestamp) -> bool {
        if self.contains(&participant.connection_id) {
            return false;
        }
        self.queue.push(participant);
        if self.current_turn.is_none() {
            self.grant_to_head(now);
        }
        true
    }

    /// Removes `connection_id`. If it held the turn, the turn passes to the
    /// new head (or nobody). Returns `false` if it was not queued.
    pub fn leave(&mut self, connection_id: &ConnectionId, now: Timestamp) -> bool {
        let Some(index) = self
            .queue
            .iter()
            .position(|p| &p.connection_id == connection_id)
        else {
            return false;
        };
        self.queue.remove(index);
        if self.is_turn_of(connection_id) {
            self.grant_to_head(now);
        }
        true
    }

    /// Moves the holder to the tail and hands the turn to the new head. A
    /// lone participant keeps the turn with a fresh start time. Returns
    /// `false` if nobody holds the turn.
    pub fn rotate(&mut self, now: Timestamp) -> bool {
        let Some(index) = self
            .current_turn
            .as_ref()
            .and_then(|holder| self.queue.iter().position(|p| &p.connection_id == holder))
        else {
            return false;
        };
        let holder = self.queue.remove(index);
        self.queue.push(holder);
        self.grant_to_head(now);
        true
    }

    /// Rotates only if `connection_id` holds the turn.
    pub fn finish(&mut self, connection_id: &ConnectionId, now: Timestamp) -> bool {
        self.is_turn_of(connection_id) && self.rotate(now)
    }

    /// Replaces the grid only if `connection_id` holds the turn. The grid is
    /// stored as given.
    pub fn replace_artifact(&mut self, connection_id: &ConnectionId, artifact: BeatGrid) -> bool {
        if !self.is_turn_of(connection_id) {
            return false;
        }
        self.artifact = artifact;
        true
    }

    fn grant_to_head(&mut self, now: Timestamp) {
        match self.queue.first() {
            Some(head) => {
                self.current_turn = Some(head.connection_id.clone());
                self.turn_started_at = Some(now);
            }
            None => {
                self.current_turn = None;
                self.turn_started_at = None;
            }
        }
    }

    // =========================================================================
    // INVARIANTS
    // =========================================================================

    /// Reports the first broken invariant, if any.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.current_turn.is_some() != self.turn_started_at.is_some() {
            return Err(InvariantViolation::StartTimeMismatch);
        }

        if self.queue.is_empty() {
            if self.current_turn.is_some() {
                return Err(InvariantViolation::TurnWithoutQueue);
            }
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(self.queue.len());
        for participant in &self.queue {
            if !seen.insert(&participant.connection_id) {
                return Err(InvariantViolation::DuplicateParticipant(
                    participant.connection_id.clone(),
                ));
            }
        }

        match &self.current_turn {
            None => Err(InvariantViolation::QueueWithoutTurn),
            Some(holder) if !seen.contains(holder) => {
                Err(InvariantViolation::HolderNotQueued(holder.clone()))
            }
            Some(_) => Ok(()),
        }
    }
}
