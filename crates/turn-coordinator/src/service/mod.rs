//! # Turn Coordinator Service
//!
//! Implements `TurnCoordinatorApi` over a `SessionStateStore`.
//!
//! ## Serialisation
//!
//! Every mutation is a read-modify-write of the session's record:
//!
//! 1. Take the in-process lock for the session (`locks.rs`)
//! 2. Read the raw record and decode it
//! 3. Apply the domain transition to a local copy
//! 4. Write it back with `compare_and_swap` against the exact bytes read
//! 5. On a lost swap (another instance wrote first) go back to 2
//!
//! The lock keeps callers in this process from burning swaps against each
//! other; the swap keeps instances sharing the store from losing updates.
//! Transitions that change nothing skip step 4 entirely.

pub(crate) mod locks;

use async_trait::async_trait;
use session_telemetry::{
    OperationTimer, CAS_CONFLICTS, CORRUPT_STATE_RECOVERED, FORCED_ADVANCES, REJECTED_ACTIONS,
    STORE_FAILURES, TURN_TRANSITIONS,
};
use shared_types::{BeatGrid, ConnectionId, Participant, SessionId, Timestamp};
use tracing::{debug, error, info, warn};

use crate::domain::codec;
use crate::domain::config::CoordinatorConfig;
use crate::domain::errors::{CoordinatorError, StoreError};
use crate::domain::outcomes::{ArtifactUpdate, Transition, TurnStatus};
use crate::domain::state::SessionTurnState;
use crate::ports::inbound::TurnCoordinatorApi;
use crate::ports::outbound::{SessionStateStore, TimeSource};

use locks::SessionLocks;

/// What a transition wants done with the modified state.
enum Step<R> {
    /// Write the slot back and return `R` once the write lands.
    Persist(R),
    /// Return `R` without writing.
    Keep(R),
}

/// A record as read from the store.
struct Loaded {
    /// Bytes exactly as stored, used as the swap's expected value.
    raw: Option<Vec<u8>>,
    /// `None` if absent or unreadable.
    state: Option<SessionTurnState>,
}

/// The turn coordinator.
///
/// Stateless apart from the lock table: any number of instances may share
/// one store.
pub struct TurnCoordinatorService<S, T>
where
    S: SessionStateStore,
    T: TimeSource,
{
    store: S,
    clock: T,
    config: CoordinatorConfig,
    locks: SessionLocks,
}

impl<S, T> TurnCoordinatorService<S, T>
where
    S: SessionStateStore,
    T: TimeSource,
{
    pub fn new(store: S, clock: T, config: CoordinatorConfig) -> Self {
        Self {
            store,
            clock,
            config,
            locks: SessionLocks::default(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.locks.len()
    }

    async fn load(
        &self,
        session_id: &SessionId,
        key: &str,
        operation: &'static str,
    ) -> Result<Loaded, CoordinatorError> {
        let raw = self
            .store
            .get(key)
            .await
            .map_err(|e| self.store_failure(operation, e))?;

        let state = match raw.as_deref() {
            None => None,
            Some(bytes) => match codec::decode(bytes) {
                Ok(state) => Some(state),
                Err(error) => {
                    CORRUPT_STATE_RECOVERED.inc();
                    warn!(
                        session_id = %session_id,
                        operation,
                        %error,
                        "Unreadable session record, treating as absent"
                    );
                    None
                }
            },
        };

        Ok(Loaded { raw, state })
    }

    /// Serialised read-modify-write of one session.
    ///
    /// `apply` may run more than once (once per swap attempt), each time on
    /// a fresh read.
    async fn mutate<R, F>(
        &self,
        session_id: &SessionId,
        operation: &'static str,
        mut apply: F,
    ) -> Result<R, CoordinatorError>
    where
        R: Send,
        F: FnMut(&mut Option<SessionTurnState>, Timestamp) -> Step<R> + Send,
    {
        let _timer = OperationTimer::start(operation);
        let _guard = self.locks.lock(session_id).await;
        let key = self.config.state_key(session_id);
        let attempts = self.config.max_cas_retries.max(1);

        for attempt in 1..=attempts {
            let loaded = self.load(session_id, &key, operation).await?;
            let mut slot = loaded.state;

            let value = match apply(&mut slot, self.clock.now()) {
                Step::Keep(value) => return Ok(value),
                Step::Persist(value) => value,
            };
            let Some(state) = slot else {
                return Ok(value);
            };
            debug_assert!(
                state.check_invariants().is_ok(),
                "{operation} produced an inconsistent state: {state:?}"
            );

            let encoded = codec::encode(&state).map_err(CoordinatorError::Encode)?;
            let swapped = self
                .store
                .compare_and_swap(&key, loaded.raw.as_deref(), &encoded, self.config.state_ttl)
                .await
                .map_err(|e| self.store_failure(operation, e))?;

            if swapped {
                TURN_TRANSITIONS.with_label_values(&[operation]).inc();
                self.sync_active_index(session_id, &state, operation).await;
                return Ok(value);
            }

            CAS_CONFLICTS.inc();
            debug!(
                session_id = %session_id,
                operation,
                attempt,
                "Session record changed underneath us, retrying"
            );
        }

        warn!(
            session_id = %session_id,
            operation,
            attempts,
            "Giving up after repeated write conflicts"
        );
        Err(CoordinatorError::Contention {
            session_id: session_id.clone(),
            attempts,
        })
    }

    /// Keeps the active index in step with the holder after a write.
    ///
    /// A failure here leaves the record correct; the supervisor only misses
    /// the session until its next transition.
    async fn sync_active_index(
        &self,
        session_id: &SessionId,
        state: &SessionTurnState,
        operation: &'static str,
    ) {
        let result = if state.current_turn().is_some() {
            self.store.mark_active(session_id).await
        } else {
            self.store.clear_active(session_id).await
        };
        if let Err(error) = result {
            STORE_FAILURES.with_label_values(&[operation]).inc();
            warn!(
                session_id = %session_id,
                operation,
                %error,
                "Failed to update active-session index"
            );
        }
    }

    fn store_failure(&self, operation: &'static str, source: StoreError) -> CoordinatorError {
        STORE_FAILURES.with_label_values(&[operation]).inc();
        error!(operation, error = %source, "Session store call failed");
        CoordinatorError::StoreUnavailable { operation, source }
    }

    async fn advance(
        &self,
        session_id: &SessionId,
        operation: &'static str,
        only_if_expired: bool,
    ) -> Result<Option<SessionTurnState>, CoordinatorError> {
        let budget = self.config.turn_budget_ms();
        let outcome = self
            .mutate(session_id, operation, |slot, now| {
                let Some(state) = slot.as_mut() else {
                    return Step::Keep(None);
                };
                if only_if_expired && !state.is_expired(now, budget) {
                    return Step::Keep(None);
                }
                let previous = state.current_turn().cloned();
                if state.rotate(now) {
                    Step::Persist(Some((state.clone(), previous)))
                } else {
                    Step::Keep(None)
                }
            })
            .await?;

        Ok(outcome.map(|(state, previous)| {
            FORCED_ADVANCES.inc();
            info!(
                session_id = %session_id,
                previous = ?previous.as_ref().map(ConnectionId::as_str),
                current = ?state.current_turn().map(ConnectionId::as_str),
                "Turn force-advanced"
            );
            state
        }))
    }
}

#[async_trait]
impl<S, T> TurnCoordinatorApi for TurnCoordinatorService<S, T>
where
    S: SessionStateStore,
    T: TimeSource,
{
    async fn get_or_init(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionTurnState, CoordinatorError> {
        let grid = self.config.grid;
        self.mutate(session_id, "get_or_init", |slot, _| {
            if let Some(state) = slot.as_ref() {
                return Step::Keep(state.clone());
            }
            let state = SessionTurnState::new(grid);
            *slot = Some(state.clone());
            debug!(session_id = %session_id, "Initialised session record");
            Step::Persist(state)
        })
        .await
    }

    async fn peek(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError> {
        let key = self.config.state_key(session_id);
        Ok(self.load(session_id, &key, "peek").await?.state)
    }

    async fn join_queue(
        &self,
        session_id: &SessionId,
        participant: Participant,
    ) -> Result<Transition, CoordinatorError> {
        let grid = self.config.grid;
        let transition = self
            .mutate(session_id, "join", |slot, now| {
                let fresh = slot.is_none();
                let state = slot.get_or_insert_with(|| SessionTurnState::new(grid));
                let changed = state.join(participant.clone(), now);
                let transition = Transition {
                    state: state.clone(),
                    changed,
                };
                if changed || fresh {
                    Step::Persist(transition)
                } else {
                    Step::Keep(transition)
                }
            })
            .await?;

        if transition.changed {
            info!(
                session_id = %session_id,
                connection_id = %participant.connection_id,
                queue_len = transition.state.queue().len(),
                has_turn = transition.state.is_turn_of(&participant.connection_id),
                "Participant joined queue"
            );
        } else {
            debug!(
                session_id = %session_id,
                connection_id = %participant.connection_id,
                "Participant already queued"
            );
        }
        Ok(transition)
    }

    async fn leave_queue(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Result<Option<Transition>, CoordinatorError> {
        let transition = self
            .mutate(session_id, "leave", |slot, now| {
                let Some(state) = slot.as_mut() else {
                    return Step::Keep(None);
                };
                let changed = state.leave(connection_id, now);
                let transition = Some(Transition {
                    state: state.clone(),
                    changed,
                });
                if changed {
                    Step::Persist(transition)
                } else {
                    Step::Keep(transition)
                }
            })
            .await?;

        if let Some(t) = transition.as_ref().filter(|t| t.changed) {
            info!(
                session_id = %session_id,
                connection_id = %connection_id,
                queue_len = t.state.queue().len(),
                "Participant left queue"
            );
        }
        Ok(transition)
    }

    async fn finish_turn(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError> {
        let state = self
            .mutate(session_id, "finish", |slot, now| {
                let Some(state) = slot.as_mut() else {
                    return Step::Keep(None);
                };
                if state.finish(connection_id, now) {
                    Step::Persist(Some(state.clone()))
                } else {
                    Step::Keep(None)
                }
            })
            .await?;

        match &state {
            Some(state) => info!(
                session_id = %session_id,
                finished_by = %connection_id,
                current = ?state.current_turn().map(ConnectionId::as_str),
                "Turn finished"
            ),
            None => {
                REJECTED_ACTIONS.with_label_values(&["finish"]).inc();
                debug!(
                    session_id = %session_id,
                    connection_id = %connection_id,
                    "Ignoring finish from non-holder"
                );
            }
        }
        Ok(state)
    }

    async fn submit_artifact_update(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
        grid: BeatGrid,
    ) -> Result<ArtifactUpdate, CoordinatorError> {
        let update = self
            .mutate(session_id, "submit", |slot, _| {
                let Some(state) = slot.as_mut() else {
                    return Step::Keep(ArtifactUpdate::rejected(None));
                };
                if state.replace_artifact(connection_id, grid.clone()) {
                    Step::Persist(ArtifactUpdate::accepted(state.clone()))
                } else {
                    Step::Keep(ArtifactUpdate::rejected(Some(state.clone())))
                }
            })
            .await?;

        if update.accepted {
            debug!(
                session_id = %session_id,
                connection_id = %connection_id,
                active_cells = grid.active_cells(),
                "Grid updated"
            );
        } else {
            REJECTED_ACTIONS.with_label_values(&["submit"]).inc();
            debug!(
                session_id = %session_id,
                connection_id = %connection_id,
                "Ignoring grid update from non-holder"
            );
        }
        Ok(update)
    }

    async fn force_advance(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError> {
        self.advance(session_id, "force_advance", false).await
    }

    async fn force_advance_if_expired(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionTurnState>, CoordinatorError> {
        self.advance(session_id, "force_advance_expired", true).await
    }

    async fn turn_status(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<TurnStatus>, CoordinatorError> {
        let state = self.peek(session_id).await?;
        let now = self.clock.now();
        let budget = self.config.turn_budget_ms();

        Ok(state.and_then(|state| {
            let holder = state.current_turn()?.clone();
            Some(TurnStatus {
                holder,
                elapsed_ms: state.elapsed_ms(now).unwrap_or(0),
                remaining_secs: state.remaining_secs(now, budget),
                expired: state.is_expired(now, budget),
            })
        }))
    }

    async fn active_sessions(&self) -> Result<Vec<SessionId>, CoordinatorError> {
        self.store
            .active_sessions()
            .await
            .map_err(|e| self.store_failure("active_sessions", e))
    }

    async fn prune_inactive(&self, session_id: &SessionId) -> Result<bool, CoordinatorError> {
        const OPERATION: &str = "prune";
        let _guard = self.locks.lock(session_id).await;
        let key = self.config.state_key(session_id);

        let has_holder = |loaded: &Loaded| {
            loaded
                .state
                .as_ref()
                .is_some_and(|s| s.current_turn().is_some())
        };

        if has_holder(&self.load(session_id, &key, OPERATION).await?) {
            return Ok(false);
        }
        self.store
            .clear_active(session_id)
            .await
            .map_err(|e| self.store_failure(OPERATION, e))?;

        // Another instance may have granted a turn between the read and the
        // clear; its own mark may already have been erased.
        if has_holder(&self.load(session_id, &key, OPERATION).await?) {
            self.store
                .mark_active(session_id)
                .await
                .map_err(|e| self.store_failure(OPERATION, e))?;
            return Ok(false);
        }

        debug!(session_id = %session_id, "Pruned inactive session from index");
        Ok(true)
    }
}
