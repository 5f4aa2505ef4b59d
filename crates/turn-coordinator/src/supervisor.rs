//! # Timeout Supervisor
//!
//! Periodic worker that force-advances turns whose budget is spent.
//!
//! Each scan walks the store's active-session index, reads every session's
//! turn status and calls `force_advance_if_expired` on the expired ones.
//! The expiry is re-checked inside the coordinator's serialised section, so
//! a turn that was finished between the scan read and the forced write is
//! left alone. Index entries whose record is gone or idle are pruned.
//!
//! Sessions are processed concurrently within a scan. A failure on one
//! session is logged and counted; it never stops the scan or the loop.

use std::sync::Arc;

use futures::future::join_all;
use shared_bus::EventPublisher;
use shared_types::SessionId;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::TurnCoordinatorBusAdapter;
use crate::domain::config::SupervisorConfig;
use crate::domain::errors::CoordinatorError;
use crate::ports::inbound::TurnCoordinatorApi;

/// What one scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Sessions read from the index.
    pub scanned: usize,
    /// Sessions whose turn was force-advanced.
    pub advanced: Vec<SessionId>,
    /// Index entries dropped because nobody holds a turn there.
    pub pruned: usize,
    /// Sessions that failed with a coordinator error.
    pub failed: usize,
}

enum SessionOutcome {
    Advanced(SessionId),
    Pruned,
    Untouched,
    Failed,
}

pub struct TimeoutSupervisor<C, P>
where
    C: TurnCoordinatorApi,
    P: EventPublisher,
{
    adapter: Arc<TurnCoordinatorBusAdapter<C, P>>,
    config: SupervisorConfig,
}

impl<C, P> TimeoutSupervisor<C, P>
where
    C: TurnCoordinatorApi,
    P: EventPublisher,
{
    pub fn new(adapter: Arc<TurnCoordinatorBusAdapter<C, P>>, config: SupervisorConfig) -> Self {
        Self { adapter, config }
    }

    /// One pass over the active index.
    ///
    /// Fails only if the index itself cannot be read.
    pub async fn scan_once(&self) -> Result<ScanReport, CoordinatorError> {
        let sessions = self.adapter.coordinator().active_sessions().await?;
        let outcomes = join_all(sessions.iter().map(|s| self.check_session(s))).await;

        let mut report = ScanReport {
            scanned: sessions.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                SessionOutcome::Advanced(session_id) => report.advanced.push(session_id),
                SessionOutcome::Pruned => report.pruned += 1,
                SessionOutcome::Failed => report.failed += 1,
                SessionOutcome::Untouched => {}
            }
        }
        Ok(report)
    }

    async fn check_session(&self, session_id: &SessionId) -> SessionOutcome {
        match self.try_check_session(session_id).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(session_id = %session_id, %error, "Timeout check failed");
                SessionOutcome::Failed
            }
        }
    }

    async fn try_check_session(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionOutcome, CoordinatorError> {
        let coordinator = self.adapter.coordinator();
        match coordinator.turn_status(session_id).await? {
            None => {
                if coordinator.prune_inactive(session_id).await? {
                    Ok(SessionOutcome::Pruned)
                } else {
                    Ok(SessionOutcome::Untouched)
                }
            }
            Some(status) if status.expired => {
                match self.adapter.force_advance_if_expired(session_id).await? {
                    Some(_) => Ok(SessionOutcome::Advanced(session_id.clone())),
                    None => Ok(SessionOutcome::Untouched),
                }
            }
            Some(_) => Ok(SessionOutcome::Untouched),
        }
    }

    /// Scans every `scan_interval` until `shutdown` changes or its sender is
    /// dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.scan_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_ms = u64::try_from(self.config.scan_interval.as_millis()).unwrap_or(u64::MAX),
            "Timeout supervisor started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.scan_once().await {
                        Ok(report) if !report.advanced.is_empty() || report.failed > 0 => {
                            info!(
                                scanned = report.scanned,
                                advanced = report.advanced.len(),
                                pruned = report.pruned,
                                failed = report.failed,
                                "Timeout scan complete"
                            );
                        }
                        Ok(report) => {
                            debug!(
                                scanned = report.scanned,
                                pruned = report.pruned,
                                "Timeout scan complete"
                            );
                        }
                        Err(error) => {
                            warn!(%error, "Timeout scan skipped: active index unreadable");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("Timeout supervisor received shutdown signal");
                    break;
                }
            }
        }
    }
}
