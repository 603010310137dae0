//! Date-driven status scheduler.
//!
//! Every tick opens one transaction and takes a transaction-scoped advisory
//! lock, so only one service instance sweeps at a time. Due tournaments are
//! walked one legal step at a time toward the status their dates call for,
//! all on the shared transaction. The batch commits once; notifications are
//! published afterwards.

use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::watch, time::MissedTickBehavior};

use crate::{
    db::{StoreTx, TournamentStore},
    tournament::{
        lifecycle::{LifecycleError, StatusChange, TournamentLifecycle},
        models::TournamentId,
    },
};

/// Advisory lock key shared by every instance running the scheduler
pub const STATUS_SCHEDULER_LOCK_ID: i64 = 0x746f_7572_6e65_7901;

/// Default sweep interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub lock_id: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            lock_id: STATUS_SCHEDULER_LOCK_ID,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Tournament {tournament_id}: {source}")]
    Lifecycle {
        tournament_id: TournamentId,
        #[source]
        source: LifecycleError,
    },
}

impl SchedulerError {
    /// Tournament whose transition aborted the batch
    pub fn blocking_tournament(&self) -> Option<TournamentId> {
        match self {
            Self::Lifecycle { tournament_id, .. } => Some(*tournament_id),
            Self::Database(_) => None,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Result of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another instance holds the lock; nothing was written
    Skipped,
    /// Lock held; every applied step, in order
    Completed(Vec<StatusChange>),
}

impl TickOutcome {
    pub fn changes(&self) -> &[StatusChange] {
        match self {
            Self::Skipped => &[],
            Self::Completed(changes) => changes,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Completed(_) => "completed",
        }
    }
}

/// Periodic status sweep
pub struct StatusScheduler<S: TournamentStore> {
    lifecycle: TournamentLifecycle<S>,
    config: SchedulerConfig,
}

impl<S: TournamentStore> StatusScheduler<S> {
    pub fn new(lifecycle: TournamentLifecycle<S>, config: SchedulerConfig) -> Self {
        Self { lifecycle, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// One sweep as of `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> SchedulerResult<TickOutcome> {
        let store: &Arc<S> = self.lifecycle.store();
        let mut tx = store.begin().await?;

        if !tx.try_advisory_lock(self.config.lock_id).await? {
            tx.commit().await?;
            log::debug!("Scheduler lock held elsewhere, skipping tick");
            return Ok(TickOutcome::Skipped);
        }

        let changes = match self.sweep(&mut tx, now).await {
            Ok(changes) => changes,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::warn!("Scheduler rollback failed: {rollback_err}");
                }
                return Err(e);
            }
        };

        tx.commit().await?;

        for change in &changes {
            self.lifecycle.publish(change);
        }

        Ok(TickOutcome::Completed(changes))
    }

    async fn sweep(&self, tx: &mut S::Tx, now: DateTime<Utc>) -> SchedulerResult<Vec<StatusChange>> {
        let due = tx.list_due_tournaments(now).await?;
        let mut changes = Vec::new();

        for tournament in due {
            let expected = tournament.schedule.expected_status(now);
            let mut current = tournament.status;

            while let Some(step) = current.next_toward(expected) {
                let change = match self.lifecycle.update_status_in(tx, tournament.id, step).await
                {
                    Ok(change) => change,
                    Err(source) => {
                        log::error!(
                            "Tournament {} '{}' blocks the status sweep at {current} -> {step}: {}. \
                             Every later tick fails until it is fixed or canceled",
                            tournament.id,
                            tournament.name,
                            source
                        );
                        return Err(SchedulerError::Lifecycle {
                            tournament_id: tournament.id,
                            source,
                        });
                    }
                };
                current = change.to;
                changes.push(change);
            }
        }

        Ok(changes)
    }

    /// Tick every `interval` until `shutdown` flips to `true` or its sender
    /// is dropped. Tick errors are logged; the next tick retries.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "Status scheduler started (interval {:?}, lock {})",
            self.config.interval,
            self.config.lock_id
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let result = self.tick(Utc::now()).await;
                    let label = match &result {
                        Ok(outcome) => outcome.label(),
                        Err(_) => "failed",
                    };
                    metrics::counter!("scheduler_ticks_total", "outcome" => label).increment(1);

                    match result {
                        Ok(TickOutcome::Completed(changes)) if !changes.is_empty() => {
                            log::info!("Scheduler applied {} status changes", changes.len());
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if let Some(id) = e.blocking_tournament() {
                                metrics::counter!("scheduler_blocked_ticks_total",
                                    "tournament_id" => id.to_string()
                                )
                                .increment(1);
                            }
                            log::error!("Scheduler tick failed: {e}");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Status scheduler stopped");
    }
}
