//! Tournament status transitions.
//!
//! Entering `active` generates the bracket on the same transaction as the
//! status write, at most once per tournament. Notifications go out only after
//! the outermost transaction commits: [`TournamentLifecycle::update_status`]
//! publishes them itself, callers of
//! [`TournamentLifecycle::update_status_in`] publish the returned
//! [`StatusChange`] after their own commit.

use std::sync::Arc;
use thiserror::Error;

use super::models::{
    FormatId, MIN_PARTICIPANTS, Tournament, TournamentId, TournamentStatus, TransitionError,
};
use crate::{
    db::{StoreTx, TournamentStore},
    notify::{NotificationSink, RoomMessage},
    orchestrator::{BracketError, BracketOrchestrator, BracketSummary},
};

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Tournament {0} not found")]
    NotFound(TournamentId),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Format {0} not found")]
    FormatNotFound(FormatId),

    #[error("Insufficient participants: need {needed}, have {current}")]
    InsufficientParticipants { needed: usize, current: usize },

    #[error("Bracket generation failed: {0}")]
    Bracket(#[from] BracketError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LifecycleError {
    /// Client-safe message naming the failed stage; storage details are
    /// never exposed.
    pub fn client_message(&self) -> String {
        match self {
            LifecycleError::Database(_) => "Internal server error".to_string(),
            LifecycleError::Bracket(BracketError::Persistence { stage, .. }) => {
                format!("Bracket persistence failed at {stage}")
            }
            LifecycleError::Bracket(BracketError::Unlinked { .. }) => {
                "Bracket persistence failed at link_matches".to_string()
            }
            LifecycleError::NotFound(_) => "Tournament not found".to_string(),
            LifecycleError::FormatNotFound(_) => "Tournament format not found".to_string(),
            _ => self.to_string(),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Outcome of one status update, to be published after commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub tournament_id: TournamentId,
    pub from: TournamentStatus,
    pub to: TournamentStatus,
    /// Set when this change generated the bracket
    pub bracket: Option<BracketSummary>,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Messages for the tournament room; empty for a no-op.
    pub fn notifications(&self) -> Vec<RoomMessage> {
        if !self.changed() {
            return Vec::new();
        }

        let mut messages = vec![RoomMessage::status_updated(
            self.tournament_id,
            self.from,
            self.to,
        )];
        if let Some(summary) = &self.bracket {
            messages.push(RoomMessage::bracket_updated(
                self.tournament_id,
                summary.matches,
            ));
        }
        if self.to == TournamentStatus::Completed {
            messages.push(RoomMessage::completed(self.tournament_id));
        }
        messages
    }
}

/// Drives tournament status through its state machine
pub struct TournamentLifecycle<S: TournamentStore> {
    store: Arc<S>,
    orchestrator: BracketOrchestrator,
    notifier: Arc<dyn NotificationSink>,
}

impl<S: TournamentStore> Clone for TournamentLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            orchestrator: self.orchestrator,
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S: TournamentStore> TournamentLifecycle<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            store,
            orchestrator: BracketOrchestrator::new(),
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }

    /// Move a tournament to `target` on a transaction of its own.
    ///
    /// Commits on success and then publishes notifications; rolls back on
    /// any error.
    pub async fn update_status(
        &self,
        id: TournamentId,
        target: TournamentStatus,
    ) -> LifecycleResult<StatusChange> {
        let mut tx = self.store.begin().await?;

        let change = match self.update_status_in(&mut tx, id, target).await {
            Ok(change) => change,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::warn!("Tournament {id}: rollback failed: {rollback_err}");
                }
                return Err(e);
            }
        };

        tx.commit().await?;
        self.publish(&change);

        Ok(change)
    }

    /// Move a tournament to `target` on the caller's transaction.
    ///
    /// Never commits, rolls back or notifies. A self transition returns an
    /// unchanged [`StatusChange`] without writing.
    pub async fn update_status_in(
        &self,
        tx: &mut S::Tx,
        id: TournamentId,
        target: TournamentStatus,
    ) -> LifecycleResult<StatusChange> {
        let tournament = tx
            .lock_tournament(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))?;
        let from = tournament.status;

        from.validate_transition(target)?;

        if from == target {
            return Ok(StatusChange {
                tournament_id: id,
                from,
                to: target,
                bracket: None,
            });
        }

        let bracket = if target == TournamentStatus::Active {
            self.activate(tx, &tournament).await?
        } else {
            None
        };

        tx.set_status(id, target).await?;

        metrics::counter!("tournament_status_transitions_total",
            "from" => from.as_str(),
            "to" => target.as_str()
        )
        .increment(1);
        log::info!("Tournament {id} '{}': {from} -> {target}", tournament.name);

        Ok(StatusChange {
            tournament_id: id,
            from,
            to: target,
            bracket,
        })
    }

    /// Send the change's notifications. Call only after the commit that made
    /// it durable.
    pub fn publish(&self, change: &StatusChange) {
        for message in change.notifications() {
            self.notifier.broadcast_to_room(message);
        }
    }

    /// Bracket generation on entering `active`; `None` if matches already exist.
    async fn activate(
        &self,
        tx: &mut S::Tx,
        tournament: &Tournament,
    ) -> LifecycleResult<Option<BracketSummary>> {
        let format = tx
            .get_format(tournament.format_id)
            .await?
            .ok_or(LifecycleError::FormatNotFound(tournament.format_id))?;
        let kind = format.participant_type;

        let entrants = self
            .orchestrator
            .load_entrants(tx, tournament.id, kind)
            .await?;
        if entrants.len() < MIN_PARTICIPANTS {
            return Err(LifecycleError::InsufficientParticipants {
                needed: MIN_PARTICIPANTS,
                current: entrants.len(),
            });
        }

        if tx.count_matches(tournament.id, kind).await? > 0 {
            log::info!(
                "Tournament {}: matches already generated, skipping",
                tournament.id
            );
            return Ok(None);
        }

        let summary = self
            .orchestrator
            .generate(tx, tournament.id, &format, &entrants)
            .await?;

        metrics::counter!("brackets_generated_total",
            "bracket_type" => summary.bracket_type.as_str()
        )
        .increment(1);

        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bracket::GenerationError,
        db::{
            MemoryStore,
            fixtures::{Seed, schedule},
        },
        notify::{MessageType, RecordingSink},
        tournament::models::BracketType,
    };
    use chrono::Utc;

    fn lifecycle(store: &MemoryStore) -> (TournamentLifecycle<MemoryStore>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let lifecycle = TournamentLifecycle::new(Arc::new(store.clone()), sink.clone());
        (lifecycle, sink)
    }

    fn seed(id: TournamentId, bracket_type: BracketType) -> Seed {
        Seed::new(id, bracket_type, schedule(Utc::now(), -2, -1, 1))
    }

    #[tokio::test]
    async fn test_activation_generates_bracket_and_notifies() {
        let store = MemoryStore::new();
        seed(1, BracketType::SingleElimination)
            .entrants(1..=5)
            .insert(&store);
        let (lifecycle, sink) = lifecycle(&store);

        let change = lifecycle
            .update_status(1, TournamentStatus::Active)
            .await
            .unwrap();

        assert!(change.changed());
        assert_eq!(change.bracket.as_ref().map(|b| b.matches), Some(4));
        assert_eq!(store.tournament(1).unwrap().status, TournamentStatus::Active);
        assert_eq!(store.matches(1).len(), 4);
        assert_eq!(
            sink.types(),
            vec![MessageType::TournamentStatusUpdated, MessageType::BracketUpdated]
        );
    }

    #[tokio::test]
    async fn test_skipping_a_state_is_rejected_without_writes() {
        let store = MemoryStore::new();
        seed(1, BracketType::RoundRobin)
            .status(TournamentStatus::Soon)
            .entrants(1..=4)
            .insert(&store);
        let (lifecycle, sink) = lifecycle(&store);

        let err = lifecycle
            .update_status(1, TournamentStatus::Active)
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::InvalidTransition(_)));
        assert_eq!(store.write_count(), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_states_allow_only_self_transition() {
        let store = MemoryStore::new();
        seed(1, BracketType::RoundRobin)
            .status(TournamentStatus::Completed)
            .insert(&store);
        let (lifecycle, sink) = lifecycle(&store);

        let same = lifecycle
            .update_status(1, TournamentStatus::Completed)
            .await
            .unwrap();
        assert!(!same.changed());

        for target in [
            TournamentStatus::Active,
            TournamentStatus::Canceled,
            TournamentStatus::Registration,
        ] {
            assert!(lifecycle.update_status(1, target).await.is_err());
        }
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_participants_keeps_prior_status() {
        let store = MemoryStore::new();
        seed(1, BracketType::SingleElimination)
            .entrants([7])
            .insert(&store);
        let (lifecycle, _) = lifecycle(&store);

        let err = lifecycle
            .update_status(1, TournamentStatus::Active)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::InsufficientParticipants {
                needed: 2,
                current: 1
            }
        ));
        assert_eq!(
            store.tournament(1).unwrap().status,
            TournamentStatus::Registration
        );
    }

    #[tokio::test]
    async fn test_missing_format_and_tournament() {
        let store = MemoryStore::new();
        let (lifecycle, _) = lifecycle(&store);
        assert!(matches!(
            lifecycle.update_status(9, TournamentStatus::Active).await,
            Err(LifecycleError::NotFound(9))
        ));

        let mut tournament = seed(2, BracketType::RoundRobin).entrants(1..=3).insert(&store);
        tournament.format_id = 99;
        store.insert_tournament(tournament);
        assert!(matches!(
            lifecycle.update_status(2, TournamentStatus::Active).await,
            Err(LifecycleError::FormatNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_format_rolls_back() {
        let store = MemoryStore::new();
        seed(1, BracketType::RoundRobin)
            .bracket_type("DoubleElimination")
            .entrants(1..=4)
            .insert(&store);
        let (lifecycle, _) = lifecycle(&store);

        let err = lifecycle
            .update_status(1, TournamentStatus::Active)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::Bracket(BracketError::Generation(
                GenerationError::UnsupportedFormat(_)
            ))
        ));
        assert_eq!(err.client_message(), err.to_string());
        assert_eq!(
            store.tournament(1).unwrap().status,
            TournamentStatus::Registration
        );
    }

    #[tokio::test]
    async fn test_mid_bracket_failure_leaves_no_partial_rows() {
        let store = MemoryStore::new();
        seed(1, BracketType::SingleElimination)
            .entrants(1..=8)
            .insert(&store);
        store.fail_on("link_match", 2);
        let (lifecycle, sink) = lifecycle(&store);

        let err = lifecycle
            .update_status(1, TournamentStatus::Active)
            .await
            .unwrap_err();

        assert_eq!(
            err.client_message(),
            "Bracket persistence failed at link_matches"
        );
        assert!(!err.client_message().contains("injected"));
        assert!(store.matches(1).is_empty());
        assert_eq!(
            store.tournament(1).unwrap().status,
            TournamentStatus::Registration
        );
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_existing_matches_are_not_regenerated() {
        let store = MemoryStore::new();
        seed(1, BracketType::RoundRobin)
            .entrants(1..=4)
            .insert(&store);
        let (lifecycle, sink) = lifecycle(&store);

        lifecycle
            .update_status(1, TournamentStatus::Active)
            .await
            .unwrap();
        assert_eq!(store.matches(1).len(), 6);

        // Put it back in registration without touching the bracket.
        let mut tournament = store.tournament(1).unwrap();
        tournament.status = TournamentStatus::Registration;
        store.insert_tournament(tournament);

        let change = lifecycle
            .update_status(1, TournamentStatus::Active)
            .await
            .unwrap();

        assert!(change.bracket.is_none());
        assert_eq!(store.matches(1).len(), 6);
        assert_eq!(store.standings(1).len(), 4);
        assert_eq!(
            sink.types().last(),
            Some(&MessageType::TournamentStatusUpdated)
        );
    }

    #[tokio::test]
    async fn test_update_status_in_defers_commit_and_notifications() {
        let store = MemoryStore::new();
        seed(1, BracketType::SingleElimination)
            .entrants(1..=4)
            .insert(&store);
        let (lifecycle, sink) = lifecycle(&store);

        let mut tx = store.begin().await.unwrap();
        let change = lifecycle
            .update_status_in(&mut tx, 1, TournamentStatus::Active)
            .await
            .unwrap();

        assert!(sink.is_empty());
        assert_eq!(
            store.tournament(1).unwrap().status,
            TournamentStatus::Registration
        );

        tx.commit().await.unwrap();
        lifecycle.publish(&change);

        assert_eq!(store.tournament(1).unwrap().status, TournamentStatus::Active);
        assert_eq!(sink.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_completion_notifies_completed() {
        let store = MemoryStore::new();
        seed(1, BracketType::SingleElimination)
            .status(TournamentStatus::Active)
            .insert(&store);
        let (lifecycle, sink) = lifecycle(&store);

        lifecycle
            .update_status(1, TournamentStatus::Completed)
            .await
            .unwrap();

        assert_eq!(
            sink.types(),
            vec![
                MessageType::TournamentStatusUpdated,
                MessageType::TournamentCompleted
            ]
        );
        assert!(sink.messages().iter().all(|m| m.room_id == "tournament_1"));
    }
}
