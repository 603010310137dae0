//! Match result recording.
//!
//! Elimination results push the winner into the linked next match. Round-robin
//! results update both standings and re-rank the table. Each call runs on its
//! own transaction and notifies the tournament room after commit.

use serde::Serialize;
use std::{cmp::Ordering, sync::Arc};
use thiserror::Error;

use super::models::{
    BracketType, EntrantId, FormatId, MatchId, StandingDelta, TournamentId, TournamentStatus,
};
use crate::{
    db::{StoreTx, TournamentStore},
    notify::{NotificationSink, RoomMessage},
};

#[derive(Debug, Error)]
pub enum ResultError {
    #[error("Tournament {0} not found")]
    TournamentNotFound(TournamentId),

    #[error("Tournament {id} is {status}, results need an active tournament")]
    TournamentNotActive {
        id: TournamentId,
        status: TournamentStatus,
    },

    #[error("Format {0} not found")]
    FormatNotFound(FormatId),

    #[error("Unsupported bracket type: {0}")]
    UnsupportedFormat(String),

    #[error("Match {0} not found")]
    MatchNotFound(MatchId),

    #[error("Match {0} is already closed")]
    MatchClosed(MatchId),

    #[error("Match {0} is waiting for an entrant")]
    MatchNotReady(MatchId),

    #[error("Scores must not be negative")]
    InvalidScore,

    #[error("Draws are not allowed in elimination brackets")]
    DrawNotAllowed,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ResultError {
    pub fn client_message(&self) -> String {
        match self {
            ResultError::Database(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

pub type ResultResult<T> = Result<T, ResultError>;

/// What a recorded result changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub tournament_id: TournamentId,
    pub match_id: MatchId,
    pub score1: i32,
    pub score2: i32,
    /// `None` for a round-robin draw
    pub winner_id: Option<EntrantId>,
    /// Next match and slot the winner was written into
    pub advanced_to: Option<(MatchId, i16)>,
    pub standings_updated: bool,
}

pub struct MatchResults<S: TournamentStore> {
    store: Arc<S>,
    notifier: Arc<dyn NotificationSink>,
}

impl<S: TournamentStore> Clone for MatchResults<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S: TournamentStore> MatchResults<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub async fn record_result(
        &self,
        tournament_id: TournamentId,
        match_id: MatchId,
        score1: i32,
        score2: i32,
    ) -> ResultResult<MatchOutcome> {
        if score1 < 0 || score2 < 0 {
            return Err(ResultError::InvalidScore);
        }

        let mut tx = self.store.begin().await?;
        let outcome = match self
            .record_in(&mut tx, tournament_id, match_id, (score1, score2))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::warn!("Match {match_id}: rollback failed: {rollback_err}");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        self.notifier.broadcast_to_room(RoomMessage::match_result(
            tournament_id,
            match_id,
            outcome.winner_id,
        ));
        metrics::counter!("match_results_recorded_total").increment(1);

        Ok(outcome)
    }

    async fn record_in(
        &self,
        tx: &mut S::Tx,
        tournament_id: TournamentId,
        match_id: MatchId,
        (score1, score2): (i32, i32),
    ) -> ResultResult<MatchOutcome> {
        let tournament = tx
            .lock_tournament(tournament_id)
            .await?
            .ok_or(ResultError::TournamentNotFound(tournament_id))?;
        if tournament.status != TournamentStatus::Active {
            return Err(ResultError::TournamentNotActive {
                id: tournament_id,
                status: tournament.status,
            });
        }

        let format = tx
            .get_format(tournament.format_id)
            .await?
            .ok_or(ResultError::FormatNotFound(tournament.format_id))?;
        let bracket_type = format
            .bracket_kind()
            .map_err(|_| ResultError::UnsupportedFormat(format.bracket_type.clone()))?;
        let kind = format.participant_type;

        let row = tx
            .lock_match(kind, match_id)
            .await?
            .filter(|m| m.tournament_id == tournament_id)
            .ok_or(ResultError::MatchNotFound(match_id))?;
        if row.status.is_closed() {
            return Err(ResultError::MatchClosed(match_id));
        }
        let (Some(home), Some(away)) = (row.slot1, row.slot2) else {
            return Err(ResultError::MatchNotReady(match_id));
        };

        let winner_id = match score1.cmp(&score2) {
            Ordering::Greater => Some(home),
            Ordering::Less => Some(away),
            Ordering::Equal => None,
        };
        if winner_id.is_none() && bracket_type == BracketType::SingleElimination {
            return Err(ResultError::DrawNotAllowed);
        }

        tx.complete_match(kind, match_id, (score1, score2), winner_id)
            .await?;

        let mut outcome = MatchOutcome {
            tournament_id,
            match_id,
            score1,
            score2,
            winner_id,
            advanced_to: None,
            standings_updated: false,
        };

        match bracket_type {
            BracketType::SingleElimination => {
                if let (Some(next), Some(slot), Some(winner)) =
                    (row.next_match_id, row.winner_to_slot, winner_id)
                {
                    tx.fill_slot(kind, next, slot, winner).await?;
                    outcome.advanced_to = Some((next, slot));
                }
            }
            BracketType::RoundRobin => {
                tx.apply_standing(
                    tournament_id,
                    kind,
                    home,
                    &StandingDelta::for_result(score1, score2),
                )
                .await?;
                tx.apply_standing(
                    tournament_id,
                    kind,
                    away,
                    &StandingDelta::for_result(score2, score1),
                )
                .await?;
                tx.rerank_standings(tournament_id).await?;
                outcome.standings_updated = true;
            }
        }

        log::info!(
            "Tournament {tournament_id}: match {match_id} finished {score1}-{score2}"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{
            MemoryStore,
            fixtures::{Seed, schedule},
        },
        notify::{MessageType, RecordingSink},
        tournament::lifecycle::TournamentLifecycle,
    };
    use chrono::Utc;

    async fn active(store: &MemoryStore, seed: Seed) -> (MatchResults<MemoryStore>, Arc<RecordingSink>) {
        let id = seed.id;
        seed.insert(store);

        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(store.clone());
        TournamentLifecycle::new(Arc::clone(&store), sink.clone())
            .update_status(id, TournamentStatus::Active)
            .await
            .unwrap();

        (MatchResults::new(store, sink.clone()), sink)
    }

    fn seed(id: TournamentId, bracket_type: BracketType) -> Seed {
        Seed::new(id, bracket_type, schedule(Utc::now(), -2, -1, 1))
    }

    fn find(store: &MemoryStore, tournament_id: TournamentId, uid: &str) -> MatchId {
        store
            .matches(tournament_id)
            .into_iter()
            .find(|m| m.bracket_match_id == uid)
            .map(|m| m.id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_elimination_winner_advances() {
        let store = MemoryStore::new();
        let (results, sink) = active(
            &store,
            seed(1, BracketType::SingleElimination).entrants(1..=4),
        )
        .await;

        let r1m2 = find(&store, 1, "R1M2");
        let outcome = results.record_result(1, r1m2, 1, 3).await.unwrap();

        let final_id = find(&store, 1, "R2M1");
        assert_eq!(outcome.advanced_to, Some((final_id, 2)));

        // Seeds fold to 1 v 4 and 2 v 3; R1M2 is 2 v 3.
        assert_eq!(outcome.winner_id, Some(3));
        let final_match = store
            .matches(1)
            .into_iter()
            .find(|m| m.id == final_id)
            .unwrap();
        assert_eq!(final_match.slot2, Some(3));
        assert_eq!(final_match.slot1, None);
        assert_eq!(sink.types().last(), Some(&MessageType::BracketUpdated));
    }

    #[tokio::test]
    async fn test_elimination_rejects_draw_and_unready_match() {
        let store = MemoryStore::new();
        let (results, _) = active(
            &store,
            seed(1, BracketType::SingleElimination).entrants(1..=4),
        )
        .await;

        let r1m1 = find(&store, 1, "R1M1");
        assert!(matches!(
            results.record_result(1, r1m1, 2, 2).await,
            Err(ResultError::DrawNotAllowed)
        ));

        let final_id = find(&store, 1, "R2M1");
        assert!(matches!(
            results.record_result(1, final_id, 1, 0).await,
            Err(ResultError::MatchNotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_match_cannot_be_recorded_twice() {
        let store = MemoryStore::new();
        let (results, _) = active(
            &store,
            seed(1, BracketType::SingleElimination).entrants(1..=2),
        )
        .await;

        let only = find(&store, 1, "R1M1");
        results.record_result(1, only, 5, 0).await.unwrap();
        assert!(matches!(
            results.record_result(1, only, 0, 5).await,
            Err(ResultError::MatchClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_round_robin_standings() {
        let store = MemoryStore::new();
        let (results, _) = active(&store, seed(1, BracketType::RoundRobin).entrants([10, 20, 30])).await;

        // R1M1: 10 v 20, R1M2: 10 v 30, R1M3: 20 v 30
        results
            .record_result(1, find(&store, 1, "R1M1"), 2, 2)
            .await
            .unwrap();
        results
            .record_result(1, find(&store, 1, "R1M3"), 3, 0)
            .await
            .unwrap();

        let standings = store.standings(1);
        let by_user: Vec<_> = standings
            .iter()
            .map(|s| (s.user_id, s.points, s.rank))
            .collect();
        assert_eq!(
            by_user,
            vec![(Some(20), 4, 1), (Some(10), 1, 2), (Some(30), 0, 3)]
        );

        let twenty = &standings[0];
        assert_eq!(
            (twenty.played, twenty.wins, twenty.draws, twenty.losses),
            (2, 1, 1, 0)
        );
        assert_eq!((twenty.score_for, twenty.score_against), (5, 2));
    }

    #[tokio::test]
    async fn test_inactive_tournament_and_bad_scores() {
        let store = MemoryStore::new();
        seed(1, BracketType::RoundRobin).entrants(1..=2).insert(&store);
        let results = MatchResults::new(
            Arc::new(store.clone()),
            Arc::new(RecordingSink::default()),
        );

        assert!(matches!(
            results.record_result(1, 1, 1, 0).await,
            Err(ResultError::TournamentNotActive { .. })
        ));
        assert!(matches!(
            results.record_result(1, 1, -1, 0).await,
            Err(ResultError::InvalidScore)
        ));
        assert!(matches!(
            results.record_result(7, 1, 1, 0).await,
            Err(ResultError::TournamentNotFound(7))
        ));
    }

    #[tokio::test]
    async fn test_match_of_other_tournament_is_not_found() {
        let store = MemoryStore::new();
        let (results, _) = active(&store, seed(1, BracketType::RoundRobin).entrants(1..=2)).await;
        seed(2, BracketType::RoundRobin)
            .status(TournamentStatus::Active)
            .insert(&store);

        let foreign = find(&store, 1, "R1M1");
        assert!(matches!(
            results.record_result(2, foreign, 1, 0).await,
            Err(ResultError::MatchNotFound(_))
        ));
    }
}
