//! End-to-end tournament flows against the in-memory store.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tourney::{
    db::{
        MemoryStore, StoreTx, TournamentStore,
        fixtures::{Seed, schedule},
    },
    notify::{MessageType, RecordingSink},
    scheduler::{STATUS_SCHEDULER_LOCK_ID, SchedulerConfig, StatusScheduler, TickOutcome},
    tournament::{
        MatchResults, TournamentLifecycle, TournamentStatus, TournamentViews,
        models::{BracketType, MatchStatus},
    },
};

struct Harness {
    store: MemoryStore,
    sink: Arc<RecordingSink>,
    lifecycle: TournamentLifecycle<MemoryStore>,
    results: MatchResults<MemoryStore>,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryStore::new();
        let shared = Arc::new(store.clone());
        let sink = Arc::new(RecordingSink::default());
        Self {
            lifecycle: TournamentLifecycle::new(Arc::clone(&shared), sink.clone()),
            results: MatchResults::new(shared, sink.clone()),
            store,
            sink,
        }
    }

    fn scheduler(&self) -> StatusScheduler<MemoryStore> {
        StatusScheduler::new(self.lifecycle.clone(), SchedulerConfig::default())
    }
}

#[tokio::test]
async fn test_elimination_tournament_from_registration_to_champion() {
    let h = Harness::new();
    let now = Utc::now();
    Seed::new(1, BracketType::SingleElimination, schedule(now, -2, -1, 1))
        .entrants([11, 12, 13, 14, 15])
        .insert(&h.store);

    let outcome = h.scheduler().tick(now).await.unwrap();
    assert_eq!(outcome.changes().len(), 1);
    assert_eq!(h.store.matches(1).len(), 4);

    // Play round by round until the final has been decided; higher seed id wins.
    for round in 1..=3 {
        let playable: Vec<_> = h
            .store
            .matches(1)
            .into_iter()
            .filter(|m| m.round == round && m.status == MatchStatus::Scheduled)
            .collect();
        assert!(!playable.is_empty());

        for m in playable {
            let (a, b) = (m.slot1.unwrap(), m.slot2.unwrap());
            let (s1, s2) = if a > b { (2, 1) } else { (1, 2) };
            h.results.record_result(1, m.id, s1, s2).await.unwrap();
        }
    }

    let matches = h.store.matches(1);
    assert!(matches.iter().all(|m| m.status == MatchStatus::Completed));
    let final_match = matches.iter().find(|m| m.next_match_id.is_none()).unwrap();
    assert_eq!(final_match.winner_id, Some(15));

    // After the end date the scheduler closes the tournament.
    let later = now + Duration::days(2);
    let outcome = h.scheduler().tick(later).await.unwrap();
    assert_eq!(outcome.changes()[0].to, TournamentStatus::Completed);
    assert_eq!(
        h.store.tournament(1).unwrap().status,
        TournamentStatus::Completed
    );
    assert_eq!(h.store.matches(1).len(), 4);
    assert_eq!(h.sink.types().last(), Some(&MessageType::TournamentCompleted));
}

#[tokio::test]
async fn test_double_round_robin_table() {
    let h = Harness::new();
    let now = Utc::now();
    Seed::new(2, BracketType::RoundRobin, schedule(now, -2, -1, 1))
        .teams()
        .settings(json!({ "numberOfRounds": 2 }))
        .entrants([100, 200, 300, 400])
        .insert(&h.store);

    let change = h
        .lifecycle
        .update_status(2, TournamentStatus::Active)
        .await
        .unwrap();
    let summary = change.bracket.unwrap();
    assert_eq!(summary.matches, 12);
    assert_eq!(summary.standings, 4);

    for m in h.store.matches(2) {
        let home_wins = m.slot1 == Some(100);
        let (s1, s2) = if home_wins { (1, 0) } else { (1, 1) };
        h.results.record_result(2, m.id, s1, s2).await.unwrap();
    }

    let standings = h.store.standings(2);
    assert_eq!(standings[0].team_id, Some(100));
    assert_eq!(standings[0].rank, 1);
    assert!(standings.iter().all(|s| s.played == 6));

    let view = TournamentViews::new(Arc::new(h.store.clone()))
        .get_tournament_view(2)
        .await
        .unwrap();
    assert_eq!(view.matches.len(), 12);
    assert_eq!(view.standings.len(), 4);
    assert_eq!(view.participants.len(), 4);
}

#[tokio::test]
async fn test_cancellation_is_terminal() {
    let h = Harness::new();
    let now = Utc::now();
    Seed::new(3, BracketType::RoundRobin, schedule(now, 1, 2, 3))
        .status(TournamentStatus::Soon)
        .insert(&h.store);

    h.lifecycle
        .update_status(3, TournamentStatus::Canceled)
        .await
        .unwrap();

    assert!(
        h.lifecycle
            .update_status(3, TournamentStatus::Registration)
            .await
            .is_err()
    );

    // Canceled tournaments are never picked up, whatever the date.
    let outcome = h.scheduler().tick(now + Duration::days(10)).await.unwrap();
    assert_eq!(outcome, TickOutcome::Completed(Vec::new()));
}

#[tokio::test]
async fn test_concurrent_schedulers_share_one_lock() {
    let h = Harness::new();
    let now = Utc::now();
    Seed::new(4, BracketType::SingleElimination, schedule(now, -2, -1, 1))
        .entrants(1..=8)
        .insert(&h.store);

    let mut holder = h.store.begin().await.unwrap();
    assert!(holder.try_advisory_lock(STATUS_SCHEDULER_LOCK_ID).await.unwrap());

    assert_eq!(h.scheduler().tick(now).await.unwrap(), TickOutcome::Skipped);
    holder.rollback().await.unwrap();

    let outcome = h.scheduler().tick(now).await.unwrap();
    assert_eq!(outcome.changes().len(), 1);
    assert_eq!(h.store.matches(4).len(), 7);
}
