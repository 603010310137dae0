//! In-memory store for tests.
//!
//! A [`MemoryTx`] works on a snapshot of the committed tables taken at
//! `begin`; `commit` replaces the committed tables with the snapshot, dropping
//! or rolling back discards it. Advisory locks are shared across transactions
//! of the same store and released when the holding transaction ends. Row locks
//! are not modelled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::repository::{StoreTx, TournamentStore};
use crate::tournament::models::{
    EntrantId, Format, FormatId, MatchId, MatchStatus, NewMatch, Participant, ParticipantStatus,
    ParticipantType, PersistedMatch, Standing, StandingDelta, Tournament, TournamentId,
    TournamentStatus,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
struct Tables {
    tournaments: BTreeMap<TournamentId, Tournament>,
    formats: HashMap<FormatId, Format>,
    participants: Vec<Participant>,
    matches: BTreeMap<MatchId, PersistedMatch>,
    standings: Vec<Standing>,
    last_match_id: MatchId,
    last_row_id: i64,
}

impl Tables {
    fn next_match_id(&mut self) -> MatchId {
        self.last_match_id += 1;
        self.last_match_id
    }

    fn next_row_id(&mut self) -> i64 {
        self.last_row_id += 1;
        self.last_row_id
    }

    fn matches_of(&self, tournament_id: TournamentId) -> Vec<PersistedMatch> {
        let mut matches: Vec<_> = self
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect();
        matches.sort_by_key(|m| (m.round, m.match_order, m.id));
        matches
    }

    fn standings_of(&self, tournament_id: TournamentId) -> Vec<Standing> {
        let mut standings: Vec<_> = self
            .standings
            .iter()
            .filter(|s| s.tournament_id == tournament_id)
            .cloned()
            .collect();
        standings.sort_by_key(|s| (s.rank, s.id));
        standings
    }
}

#[derive(Default)]
struct Shared {
    committed: Mutex<Tables>,
    advisory_locks: Mutex<HashSet<i64>>,
    /// Operation name -> successful calls left before the next one fails
    failures: Mutex<HashMap<&'static str, usize>>,
    writes: Mutex<usize>,
    commits: Mutex<usize>,
}

impl Shared {
    fn check(&self, op: &'static str) -> sqlx::Result<()> {
        let mut failures = lock(&self.failures);
        match failures.get_mut(op) {
            Some(0) => {
                failures.remove(op);
                Err(sqlx::Error::Protocol(format!("injected failure in {op}")))
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// In-memory [`TournamentStore`]. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tournament(&self, tournament: Tournament) {
        lock(&self.shared.committed)
            .tournaments
            .insert(tournament.id, tournament);
    }

    pub fn insert_format(&self, format: Format) {
        lock(&self.shared.committed)
            .formats
            .insert(format.id, format);
    }

    /// Register a participant; returns its row id.
    pub fn add_participant(
        &self,
        tournament_id: TournamentId,
        user_id: Option<i64>,
        team_id: Option<i64>,
        status: ParticipantStatus,
    ) -> i64 {
        let mut tables = lock(&self.shared.committed);
        let id = tables.next_row_id();
        tables.participants.push(Participant {
            id,
            tournament_id,
            user_id,
            team_id,
            status,
        });
        id
    }

    /// Committed tournament row
    pub fn tournament(&self, id: TournamentId) -> Option<Tournament> {
        lock(&self.shared.committed).tournaments.get(&id).cloned()
    }

    /// Committed matches ordered by round and order
    pub fn matches(&self, tournament_id: TournamentId) -> Vec<PersistedMatch> {
        lock(&self.shared.committed).matches_of(tournament_id)
    }

    /// Committed standings ordered by rank
    pub fn standings(&self, tournament_id: TournamentId) -> Vec<Standing> {
        lock(&self.shared.committed).standings_of(tournament_id)
    }

    /// Writes made by committed transactions
    pub fn write_count(&self) -> usize {
        *lock(&self.shared.writes)
    }

    pub fn commit_count(&self) -> usize {
        *lock(&self.shared.commits)
    }

    /// Make the call to `op` following `after` successful calls fail once.
    ///
    /// `op` is the trait method name, e.g. `"insert_match"`.
    pub fn fail_on(&self, op: &'static str, after: usize) {
        lock(&self.shared.failures).insert(op, after);
    }

    pub fn is_advisory_locked(&self, lock_id: i64) -> bool {
        lock(&self.shared.advisory_locks).contains(&lock_id)
    }
}

#[async_trait]
impl TournamentStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> sqlx::Result<MemoryTx> {
        self.shared.check("begin")?;
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            tables: lock(&self.shared.committed).clone(),
            held_locks: Vec::new(),
            writes: 0,
        })
    }

    async fn ping(&self) -> sqlx::Result<()> {
        self.shared.check("ping")
    }

    async fn get_tournament(&self, id: TournamentId) -> sqlx::Result<Option<Tournament>> {
        self.shared.check("get_tournament")?;
        Ok(self.tournament(id))
    }

    async fn get_format(&self, id: FormatId) -> sqlx::Result<Option<Format>> {
        self.shared.check("get_format")?;
        Ok(lock(&self.shared.committed).formats.get(&id).cloned())
    }

    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> sqlx::Result<Vec<Participant>> {
        self.shared.check("list_participants")?;
        Ok(lock(&self.shared.committed)
            .participants
            .iter()
            .filter(|p| p.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn list_matches(&self, tournament_id: TournamentId) -> sqlx::Result<Vec<PersistedMatch>> {
        self.shared.check("list_matches")?;
        Ok(self.matches(tournament_id))
    }

    async fn list_standings(&self, tournament_id: TournamentId) -> sqlx::Result<Vec<Standing>> {
        self.shared.check("list_standings")?;
        Ok(self.standings(tournament_id))
    }
}

/// Snapshot transaction on a [`MemoryStore`]
pub struct MemoryTx {
    shared: Arc<Shared>,
    tables: Tables,
    held_locks: Vec<i64>,
    writes: usize,
}

impl MemoryTx {
    fn write(&mut self, op: &'static str) -> sqlx::Result<()> {
        self.shared.check(op)?;
        self.writes += 1;
        Ok(())
    }

    fn release_locks(&mut self) {
        let mut held = lock(&self.shared.advisory_locks);
        for lock_id in self.held_locks.drain(..) {
            held.remove(&lock_id);
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.release_locks();
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn try_advisory_lock(&mut self, lock_id: i64) -> sqlx::Result<bool> {
        self.shared.check("try_advisory_lock")?;
        if self.held_locks.contains(&lock_id) {
            return Ok(true);
        }

        let acquired = lock(&self.shared.advisory_locks).insert(lock_id);
        if acquired {
            self.held_locks.push(lock_id);
        }
        Ok(acquired)
    }

    async fn lock_tournament(&mut self, id: TournamentId) -> sqlx::Result<Option<Tournament>> {
        self.shared.check("lock_tournament")?;
        Ok(self.tables.tournaments.get(&id).cloned())
    }

    async fn list_due_tournaments(&mut self, now: DateTime<Utc>) -> sqlx::Result<Vec<Tournament>> {
        self.shared.check("list_due_tournaments")?;
        Ok(self
            .tables
            .tournaments
            .values()
            .filter(|t| t.is_due(now))
            .cloned()
            .collect())
    }

    async fn set_status(&mut self, id: TournamentId, status: TournamentStatus) -> sqlx::Result<()> {
        self.write("set_status")?;
        if let Some(tournament) = self.tables.tournaments.get_mut(&id) {
            tournament.status = status;
        }
        Ok(())
    }

    async fn get_format(&mut self, id: FormatId) -> sqlx::Result<Option<Format>> {
        self.shared.check("get_format")?;
        Ok(self.tables.formats.get(&id).cloned())
    }

    async fn list_confirmed_entrants(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
    ) -> sqlx::Result<Vec<EntrantId>> {
        self.shared.check("list_confirmed_entrants")?;
        let mut confirmed: Vec<_> = self
            .tables
            .participants
            .iter()
            .filter(|p| p.tournament_id == tournament_id && p.is_confirmed())
            .collect();
        confirmed.sort_by_key(|p| p.id);
        Ok(confirmed
            .into_iter()
            .filter_map(|p| p.entrant_id(kind))
            .collect())
    }

    async fn count_matches(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
    ) -> sqlx::Result<i64> {
        self.shared.check("count_matches")?;
        let count = self
            .tables
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id && m.kind == kind)
            .count();
        Ok(count as i64)
    }

    async fn insert_match(
        &mut self,
        kind: ParticipantType,
        new: &NewMatch,
    ) -> sqlx::Result<MatchId> {
        self.write("insert_match")?;
        let id = self.tables.next_match_id();
        self.tables.matches.insert(
            id,
            PersistedMatch {
                id,
                kind,
                tournament_id: new.tournament_id,
                round: new.round,
                match_order: new.match_order,
                bracket_match_id: new.bracket_match_id.clone(),
                slot1: new.slot1,
                slot2: new.slot2,
                score1: None,
                score2: None,
                status: MatchStatus::Scheduled,
                winner_id: None,
                next_match_id: None,
                winner_to_slot: None,
            },
        );
        Ok(id)
    }

    async fn link_match(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
        next_match_id: MatchId,
        winner_to_slot: i16,
    ) -> sqlx::Result<()> {
        self.write("link_match")?;
        if let Some(row) = self
            .tables
            .matches
            .get_mut(&match_id)
            .filter(|m| m.kind == kind)
        {
            row.next_match_id = Some(next_match_id);
            row.winner_to_slot = Some(winner_to_slot);
        }
        Ok(())
    }

    async fn insert_standing(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
        entrant: EntrantId,
    ) -> sqlx::Result<()> {
        self.write("insert_standing")?;
        let id = self.tables.next_row_id();
        let (user_id, team_id) = match kind {
            ParticipantType::Solo => (Some(entrant), None),
            ParticipantType::Team => (None, Some(entrant)),
        };
        self.tables.standings.push(Standing {
            id,
            tournament_id,
            user_id,
            team_id,
            points: 0,
            played: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            score_for: 0,
            score_against: 0,
            rank: 0,
        });
        Ok(())
    }

    async fn lock_match(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
    ) -> sqlx::Result<Option<PersistedMatch>> {
        self.shared.check("lock_match")?;
        Ok(self
            .tables
            .matches
            .get(&match_id)
            .filter(|m| m.kind == kind)
            .cloned())
    }

    async fn complete_match(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
        scores: (i32, i32),
        winner: Option<EntrantId>,
    ) -> sqlx::Result<()> {
        self.write("complete_match")?;
        if let Some(row) = self
            .tables
            .matches
            .get_mut(&match_id)
            .filter(|m| m.kind == kind)
        {
            row.score1 = Some(scores.0);
            row.score2 = Some(scores.1);
            row.winner_id = winner;
            row.status = MatchStatus::Completed;
        }
        Ok(())
    }

    async fn fill_slot(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
        slot: i16,
        entrant: EntrantId,
    ) -> sqlx::Result<()> {
        self.write("fill_slot")?;
        if let Some(row) = self
            .tables
            .matches
            .get_mut(&match_id)
            .filter(|m| m.kind == kind)
        {
            if slot == 1 {
                row.slot1 = Some(entrant);
            } else {
                row.slot2 = Some(entrant);
            }
        }
        Ok(())
    }

    async fn apply_standing(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
        entrant: EntrantId,
        delta: &StandingDelta,
    ) -> sqlx::Result<()> {
        self.write("apply_standing")?;
        self.tables
            .standings
            .iter_mut()
            .filter(|s| s.tournament_id == tournament_id && s.entrant_id(kind) == Some(entrant))
            .for_each(|s| s.apply(delta));
        Ok(())
    }

    async fn rerank_standings(&mut self, tournament_id: TournamentId) -> sqlx::Result<()> {
        self.write("rerank_standings")?;
        let mut ranked: Vec<&mut Standing> = self
            .tables
            .standings
            .iter_mut()
            .filter(|s| s.tournament_id == tournament_id)
            .collect();
        ranked.sort_by(|a, b| a.ranking_cmp(b));
        for (rank, standing) in (1..).zip(ranked) {
            standing.rank = rank;
        }
        Ok(())
    }

    async fn commit(self) -> sqlx::Result<()> {
        let mut this = self;
        this.shared.check("commit")?;

        *lock(&this.shared.committed) = std::mem::take(&mut this.tables);
        *lock(&this.shared.writes) += this.writes;
        *lock(&this.shared.commits) += 1;
        this.release_locks();
        Ok(())
    }

    async fn rollback(self) -> sqlx::Result<()> {
        let mut this = self;
        this.release_locks();
        Ok(())
    }
}
