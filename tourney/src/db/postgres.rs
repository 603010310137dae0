//! PostgreSQL implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

use super::{
    queries,
    repository::{StoreTx, TournamentStore},
};
use crate::tournament::models::{
    EntrantId, Format, FormatId, MatchId, NewMatch, Participant, ParticipantType, PersistedMatch,
    Standing, StandingDelta, Tournament, TournamentId, TournamentStatus,
};

/// PostgreSQL-backed tournament store
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TournamentStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> sqlx::Result<PgTx> {
        Ok(PgTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn ping(&self) -> sqlx::Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }

    async fn get_tournament(&self, id: TournamentId) -> sqlx::Result<Option<Tournament>> {
        queries::fetch_tournament(self.pool.as_ref(), id, false).await
    }

    async fn get_format(&self, id: FormatId) -> sqlx::Result<Option<Format>> {
        queries::fetch_format(self.pool.as_ref(), id).await
    }

    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> sqlx::Result<Vec<Participant>> {
        queries::fetch_participants(self.pool.as_ref(), tournament_id).await
    }

    async fn list_matches(&self, tournament_id: TournamentId) -> sqlx::Result<Vec<PersistedMatch>> {
        let mut matches =
            queries::fetch_matches(self.pool.as_ref(), tournament_id, ParticipantType::Solo)
                .await?;
        matches.extend(
            queries::fetch_matches(self.pool.as_ref(), tournament_id, ParticipantType::Team)
                .await?,
        );
        matches.sort_by_key(|m| (m.round, m.match_order));
        Ok(matches)
    }

    async fn list_standings(&self, tournament_id: TournamentId) -> sqlx::Result<Vec<Standing>> {
        queries::fetch_standings(self.pool.as_ref(), tournament_id).await
    }
}

/// Open PostgreSQL transaction. Dropped without commit, it rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn try_advisory_lock(&mut self, lock_id: i64) -> sqlx::Result<bool> {
        queries::try_advisory_xact_lock(&mut *self.tx, lock_id).await
    }

    async fn lock_tournament(&mut self, id: TournamentId) -> sqlx::Result<Option<Tournament>> {
        queries::fetch_tournament(&mut *self.tx, id, true).await
    }

    async fn list_due_tournaments(&mut self, now: DateTime<Utc>) -> sqlx::Result<Vec<Tournament>> {
        queries::fetch_due_tournaments(&mut *self.tx, now).await
    }

    async fn set_status(&mut self, id: TournamentId, status: TournamentStatus) -> sqlx::Result<()> {
        queries::update_tournament_status(&mut *self.tx, id, status).await
    }

    async fn get_format(&mut self, id: FormatId) -> sqlx::Result<Option<Format>> {
        queries::fetch_format(&mut *self.tx, id).await
    }

    async fn list_confirmed_entrants(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
    ) -> sqlx::Result<Vec<EntrantId>> {
        queries::fetch_confirmed_entrants(&mut *self.tx, tournament_id, kind).await
    }

    async fn count_matches(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
    ) -> sqlx::Result<i64> {
        queries::count_matches(&mut *self.tx, tournament_id, kind).await
    }

    async fn insert_match(
        &mut self,
        kind: ParticipantType,
        new: &NewMatch,
    ) -> sqlx::Result<MatchId> {
        queries::insert_match(&mut *self.tx, kind, new).await
    }

    async fn link_match(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
        next_match_id: MatchId,
        winner_to_slot: i16,
    ) -> sqlx::Result<()> {
        queries::link_match(&mut *self.tx, kind, match_id, next_match_id, winner_to_slot).await
    }

    async fn insert_standing(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
        entrant: EntrantId,
    ) -> sqlx::Result<()> {
        queries::insert_standing(&mut *self.tx, tournament_id, kind, entrant).await
    }

    async fn lock_match(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
    ) -> sqlx::Result<Option<PersistedMatch>> {
        queries::fetch_match_for_update(&mut *self.tx, kind, match_id).await
    }

    async fn complete_match(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
        scores: (i32, i32),
        winner: Option<EntrantId>,
    ) -> sqlx::Result<()> {
        queries::complete_match(&mut *self.tx, kind, match_id, scores, winner).await
    }

    async fn fill_slot(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
        slot: i16,
        entrant: EntrantId,
    ) -> sqlx::Result<()> {
        queries::fill_slot(&mut *self.tx, kind, match_id, slot, entrant).await
    }

    async fn apply_standing(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
        entrant: EntrantId,
        delta: &StandingDelta,
    ) -> sqlx::Result<()> {
        queries::apply_standing(&mut *self.tx, tournament_id, kind, entrant, delta).await
    }

    async fn rerank_standings(&mut self, tournament_id: TournamentId) -> sqlx::Result<()> {
        queries::rerank_standings(&mut *self.tx, tournament_id).await
    }

    async fn commit(self) -> sqlx::Result<()> {
        self.tx.commit().await
    }

    async fn rollback(self) -> sqlx::Result<()> {
        self.tx.rollback().await
    }
}
