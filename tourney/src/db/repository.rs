//! Store trait definitions for testability and dependency injection.
//!
//! [`TournamentStore`] hands out units of work ([`StoreTx`]). Everything the
//! lifecycle, orchestrator and scheduler write goes through a `StoreTx`, so the
//! same code runs whether the transaction is owned by a request handler or
//! shared across a scheduler batch. Dropping a `StoreTx` without committing
//! rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::tournament::models::{
    EntrantId, Format, FormatId, MatchId, NewMatch, Participant, ParticipantType, PersistedMatch,
    Standing, StandingDelta, Tournament, TournamentId, TournamentStatus,
};

/// Store of tournaments, brackets and standings
#[async_trait]
pub trait TournamentStore: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a transaction
    async fn begin(&self) -> sqlx::Result<Self::Tx>;

    /// Connectivity check
    async fn ping(&self) -> sqlx::Result<()>;

    async fn get_tournament(&self, id: TournamentId) -> sqlx::Result<Option<Tournament>>;

    async fn get_format(&self, id: FormatId) -> sqlx::Result<Option<Format>>;

    async fn list_participants(&self, tournament_id: TournamentId)
    -> sqlx::Result<Vec<Participant>>;

    /// Solo and team matches of a tournament, ordered by round then order
    async fn list_matches(&self, tournament_id: TournamentId) -> sqlx::Result<Vec<PersistedMatch>>;

    /// Standings ordered by rank
    async fn list_standings(&self, tournament_id: TournamentId) -> sqlx::Result<Vec<Standing>>;
}

/// Unit of work on a [`TournamentStore`]
#[async_trait]
pub trait StoreTx: Send {
    /// Transaction-scoped advisory lock; released at commit or rollback.
    async fn try_advisory_lock(&mut self, lock_id: i64) -> sqlx::Result<bool>;

    /// Load a tournament and lock its row for the rest of the transaction
    async fn lock_tournament(&mut self, id: TournamentId) -> sqlx::Result<Option<Tournament>>;

    /// Non-terminal tournaments whose dates put them ahead of their stored status
    async fn list_due_tournaments(&mut self, now: DateTime<Utc>) -> sqlx::Result<Vec<Tournament>>;

    async fn set_status(&mut self, id: TournamentId, status: TournamentStatus) -> sqlx::Result<()>;

    async fn get_format(&mut self, id: FormatId) -> sqlx::Result<Option<Format>>;

    /// Confirmed entrants in registration order
    async fn list_confirmed_entrants(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
    ) -> sqlx::Result<Vec<EntrantId>>;

    async fn count_matches(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
    ) -> sqlx::Result<i64>;

    async fn insert_match(&mut self, kind: ParticipantType, new: &NewMatch)
    -> sqlx::Result<MatchId>;

    /// Point `match_id` at the match its winner feeds
    async fn link_match(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
        next_match_id: MatchId,
        winner_to_slot: i16,
    ) -> sqlx::Result<()>;

    /// Zero-valued standing row
    async fn insert_standing(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
        entrant: EntrantId,
    ) -> sqlx::Result<()>;

    /// Load a match and lock its row for the rest of the transaction
    async fn lock_match(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
    ) -> sqlx::Result<Option<PersistedMatch>>;

    async fn complete_match(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
        scores: (i32, i32),
        winner: Option<EntrantId>,
    ) -> sqlx::Result<()>;

    /// Write an entrant into slot 1 or 2 of a match
    async fn fill_slot(
        &mut self,
        kind: ParticipantType,
        match_id: MatchId,
        slot: i16,
        entrant: EntrantId,
    ) -> sqlx::Result<()>;

    async fn apply_standing(
        &mut self,
        tournament_id: TournamentId,
        kind: ParticipantType,
        entrant: EntrantId,
        delta: &StandingDelta,
    ) -> sqlx::Result<()>;

    /// Recompute ranks of every standing in the tournament
    async fn rerank_standings(&mut self, tournament_id: TournamentId) -> sqlx::Result<()>;

    async fn commit(self) -> sqlx::Result<()>;

    async fn rollback(self) -> sqlx::Result<()>;
}
