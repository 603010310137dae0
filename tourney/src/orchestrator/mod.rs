//! Bracket orchestration: entrants, generation, persistence, links, standings.
//!
//! Everything runs on the caller's transaction; nothing here commits or rolls
//! back, so a failure anywhere leaves the caller free to discard the whole unit.

pub mod persistence;
pub mod standings;

pub use persistence::{link_bracket, persist_bracket};
pub use standings::initialize_standings;

use crate::{
    bracket::{Bracket, BracketGenerator, GenerationError, Generator},
    db::StoreTx,
    tournament::models::{BracketType, EntrantId, Format, ParticipantType, TournamentId},
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Persistence step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadParticipants,
    InsertMatches,
    LinkMatches,
    InitStandings,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LoadParticipants => "load_participants",
            Self::InsertMatches => "insert_matches",
            Self::LinkMatches => "link_matches",
            Self::InitStandings => "init_standings",
        })
    }
}

#[derive(Debug, Error)]
pub enum BracketError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Bracket persistence failed at {stage}: {source}")]
    Persistence {
        stage: Stage,
        #[source]
        source: sqlx::Error,
    },

    #[error("Match {uid} has no persisted row to link")]
    Unlinked { uid: String },
}

impl BracketError {
    pub(crate) fn persistence(stage: Stage, source: sqlx::Error) -> Self {
        Self::Persistence { stage, source }
    }
}

pub type BracketResult<T> = Result<T, BracketError>;

/// What a generation run wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BracketSummary {
    pub bracket_type: BracketType,
    pub participant_type: ParticipantType,
    pub rounds: u32,
    /// Persisted (non-bye) matches
    pub matches: usize,
    pub byes: usize,
    pub links: usize,
    pub standings: usize,
}

/// Builds and stores brackets
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketOrchestrator;

impl BracketOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Confirmed entrants in registration order
    pub async fn load_entrants<T: StoreTx>(
        &self,
        tx: &mut T,
        tournament_id: TournamentId,
        kind: ParticipantType,
    ) -> BracketResult<Vec<EntrantId>> {
        tx.list_confirmed_entrants(tournament_id, kind)
            .await
            .map_err(|err| BracketError::persistence(Stage::LoadParticipants, err))
    }

    /// Pure generation step; nothing is written.
    pub fn build(
        &self,
        format: &Format,
        entrants: &[EntrantId],
    ) -> BracketResult<(BracketType, Bracket)> {
        let generator = Generator::for_format(format)?;
        Ok((generator.bracket_type(), generator.generate(entrants)?))
    }

    /// Generate and store the bracket for `entrants`.
    pub async fn generate<T: StoreTx>(
        &self,
        tx: &mut T,
        tournament_id: TournamentId,
        format: &Format,
        entrants: &[EntrantId],
    ) -> BracketResult<BracketSummary> {
        let (bracket_type, bracket) = self.build(format, entrants)?;
        let kind = format.participant_type;

        let ids = persist_bracket(tx, tournament_id, kind, &bracket).await?;

        let (links, standings) = match bracket_type {
            BracketType::SingleElimination => {
                (link_bracket(tx, kind, &bracket, &ids).await?, 0)
            }
            BracketType::RoundRobin => (
                0,
                initialize_standings(tx, tournament_id, kind, entrants).await?,
            ),
        };

        let summary = BracketSummary {
            bracket_type,
            participant_type: kind,
            rounds: bracket.rounds(),
            matches: bracket.real_match_count(),
            byes: bracket.bye_count(),
            links,
            standings,
        };

        log::info!(
            "Tournament {}: generated {} bracket with {} matches over {} rounds ({} byes)",
            tournament_id,
            bracket_type.as_str(),
            summary.matches,
            summary.rounds,
            summary.byes
        );

        Ok(summary)
    }
}
