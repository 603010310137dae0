//! Aggregated read model of a tournament.

use serde::Serialize;
use std::{future::Future, sync::Arc};
use thiserror::Error;

use super::models::{
    Format, FormatId, Participant, PersistedMatch, Standing, Tournament, TournamentId,
};
use crate::db::TournamentStore;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Tournament {0} not found")]
    NotFound(TournamentId),

    #[error("Format {0} not found")]
    FormatNotFound(FormatId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ViewError {
    pub fn client_message(&self) -> String {
        match self {
            ViewError::Database(_) => "Internal server error".to_string(),
            ViewError::NotFound(_) => "Tournament not found".to_string(),
            ViewError::FormatNotFound(_) => "Tournament format not found".to_string(),
        }
    }
}

pub type ViewResult<T> = Result<T, ViewError>;

/// Tournament with its format, confirmed participants, matches and standings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentView {
    pub tournament: Tournament,
    pub format: Format,
    pub participants: Vec<Participant>,
    pub matches: Vec<PersistedMatch>,
    pub standings: Vec<Standing>,
}

pub struct TournamentViews<S: TournamentStore> {
    store: Arc<S>,
}

impl<S: TournamentStore> Clone for TournamentViews<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

/// Turn a failed non-critical read into an empty list.
async fn degrade<T, F>(what: &'static str, id: TournamentId, read: F) -> ViewResult<Vec<T>>
where
    F: Future<Output = sqlx::Result<Vec<T>>>,
{
    Ok(read.await.unwrap_or_else(|e| {
        log::warn!("Tournament {id}: {what} unavailable, returning empty list: {e}");
        Vec::new()
    }))
}

impl<S: TournamentStore> TournamentViews<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Tournament and format are required; the other parts degrade to empty
    /// lists when their reads fail.
    pub async fn get_tournament_view(&self, id: TournamentId) -> ViewResult<TournamentView> {
        let tournament = self
            .store
            .get_tournament(id)
            .await?
            .ok_or(ViewError::NotFound(id))?;

        let format = async {
            self.store
                .get_format(tournament.format_id)
                .await?
                .ok_or(ViewError::FormatNotFound(tournament.format_id))
        };
        let participants = degrade("participants", id, async {
            let all = self.store.list_participants(id).await?;
            let confirmed: Vec<_> = all.into_iter().filter(Participant::is_confirmed).collect();
            Ok::<_, sqlx::Error>(confirmed)
        });
        let matches = degrade("matches", id, self.store.list_matches(id));
        let standings = degrade("standings", id, self.store.list_standings(id));

        let (format, participants, matches, standings) =
            tokio::try_join!(format, participants, matches, standings)?;

        Ok(TournamentView {
            tournament,
            format,
            participants,
            matches,
            standings,
        })
    }
}
