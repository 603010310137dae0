//! Zero-valued standings for round-robin tournaments.

use super::{BracketError, BracketResult, Stage};
use crate::{
    db::StoreTx,
    tournament::models::{EntrantId, ParticipantType, TournamentId},
};

/// One zero row per entrant, then initial ranks in registration order.
pub async fn initialize_standings<T: StoreTx>(
    tx: &mut T,
    tournament_id: TournamentId,
    kind: ParticipantType,
    entrants: &[EntrantId],
) -> BracketResult<usize> {
    let stage_err = |err: sqlx::Error| BracketError::persistence(Stage::InitStandings, err);

    for &entrant in entrants {
        tx.insert_standing(tournament_id, kind, entrant)
            .await
            .map_err(stage_err)?;
    }
    tx.rerank_standings(tournament_id).await.map_err(stage_err)?;

    Ok(entrants.len())
}
