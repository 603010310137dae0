//! Two-pass match persistence.
//!
//! Pass one inserts a row per real match and records its id against the arena
//! handle. Pass two points every source match at the match that consumes its
//! winner. Both passes run on the caller's transaction.

use super::{BracketError, BracketResult, Stage};
use crate::{
    bracket::Bracket,
    db::StoreTx,
    tournament::models::{MatchId, NewMatch, ParticipantType, TournamentId},
};

/// Insert every non-bye node. Returns persisted ids indexed by arena handle;
/// byes map to `None`.
pub async fn persist_bracket<T: StoreTx>(
    tx: &mut T,
    tournament_id: TournamentId,
    kind: ParticipantType,
    bracket: &Bracket,
) -> BracketResult<Vec<Option<MatchId>>> {
    let mut ids = Vec::with_capacity(bracket.len());

    for node in bracket.matches() {
        let Some([home, away]) = node.slots() else {
            log::debug!(
                "Tournament {}: {} is a bye, skipping",
                tournament_id,
                node.uid
            );
            ids.push(None);
            continue;
        };

        let new = NewMatch {
            tournament_id,
            round: node.round as i32,
            match_order: node.order as i32,
            bracket_match_id: node.uid.clone(),
            slot1: home.entrant(),
            slot2: away.entrant(),
        };

        let id = tx
            .insert_match(kind, &new)
            .await
            .map_err(|err| BracketError::persistence(Stage::InsertMatches, err))?;
        ids.push(Some(id));
    }

    Ok(ids)
}

/// Write `next_match_id` / `winner_to_slot` for every source reference.
/// Returns the number of links written.
pub async fn link_bracket<T: StoreTx>(
    tx: &mut T,
    kind: ParticipantType,
    bracket: &Bracket,
    ids: &[Option<MatchId>],
) -> BracketResult<usize> {
    let persisted = |uid: &str, index: usize| {
        ids.get(index)
            .copied()
            .flatten()
            .ok_or_else(|| BracketError::Unlinked {
                uid: uid.to_string(),
            })
    };

    let mut links = 0;
    for (handle, node) in bracket.iter() {
        for (slot, source) in node.sources() {
            let current = persisted(&node.uid, handle.0)?;
            let source_uid = bracket
                .get(source)
                .map_or_else(|| format!("#{}", source.0), |m| m.uid.clone());
            let source_id = persisted(&source_uid, source.0)?;

            tx.link_match(kind, source_id, current, slot)
                .await
                .map_err(|err| BracketError::persistence(Stage::LinkMatches, err))?;
            links += 1;
        }
    }

    Ok(links)
}
