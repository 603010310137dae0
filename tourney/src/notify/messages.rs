//! Room message wire format.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::tournament::models::{EntrantId, MatchId, TournamentId, TournamentStatus};

/// Kind of event delivered to a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    TournamentStatusUpdated,
    BracketUpdated,
    TournamentCompleted,
}

/// Message fanned out to every subscriber of a room.
///
/// Serializes as `{"type": ..., "payload": ..., "roomId": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: Value,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

/// Room of a tournament: `tournament_{id}`.
pub fn tournament_room(id: TournamentId) -> String {
    format!("tournament_{id}")
}

impl RoomMessage {
    pub fn new(message_type: MessageType, room_id: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type,
            payload,
            room_id: room_id.into(),
        }
    }

    pub fn status_updated(
        tournament_id: TournamentId,
        from: TournamentStatus,
        to: TournamentStatus,
    ) -> Self {
        Self::new(
            MessageType::TournamentStatusUpdated,
            tournament_room(tournament_id),
            json!({ "tournamentId": tournament_id, "from": from, "to": to }),
        )
    }

    pub fn bracket_updated(tournament_id: TournamentId, match_count: usize) -> Self {
        Self::new(
            MessageType::BracketUpdated,
            tournament_room(tournament_id),
            json!({ "tournamentId": tournament_id, "matchCount": match_count }),
        )
    }

    /// Bracket update carrying a single recorded result.
    pub fn match_result(
        tournament_id: TournamentId,
        match_id: MatchId,
        winner_id: Option<EntrantId>,
    ) -> Self {
        Self::new(
            MessageType::BracketUpdated,
            tournament_room(tournament_id),
            json!({ "tournamentId": tournament_id, "matchId": match_id, "winnerId": winner_id }),
        )
    }

    pub fn completed(tournament_id: TournamentId) -> Self {
        Self::new(
            MessageType::TournamentCompleted,
            tournament_room(tournament_id),
            json!({ "tournamentId": tournament_id }),
        )
    }
}
