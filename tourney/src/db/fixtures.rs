//! Seed data for tests against a [`MemoryStore`].

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::MemoryStore;
use crate::tournament::models::{
    BracketType, EntrantId, Format, ParticipantStatus, ParticipantType, Tournament, TournamentId,
    TournamentSchedule, TournamentStatus,
};

/// Schedule with dates `registration`, `start` and `end` days away from `now`.
///
/// # Panics
///
/// Panics if the offsets are not ordered `registration <= start < end`.
pub fn schedule(now: DateTime<Utc>, registration: i64, start: i64, end: i64) -> TournamentSchedule {
    TournamentSchedule::new(
        now + Duration::days(registration),
        now + Duration::days(start),
        now + Duration::days(end),
    )
    .expect("fixture dates are ordered")
}

/// What to seed for one tournament
#[derive(Debug, Clone)]
pub struct Seed {
    pub id: TournamentId,
    pub bracket_type: String,
    pub participant_type: ParticipantType,
    pub settings: Value,
    pub status: TournamentStatus,
    pub schedule: TournamentSchedule,
    pub entrants: Vec<EntrantId>,
}

impl Seed {
    pub fn new(id: TournamentId, bracket_type: BracketType, schedule: TournamentSchedule) -> Self {
        Self {
            id,
            bracket_type: bracket_type.as_str().to_string(),
            participant_type: ParticipantType::Solo,
            settings: Value::Null,
            status: TournamentStatus::Registration,
            schedule,
            entrants: Vec::new(),
        }
    }

    pub fn status(mut self, status: TournamentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn teams(mut self) -> Self {
        self.participant_type = ParticipantType::Team;
        self
    }

    pub fn settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn bracket_type(mut self, bracket_type: &str) -> Self {
        self.bracket_type = bracket_type.to_string();
        self
    }

    /// Confirmed entrants, registered in this order
    pub fn entrants(mut self, entrants: impl IntoIterator<Item = EntrantId>) -> Self {
        self.entrants = entrants.into_iter().collect();
        self
    }

    /// Write format, tournament and confirmed participants. The format shares
    /// the tournament's id.
    pub fn insert(self, store: &MemoryStore) -> Tournament {
        store.insert_format(Format {
            id: self.id,
            name: format!("Format {}", self.id),
            bracket_type: self.bracket_type,
            participant_type: self.participant_type,
            settings: self.settings,
        });

        let tournament = Tournament {
            id: self.id,
            name: format!("Tournament {}", self.id),
            format_id: self.id,
            organizer_id: 1,
            max_participants: 64,
            schedule: self.schedule,
            status: self.status,
        };
        store.insert_tournament(tournament.clone());

        for entrant in self.entrants {
            let (user_id, team_id) = match self.participant_type {
                ParticipantType::Solo => (Some(entrant), None),
                ParticipantType::Team => (None, Some(entrant)),
            };
            store.add_participant(self.id, user_id, team_id, ParticipantStatus::Confirmed);
        }

        tournament
    }
}
