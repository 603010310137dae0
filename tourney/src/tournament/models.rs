//! Tournament data models: tournaments, formats, participants, matches and standings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};
use thiserror::Error;

/// Tournament ID type
pub type TournamentId = i64;

/// Format ID type
pub type FormatId = i64;

/// Persisted match ID type (solo or team match row)
pub type MatchId = i64;

/// A user id (solo formats) or a team id (team formats) taking part in a bracket.
pub type EntrantId = i64;

/// Minimum number of confirmed entrants a bracket can be built for.
pub const MIN_PARTICIPANTS: usize = 2;

/// Unknown textual value read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Tournament status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    /// Announced, registration not open yet
    Soon,
    /// Accepting registrations
    Registration,
    /// Bracket generated, matches being played
    Active,
    /// Finished
    Completed,
    /// Called off
    Canceled,
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: TournamentStatus,
    pub to: TournamentStatus,
}

impl TournamentStatus {
    pub const ALL: [TournamentStatus; 5] = [
        Self::Soon,
        Self::Registration,
        Self::Active,
        Self::Completed,
        Self::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soon => "soon",
            Self::Registration => "registration",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    /// Completed and canceled tournaments never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }

    /// Whether `self -> target` is an edge of the status graph.
    ///
    /// Self transitions are always allowed and treated as no-ops by callers.
    pub fn can_transition_to(self, target: TournamentStatus) -> bool {
        if self == target {
            return true;
        }

        matches!(
            (self, target),
            (Self::Soon, Self::Registration)
                | (Self::Soon, Self::Canceled)
                | (Self::Registration, Self::Active)
                | (Self::Registration, Self::Canceled)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Canceled)
        )
    }

    pub fn validate_transition(self, target: TournamentStatus) -> Result<(), TransitionError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(TransitionError {
                from: self,
                to: target,
            })
        }
    }

    /// Position on the forward path `soon -> registration -> active -> completed`.
    /// Canceled is off the path.
    fn progress(self) -> Option<u8> {
        match self {
            Self::Soon => Some(0),
            Self::Registration => Some(1),
            Self::Active => Some(2),
            Self::Completed => Some(3),
            Self::Canceled => None,
        }
    }

    /// Whether `self` lies strictly behind `target` on the forward path.
    pub fn is_behind(self, target: TournamentStatus) -> bool {
        match (self.progress(), target.progress()) {
            (Some(current), Some(wanted)) => current < wanted,
            _ => false,
        }
    }

    /// Next single forward step toward `target`, if `self` is behind it.
    pub fn next_toward(self, target: TournamentStatus) -> Option<TournamentStatus> {
        if !self.is_behind(target) {
            return None;
        }

        match self {
            Self::Soon => Some(Self::Registration),
            Self::Registration => Some(Self::Active),
            Self::Active => Some(Self::Completed),
            Self::Completed | Self::Canceled => None,
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "tournament status",
                value: s.to_string(),
            })
    }
}

/// Invalid registration/start/end ordering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tournament dates must satisfy registration <= start < end")]
pub struct ScheduleError;

/// Registration, start and end timestamps of a tournament.
///
/// Always satisfies `registration_date <= start_date < end_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentSchedule {
    registration_date: DateTime<Utc>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl TournamentSchedule {
    pub fn new(
        registration_date: DateTime<Utc>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Self, ScheduleError> {
        if registration_date > start_date || start_date >= end_date {
            return Err(ScheduleError);
        }

        Ok(Self {
            registration_date,
            start_date,
            end_date,
        })
    }

    pub fn registration_date(&self) -> DateTime<Utc> {
        self.registration_date
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    /// Status the calendar says the tournament should be in at `now`.
    pub fn expected_status(&self, now: DateTime<Utc>) -> TournamentStatus {
        if now < self.registration_date {
            TournamentStatus::Soon
        } else if now < self.start_date {
            TournamentStatus::Registration
        } else if now < self.end_date {
            TournamentStatus::Active
        } else {
            TournamentStatus::Completed
        }
    }
}

/// Tournament record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub format_id: FormatId,
    pub organizer_id: i64,
    pub max_participants: i32,
    pub schedule: TournamentSchedule,
    pub status: TournamentStatus,
}

impl Tournament {
    /// Whether the scheduler should move this tournament forward at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.status.is_behind(self.schedule.expected_status(now))
    }
}

/// Bracket algorithm of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BracketType {
    SingleElimination,
    RoundRobin,
}

impl BracketType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleElimination => "SingleElimination",
            Self::RoundRobin => "RoundRobin",
        }
    }
}

impl FromStr for BracketType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SingleElimination" => Ok(Self::SingleElimination),
            "RoundRobin" => Ok(Self::RoundRobin),
            other => Err(ParseEnumError {
                kind: "bracket type",
                value: other.to_string(),
            }),
        }
    }
}

/// Who plays in a format's matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    Solo,
    Team,
}

impl ParticipantType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solo => "solo",
            Self::Team => "team",
        }
    }
}

impl FromStr for ParticipantType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solo" => Ok(Self::Solo),
            "team" => Ok(Self::Team),
            other => Err(ParseEnumError {
                kind: "participant type",
                value: other.to_string(),
            }),
        }
    }
}

/// Tournament format
///
/// The bracket type is kept as stored so that an unknown algorithm name
/// surfaces as a generation error rather than a load failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub id: FormatId,
    pub name: String,
    pub bracket_type: String,
    pub participant_type: ParticipantType,
    /// Algorithm specific settings, e.g. `{"numberOfRounds": 2}`
    pub settings: serde_json::Value,
}

impl Format {
    pub fn bracket_kind(&self) -> Result<BracketType, ParseEnumError> {
        self.bracket_type.parse()
    }
}

/// Registration approval status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl ParticipantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for ParticipantStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseEnumError {
                kind: "participant status",
                value: other.to_string(),
            }),
        }
    }
}

/// Tournament registration entry: exactly one of `user_id` / `team_id` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub tournament_id: TournamentId,
    pub user_id: Option<i64>,
    pub team_id: Option<i64>,
    pub status: ParticipantStatus,
}

impl Participant {
    /// Entrant id this participant contributes to a bracket of the given kind.
    pub fn entrant_id(&self, kind: ParticipantType) -> Option<EntrantId> {
        match kind {
            ParticipantType::Solo => self.user_id,
            ParticipantType::Team => self.team_id,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ParticipantStatus::Confirmed
    }
}

/// Persisted match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Completed,
    Canceled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }
}

impl FromStr for MatchStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            other => Err(ParseEnumError {
                kind: "match status",
                value: other.to_string(),
            }),
        }
    }
}

/// Row to insert for one non-bye bracket node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    pub tournament_id: TournamentId,
    pub round: i32,
    pub match_order: i32,
    pub bracket_match_id: String,
    pub slot1: Option<EntrantId>,
    pub slot2: Option<EntrantId>,
}

/// Solo or team match as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMatch {
    pub id: MatchId,
    pub kind: ParticipantType,
    pub tournament_id: TournamentId,
    pub round: i32,
    pub match_order: i32,
    pub bracket_match_id: String,
    pub slot1: Option<EntrantId>,
    pub slot2: Option<EntrantId>,
    pub score1: Option<i32>,
    pub score2: Option<i32>,
    pub status: MatchStatus,
    pub winner_id: Option<EntrantId>,
    /// Match that receives this match's winner
    pub next_match_id: Option<MatchId>,
    /// Slot (1 or 2) of `next_match_id` the winner is written into
    pub winner_to_slot: Option<i16>,
}

/// Points awarded per round-robin result
pub const POINTS_FOR_WIN: i32 = 3;
pub const POINTS_FOR_DRAW: i32 = 1;
pub const POINTS_FOR_LOSS: i32 = 0;

/// Round-robin scoreboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub id: i64,
    pub tournament_id: TournamentId,
    pub user_id: Option<i64>,
    pub team_id: Option<i64>,
    pub points: i32,
    pub played: i32,
    pub wins: i32,
    pub draws: i32,
    pub losses: i32,
    pub score_for: i32,
    pub score_against: i32,
    pub rank: i32,
}

impl Standing {
    pub fn entrant_id(&self, kind: ParticipantType) -> Option<EntrantId> {
        match kind {
            ParticipantType::Solo => self.user_id,
            ParticipantType::Team => self.team_id,
        }
    }

    pub fn score_difference(&self) -> i32 {
        self.score_for - self.score_against
    }

    /// Ranking order: points, then score difference, then score for, then row id.
    pub fn ranking_cmp(&self, other: &Self) -> Ordering {
        other
            .points
            .cmp(&self.points)
            .then_with(|| other.score_difference().cmp(&self.score_difference()))
            .then_with(|| other.score_for.cmp(&self.score_for))
            .then_with(|| self.id.cmp(&other.id))
    }

    pub fn apply(&mut self, delta: &StandingDelta) {
        self.points += delta.points;
        self.played += delta.played;
        self.wins += delta.wins;
        self.draws += delta.draws;
        self.losses += delta.losses;
        self.score_for += delta.score_for;
        self.score_against += delta.score_against;
    }
}

/// Increment applied to one standing after a recorded round-robin result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StandingDelta {
    pub points: i32,
    pub played: i32,
    pub wins: i32,
    pub draws: i32,
    pub losses: i32,
    pub score_for: i32,
    pub score_against: i32,
}

impl StandingDelta {
    /// Delta for the side that scored `own` against `other`.
    pub fn for_result(own: i32, other: i32) -> Self {
        let (points, wins, draws, losses) = match own.cmp(&other) {
            Ordering::Greater => (POINTS_FOR_WIN, 1, 0, 0),
            Ordering::Equal => (POINTS_FOR_DRAW, 0, 1, 0),
            Ordering::Less => (POINTS_FOR_LOSS, 0, 0, 1),
        };

        Self {
            points,
            played: 1,
            wins,
            draws,
            losses,
            score_for: own,
            score_against: other,
        }
    }
}
