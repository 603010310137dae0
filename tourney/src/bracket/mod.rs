//! Bracket generation.
//!
//! Generators are pure: they turn a confirmed entrant list into a [`Bracket`],
//! an arena of [`AbstractMatch`] nodes addressed by [`MatchHandle`]. Nothing in
//! this module touches storage, so every algorithm can be exercised in isolation.
//!
//! ## Example
//!
//! ```
//! use tourney::bracket::{BracketGenerator, SingleEliminationGenerator};
//!
//! let bracket = SingleEliminationGenerator.generate(&[10, 11, 12, 13, 14]).unwrap();
//! assert_eq!(bracket.rounds(), 3);
//! assert_eq!(bracket.real_match_count(), 4);
//! assert_eq!(bracket.bye_count(), 3);
//! ```

pub mod round_robin;
pub mod single_elimination;

pub use round_robin::RoundRobinGenerator;
pub use single_elimination::SingleEliminationGenerator;

use crate::tournament::models::{BracketType, EntrantId, Format};
use enum_dispatch::enum_dispatch;
use thiserror::Error;

/// Generation errors. None of them leave a partial bracket behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Insufficient participants: need {needed}, have {current}")]
    InsufficientParticipants { needed: usize, current: usize },

    #[error("Unsupported bracket type: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed format settings: {0}")]
    MalformedSettings(String),

    #[error("Bye faced bye at round {round}, match {order}")]
    ByeCollision { round: u32, order: u32 },

    #[error("Bye faced an unplayed match at round {round}, match {order}")]
    DanglingBye { round: u32, order: u32 },

    #[error("Final round did not resolve to a single match")]
    UnresolvedTerminal,
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Index of a node inside its [`Bracket`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchHandle(pub usize);

/// One side of a playable match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Known entrant
    Entrant(EntrantId),
    /// Filled later by the winner of another node
    WinnerOf(MatchHandle),
}

impl Slot {
    pub fn entrant(self) -> Option<EntrantId> {
        match self {
            Self::Entrant(id) => Some(id),
            Self::WinnerOf(_) => None,
        }
    }

    pub fn source(self) -> Option<MatchHandle> {
        match self {
            Self::WinnerOf(handle) => Some(handle),
            Self::Entrant(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Entrant advances without playing; never persisted.
    Bye { survivor: EntrantId },
    /// Real match between two slots.
    Match { home: Slot, away: Slot },
}

/// Transient bracket node produced by a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractMatch {
    /// `R{round}M{order}`, unique within a bracket
    pub uid: String,
    pub round: u32,
    pub order: u32,
    pub kind: MatchKind,
}

impl AbstractMatch {
    pub(crate) fn new(round: u32, order: u32, kind: MatchKind) -> Self {
        Self {
            uid: format!("R{round}M{order}"),
            round,
            order,
            kind,
        }
    }

    pub fn is_bye(&self) -> bool {
        matches!(self.kind, MatchKind::Bye { .. })
    }

    pub fn bye_survivor(&self) -> Option<EntrantId> {
        match self.kind {
            MatchKind::Bye { survivor } => Some(survivor),
            MatchKind::Match { .. } => None,
        }
    }

    pub fn slots(&self) -> Option<[Slot; 2]> {
        match self.kind {
            MatchKind::Match { home, away } => Some([home, away]),
            MatchKind::Bye { .. } => None,
        }
    }

    /// Source references as `(slot number, source handle)`, slot numbers being 1 or 2.
    pub fn sources(&self) -> impl Iterator<Item = (i16, MatchHandle)> + '_ {
        self.slots()
            .into_iter()
            .flat_map(|slots| slots.into_iter().zip(1i16..))
            .filter_map(|(slot, number)| slot.source().map(|handle| (number, handle)))
    }
}

/// Generated bracket, ordered by `(round, order)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bracket {
    matches: Vec<AbstractMatch>,
    rounds: u32,
}

impl Bracket {
    pub(crate) fn new(matches: Vec<AbstractMatch>, rounds: u32) -> Self {
        Self { matches, rounds }
    }

    pub fn matches(&self) -> &[AbstractMatch] {
        &self.matches
    }

    pub fn get(&self, handle: MatchHandle) -> Option<&AbstractMatch> {
        self.matches.get(handle.0)
    }

    /// Nodes paired with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (MatchHandle, &AbstractMatch)> {
        self.matches
            .iter()
            .enumerate()
            .map(|(index, node)| (MatchHandle(index), node))
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn real_match_count(&self) -> usize {
        self.matches.iter().filter(|node| !node.is_bye()).count()
    }

    pub fn bye_count(&self) -> usize {
        self.matches.iter().filter(|node| node.is_bye()).count()
    }
}

/// Strategy turning an entrant list into a bracket.
#[enum_dispatch]
pub trait BracketGenerator {
    fn bracket_type(&self) -> BracketType;

    /// Entrant order is preserved; no seeding is applied.
    fn generate(&self, entrants: &[EntrantId]) -> GenerationResult<Bracket>;
}

/// Generator chosen from a [`Format`]
#[enum_dispatch(BracketGenerator)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generator {
    SingleElimination(SingleEliminationGenerator),
    RoundRobin(RoundRobinGenerator),
}

impl Generator {
    pub fn for_format(format: &Format) -> GenerationResult<Self> {
        let kind = format
            .bracket_kind()
            .map_err(|_| GenerationError::UnsupportedFormat(format.bracket_type.clone()))?;

        Ok(match kind {
            BracketType::SingleElimination => SingleEliminationGenerator.into(),
            BracketType::RoundRobin => RoundRobinGenerator::from_settings(&format.settings)?.into(),
        })
    }
}

pub(crate) fn ensure_enough(entrants: &[EntrantId]) -> GenerationResult<()> {
    use crate::tournament::models::MIN_PARTICIPANTS;

    if entrants.len() < MIN_PARTICIPANTS {
        return Err(GenerationError::InsufficientParticipants {
            needed: MIN_PARTICIPANTS,
            current: entrants.len(),
        });
    }
    Ok(())
}
