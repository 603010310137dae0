//! Single-elimination tree with byes.
//!
//! The bracket is padded to the next power of two. Seeds are folded so that
//! seed `k` faces seed `size - 1 - k`; with entrants occupying the first seeds
//! every bye faces an entrant in round one and byes never meet each other.

use super::{
    AbstractMatch, Bracket, BracketGenerator, GenerationError, GenerationResult, MatchHandle,
    MatchKind, Slot, ensure_enough,
};
use crate::tournament::models::{BracketType, EntrantId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleEliminationGenerator;

/// A position in the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seat {
    Entrant(EntrantId),
    WinnerOf(MatchHandle),
    Bye,
}

impl Seat {
    fn slot(self) -> Option<Slot> {
        match self {
            Self::Entrant(id) => Some(Slot::Entrant(id)),
            Self::WinnerOf(handle) => Some(Slot::WinnerOf(handle)),
            Self::Bye => None,
        }
    }
}

/// `(rounds, bracket_size, byes)` for `n` entrants.
pub fn bracket_dimensions(n: usize) -> (u32, usize, usize) {
    let size = n.max(1).next_power_of_two();
    (size.trailing_zeros(), size, size - n)
}

/// First-round seats: seed `k` is placed next to seed `size - 1 - k`.
fn fold_seeds(entrants: &[EntrantId], size: usize) -> Vec<Seat> {
    let seed = |k: usize| entrants.get(k).copied().map_or(Seat::Bye, Seat::Entrant);

    (0..size / 2)
        .flat_map(|k| [seed(k), seed(size - 1 - k)])
        .collect()
}

impl BracketGenerator for SingleEliminationGenerator {
    fn bracket_type(&self) -> BracketType {
        BracketType::SingleElimination
    }

    fn generate(&self, entrants: &[EntrantId]) -> GenerationResult<Bracket> {
        ensure_enough(entrants)?;

        let (rounds, size, _) = bracket_dimensions(entrants.len());
        let mut seats = fold_seeds(entrants, size);
        let mut nodes: Vec<AbstractMatch> = Vec::with_capacity(size - 1);

        for round in 1..=rounds {
            let mut next = Vec::with_capacity(seats.len() / 2);

            for (index, pair) in seats.chunks_exact(2).enumerate() {
                let order = index as u32 + 1;

                let advancing = match (pair[0], pair[1]) {
                    (Seat::Bye, Seat::Bye) => {
                        return Err(GenerationError::ByeCollision { round, order });
                    }
                    (Seat::Entrant(survivor), Seat::Bye) | (Seat::Bye, Seat::Entrant(survivor)) => {
                        nodes.push(AbstractMatch::new(round, order, MatchKind::Bye { survivor }));
                        Seat::Entrant(survivor)
                    }
                    (Seat::WinnerOf(_), Seat::Bye) | (Seat::Bye, Seat::WinnerOf(_)) => {
                        return Err(GenerationError::DanglingBye { round, order });
                    }
                    (home, away) => {
                        let (Some(home), Some(away)) = (home.slot(), away.slot()) else {
                            return Err(GenerationError::DanglingBye { round, order });
                        };
                        let handle = MatchHandle(nodes.len());
                        nodes.push(AbstractMatch::new(round, order, MatchKind::Match { home, away }));
                        Seat::WinnerOf(handle)
                    }
                };

                next.push(advancing);
            }

            seats = next;
        }

        match seats.as_slice() {
            [Seat::WinnerOf(_)] => Ok(Bracket::new(nodes, rounds)),
            _ => Err(GenerationError::UnresolvedTerminal),
        }
    }
}
