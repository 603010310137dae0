//! Round-robin schedule: every pair meets once, or twice with home/away swapped.

use super::{
    AbstractMatch, Bracket, BracketGenerator, GenerationError, GenerationResult, MatchKind, Slot,
    ensure_enough,
};
use crate::tournament::models::{BracketType, EntrantId};
use serde_json::Value;

/// Settings key holding the leg count.
pub const NUMBER_OF_ROUNDS_KEY: &str = "numberOfRounds";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRobinGenerator {
    legs: u8,
}

impl Default for RoundRobinGenerator {
    fn default() -> Self {
        Self { legs: 1 }
    }
}

impl RoundRobinGenerator {
    /// Leg count is clamped to 1 (single) or 2 (double).
    pub fn new(legs: u8) -> Self {
        Self {
            legs: legs.clamp(1, 2),
        }
    }

    /// Read `numberOfRounds` from format settings. Missing or null means a single leg.
    pub fn from_settings(settings: &Value) -> GenerationResult<Self> {
        let rounds = match settings {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map.get(NUMBER_OF_ROUNDS_KEY),
            other => {
                return Err(GenerationError::MalformedSettings(format!(
                    "expected an object, got {other}"
                )));
            }
        };

        match rounds {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => whole_number(value)
                .map(|n| Self::new(n.clamp(1, 2) as u8))
                .ok_or_else(|| {
                    GenerationError::MalformedSettings(format!(
                        "{NUMBER_OF_ROUNDS_KEY} must be an integer, got {value}"
                    ))
                }),
        }
    }

    pub fn legs(&self) -> u8 {
        self.legs
    }
}

/// Integer value, also accepting floats without a fractional part (`2.0`).
fn whole_number(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

impl BracketGenerator for RoundRobinGenerator {
    fn bracket_type(&self) -> BracketType {
        BracketType::RoundRobin
    }

    fn generate(&self, entrants: &[EntrantId]) -> GenerationResult<Bracket> {
        ensure_enough(entrants)?;

        let n = entrants.len();
        let total_pairs = (n * (n - 1) / 2) as u32;
        let mut nodes = Vec::with_capacity(total_pairs as usize * self.legs as usize);

        let pairs = (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j)));
        for (pair_index, (i, j)) in (1u32..).zip(pairs) {
            let (home, away) = (entrants[i], entrants[j]);

            nodes.push(AbstractMatch::new(
                1,
                pair_index,
                MatchKind::Match {
                    home: Slot::Entrant(home),
                    away: Slot::Entrant(away),
                },
            ));

            if self.legs == 2 {
                nodes.push(AbstractMatch::new(
                    1,
                    pair_index + total_pairs,
                    MatchKind::Match {
                        home: Slot::Entrant(away),
                        away: Slot::Entrant(home),
                    },
                ));
            }
        }

        nodes.sort_by_key(|node| node.order);

        Ok(Bracket::new(nodes, 1))
    }
}
