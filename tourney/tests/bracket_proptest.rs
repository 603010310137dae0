/// Property-based tests for bracket generation using proptest
///
/// These tests check the structural guarantees of both generators across a
/// wide range of entrant counts.
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use tourney::bracket::{
    BracketGenerator, MatchHandle, MatchKind, RoundRobinGenerator, SingleEliminationGenerator,
    Slot, single_elimination::bracket_dimensions,
};

// Distinct entrant ids in arbitrary order
fn entrants_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(1i64..100_000, min..=max)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

proptest! {
    #[test]
    fn test_single_elimination_counts(entrants in entrants_strategy(2, 200)) {
        let n = entrants.len();
        let bracket = SingleEliminationGenerator.generate(&entrants).unwrap();
        let (rounds, size, byes) = bracket_dimensions(n);

        prop_assert_eq!(bracket.real_match_count(), n - 1);
        prop_assert_eq!(bracket.bye_count(), byes);
        prop_assert_eq!(bracket.rounds(), rounds);
        prop_assert_eq!(size, 1usize << rounds);
        prop_assert!(size >= n && size / 2 < n);
    }

    #[test]
    fn test_every_entrant_seated_once_in_round_one(entrants in entrants_strategy(2, 130)) {
        let bracket = SingleEliminationGenerator.generate(&entrants).unwrap();
        let mut seen: HashMap<i64, usize> = HashMap::new();

        for node in bracket.matches().iter().filter(|m| m.round == 1) {
            match node.kind {
                MatchKind::Bye { survivor } => *seen.entry(survivor).or_default() += 1,
                MatchKind::Match { home, away } => {
                    for slot in [home, away] {
                        let id = slot.entrant();
                        prop_assert!(id.is_some(), "round one slots hold entrants");
                        if let Some(id) = id {
                            *seen.entry(id).or_default() += 1;
                        }
                    }
                }
            }
        }

        prop_assert_eq!(seen.len(), entrants.len());
        prop_assert!(seen.values().all(|&count| count == 1));
    }

    #[test]
    fn test_single_terminal_and_valid_sources(entrants in entrants_strategy(2, 130)) {
        let bracket = SingleEliminationGenerator.generate(&entrants).unwrap();

        let mut consumed: HashMap<MatchHandle, usize> = HashMap::new();
        for (handle, node) in bracket.iter() {
            for (slot, source) in node.sources() {
                prop_assert!(slot == 1 || slot == 2);
                prop_assert!(source < handle, "sources precede their consumer");
                let source_node = bracket.get(source).unwrap();
                prop_assert!(!source_node.is_bye());
                prop_assert_eq!(source_node.round + 1, node.round);
                *consumed.entry(source).or_default() += 1;
            }
        }

        prop_assert!(consumed.values().all(|&count| count == 1));

        let terminals: Vec<_> = bracket
            .iter()
            .filter(|(handle, node)| !node.is_bye() && !consumed.contains_key(handle))
            .collect();
        prop_assert_eq!(terminals.len(), 1);
        prop_assert_eq!(terminals[0].1.round, bracket.rounds());
    }

    #[test]
    fn test_round_robin_pairs_everyone(entrants in entrants_strategy(2, 40), legs in 1u8..=2) {
        let n = entrants.len();
        let bracket = RoundRobinGenerator::new(legs).generate(&entrants).unwrap();

        prop_assert_eq!(bracket.len(), n * (n - 1) / 2 * legs as usize);
        prop_assert_eq!(bracket.rounds(), 1);

        let uids: BTreeSet<_> = bracket.matches().iter().map(|m| m.uid.clone()).collect();
        prop_assert_eq!(uids.len(), bracket.len());

        let orders: Vec<_> = bracket.matches().iter().map(|m| m.order).collect();
        let expected: Vec<_> = (1..=bracket.len() as u32).collect();
        prop_assert_eq!(orders, expected);

        let mut meetings: HashMap<(i64, i64), usize> = HashMap::new();
        for node in bracket.matches() {
            if let MatchKind::Match { home: Slot::Entrant(a), away: Slot::Entrant(b) } = node.kind {
                prop_assert_ne!(a, b);
                *meetings.entry((a.min(b), a.max(b))).or_default() += 1;
            } else {
                prop_assert!(false, "round robin matches hold two entrants");
            }
        }
        prop_assert_eq!(meetings.len(), n * (n - 1) / 2);
        prop_assert!(meetings.values().all(|&count| count == legs as usize));
    }

    #[test]
    fn test_generation_is_deterministic(entrants in entrants_strategy(2, 64)) {
        prop_assert_eq!(
            SingleEliminationGenerator.generate(&entrants).unwrap(),
            SingleEliminationGenerator.generate(&entrants).unwrap()
        );
    }
}
