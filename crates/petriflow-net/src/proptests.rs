//! Property-based tests for multiset and marking arithmetic

use proptest::prelude::*;
use serde_json::json;

use crate::{Marking, PlaceId, Token, TokenSet};

/// Strategy for token values drawn from a small alphabet, so multiplicities
/// actually collide.
fn token() -> impl Strategy<Value = Token> {
    (0u8..5).prop_map(|n| json!(n))
}

fn tokens(max: usize) -> impl Strategy<Value = Vec<Token>> {
    prop::collection::vec(token(), 0..max)
}

fn place() -> impl Strategy<Value = PlaceId> {
    (0u8..4).prop_map(|n| PlaceId::from(format!("p{n}")))
}

fn marking(max: usize) -> impl Strategy<Value = Marking> {
    prop::collection::vec((place(), token()), 0..max)
        .prop_map(|pairs| pairs.into_iter().collect())
}

proptest! {
    /// Adding then removing a token is the identity.
    #[test]
    fn prop_add_remove_round_trip(values in tokens(20), extra in token()) {
        let original: TokenSet = values.into_iter().collect();
        let mut set = original.clone();

        set.add(extra.clone());
        set.remove_n(&extra, 1).unwrap();

        prop_assert_eq!(set, original);
    }

    /// Multiplicities never go negative: removing more than present fails
    /// and leaves the set untouched.
    #[test]
    fn prop_remove_bounds(values in tokens(20), target in token(), n in 1u32..10) {
        let original: TokenSet = values.into_iter().collect();
        let mut set = original.clone();
        let available = set.multiplicity(&target);

        let result = set.remove_n(&target, available + n);

        prop_assert!(result.is_err());
        prop_assert_eq!(set, original);
    }

    /// `subtract` inverts `merge`.
    #[test]
    fn prop_merge_subtract_inverse(a in marking(12), b in marking(12)) {
        let mut merged = a.clone();
        merged.merge(&b);

        let diff = merged.subtract(&b).unwrap();
        prop_assert_eq!(diff, a);
    }

    /// A marking covers another iff subtraction succeeds.
    #[test]
    fn prop_covers_agrees_with_subtract(a in marking(12), b in marking(12)) {
        prop_assert_eq!(a.covers(&b), a.subtract(&b).is_ok());
    }

    /// Token totals are conserved by merge.
    #[test]
    fn prop_merge_conserves_totals(a in marking(12), b in marking(12)) {
        let mut merged = a.clone();
        merged.merge(&b);
        prop_assert_eq!(merged.total_tokens(), a.total_tokens() + b.total_tokens());
    }

    /// Every selection has exactly the requested size and is drawn from the
    /// set; the enumeration is stable across calls.
    #[test]
    fn prop_selections_are_valid_and_stable(values in tokens(10), n in 0u32..4) {
        let set: TokenSet = values.into_iter().collect();
        let picks = set.selections(n);

        if set.total() >= n {
            prop_assert!(!picks.is_empty());
        }
        for pick in &picks {
            prop_assert_eq!(pick.total(), n);
            prop_assert!(pick.is_subset_of(&set));
        }
        prop_assert_eq!(&picks, &set.selections(n));
    }
}
