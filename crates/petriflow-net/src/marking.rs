//! Markings: token multisets assigned to places

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::PlaceId;
use crate::tokenset::{Token, TokenSet, TokenSetError};

/// Error from marking arithmetic that would drive a place negative
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkingError {
    /// A subtraction or removal asked for more tokens than a place holds
    #[error("not enough tokens in {place}: need {needed}, have {available}")]
    InsufficientTokens {
        place: PlaceId,
        needed: u32,
        available: u32,
    },
}

/// Assignment of token multisets to places
///
/// Places with no tokens carry no entry, so two markings that agree on every
/// populated place are equal. Places iterate in id order, which keeps every
/// derived enumeration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marking {
    places: BTreeMap<PlaceId, TokenSet>,
}

impl Marking {
    /// The empty marking
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no place holds any token
    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Builder-style: this marking with `tokens` added at `place`
    pub fn with(mut self, place: impl Into<PlaceId>, tokens: TokenSet) -> Self {
        self.add_all(place.into(), &tokens);
        self
    }

    /// Builder-style: this marking with one token added at `place`
    pub fn with_token(self, place: impl Into<PlaceId>, token: Token) -> Self {
        self.with(place, TokenSet::single(token))
    }

    /// Add one token at a place
    pub fn put(&mut self, place: impl Into<PlaceId>, token: Token) {
        self.places.entry(place.into()).or_default().add(token);
    }

    /// Add every token of a multiset at a place
    pub fn add_all(&mut self, place: PlaceId, tokens: &TokenSet) {
        if tokens.is_empty() {
            return;
        }
        self.places.entry(place).or_default().merge(tokens);
    }

    /// Remove `count` copies of a token from a place
    pub fn remove(
        &mut self,
        place: &PlaceId,
        token: &Token,
        count: u32,
    ) -> Result<(), MarkingError> {
        let set = self.places.get_mut(place).ok_or_else(|| {
            MarkingError::InsufficientTokens {
                place: place.clone(),
                needed: count,
                available: 0,
            }
        })?;
        set.remove_n(token, count)
            .map_err(|e| insufficient(place, e))?;
        self.drop_if_empty(place);
        Ok(())
    }

    /// Tokens at a place, if any
    pub fn tokens(&self, place: &PlaceId) -> Option<&TokenSet> {
        self.places.get(place)
    }

    /// Total token count at a place
    pub fn multiplicity(&self, place: &PlaceId) -> u32 {
        self.places.get(place).map(TokenSet::total).unwrap_or(0)
    }

    /// Populated places with their token sets, in id order
    pub fn iter(&self) -> impl Iterator<Item = (&PlaceId, &TokenSet)> {
        self.places.iter()
    }

    /// Token count per populated place, in id order
    pub fn multiplicities(&self) -> BTreeMap<PlaceId, u32> {
        self.places
            .iter()
            .map(|(p, set)| (p.clone(), set.total()))
            .collect()
    }

    /// Total token count over all places
    pub fn total_tokens(&self) -> u32 {
        self.places.values().map(TokenSet::total).sum()
    }

    /// Whether `self` holds at least the tokens of `other`, place by place
    pub fn covers(&self, other: &Marking) -> bool {
        other.places.iter().all(|(place, tokens)| {
            self.places
                .get(place)
                .is_some_and(|own| tokens.is_subset_of(own))
        })
    }

    /// Merge every token of `other` into `self`
    pub fn merge(&mut self, other: &Marking) {
        for (place, tokens) in other.iter() {
            self.add_all(place.clone(), tokens);
        }
    }

    /// Marking difference with bounds check
    ///
    /// Fails without partial effect if any place of `other` is not covered.
    pub fn subtract(&self, other: &Marking) -> Result<Marking, MarkingError> {
        let mut result = self.clone();
        for (place, tokens) in other.iter() {
            let own = result.places.get_mut(place).ok_or_else(|| {
                MarkingError::InsufficientTokens {
                    place: place.clone(),
                    needed: tokens.total(),
                    available: 0,
                }
            })?;
            *own = own
                .subtract(tokens)
                .map_err(|e| insufficient(place, e))?;
            result.drop_if_empty(place);
        }
        Ok(result)
    }

    fn drop_if_empty(&mut self, place: &PlaceId) {
        if self.places.get(place).is_some_and(TokenSet::is_empty) {
            self.places.remove(place);
        }
    }
}

fn insufficient(place: &PlaceId, e: TokenSetError) -> MarkingError {
    MarkingError::InsufficientTokens {
        place: place.clone(),
        needed: e.needed,
        available: e.available,
    }
}

impl FromIterator<(PlaceId, Token)> for Marking {
    fn from_iter<I: IntoIterator<Item = (PlaceId, Token)>>(iter: I) -> Self {
        let mut marking = Marking::new();
        for (place, token) in iter {
            marking.put(place, token);
        }
        marking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(id: &str) -> PlaceId {
        PlaceId::from(id)
    }

    #[test]
    fn test_put_and_multiplicity() {
        let mut marking = Marking::new();
        marking.put("a", json!(1));
        marking.put("a", json!(1));
        marking.put("b", json!("x"));

        assert_eq!(marking.multiplicity(&p("a")), 2);
        assert_eq!(marking.multiplicity(&p("b")), 1);
        assert_eq!(marking.multiplicity(&p("c")), 0);
        assert_eq!(marking.total_tokens(), 3);
    }

    #[test]
    fn test_empty_places_leave_no_residue() {
        let mut marking = Marking::new().with_token("a", json!(1));
        marking.remove(&p("a"), &json!(1), 1).unwrap();

        assert!(marking.is_empty());
        assert_eq!(marking, Marking::new());
    }

    #[test]
    fn test_subtract_is_atomic() {
        let marking = Marking::new()
            .with_token("a", json!(1))
            .with_token("b", json!(2));
        let too_much = Marking::new()
            .with_token("a", json!(1))
            .with(
                "b",
                TokenSet::repeated(json!(2), 2),
            );

        assert!(marking.subtract(&too_much).is_err());
        // Original marking untouched by the failed subtraction
        assert_eq!(marking.multiplicity(&p("a")), 1);
    }

    #[test]
    fn test_subtract_and_merge_round_trip() {
        let full = Marking::new()
            .with("a", TokenSet::repeated(json!("t"), 3))
            .with_token("b", json!(null));
        let part = Marking::new().with("a", TokenSet::repeated(json!("t"), 2));

        let mut rest = full.subtract(&part).unwrap();
        assert_eq!(rest.multiplicity(&p("a")), 1);

        rest.merge(&part);
        assert_eq!(rest, full);
    }

    #[test]
    fn test_covers() {
        let marking = Marking::new()
            .with("a", TokenSet::repeated(json!(1), 2))
            .with_token("b", json!(2));

        assert!(marking.covers(&Marking::new().with_token("a", json!(1))));
        assert!(marking.covers(&Marking::new()));
        assert!(!marking.covers(&Marking::new().with_token("c", json!(1))));
        assert!(!marking.covers(&Marking::new().with("a", TokenSet::repeated(json!(1), 3))));
    }

    #[test]
    fn test_multiplicities_projection() {
        let marking = Marking::new()
            .with("b", TokenSet::repeated(json!("x"), 2))
            .with_token("a", json!("y"));

        let mult = marking.multiplicities();
        let entries: Vec<_> = mult.iter().map(|(p, n)| (p.as_str(), *n)).collect();
        assert_eq!(entries, vec![("a", 1), ("b", 2)]);
    }

    #[test]
    fn test_serialization_round_trip() {
        let marking = Marking::new()
            .with_token("orders", json!({"id": 1}))
            .with("stock", TokenSet::repeated(json!("unit"), 4));

        let json = serde_json::to_string(&marking).unwrap();
        let parsed: Marking = serde_json::from_str(&json).unwrap();
        assert_eq!(marking, parsed);
    }
}
