//! Token multisets
//!
//! A [`TokenSet`] is a multiset of colored tokens. Tokens are arbitrary JSON
//! values; two tokens are the same color iff their values are equal. The set
//! remembers insertion order, which doubles as the deterministic tie-break
//! everywhere the engine has to choose between interchangeable tokens.

use serde::{Deserialize, Serialize};

/// A colored token. The color is the value itself.
pub type Token = serde_json::Value;

/// Error from a multiset operation that would go below zero
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("insufficient token multiplicity: need {needed}, have {available}")]
pub struct TokenSetError {
    /// Multiplicity the operation required
    pub needed: u32,

    /// Multiplicity actually present
    pub available: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TokenEntry {
    value: Token,
    count: u32,
}

/// An insertion-ordered multiset of tokens
///
/// Token values are not required to be hashable or ordered, so entries are
/// kept as `(value, count)` pairs in first-insertion order. Equality is
/// order-independent; iteration and [`selections`](TokenSet::selections) are
/// not, and that order is part of the crate's determinism contract: replaying
/// the same operations yields the same enumeration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet {
    entries: Vec<TokenEntry>,
}

impl TokenSet {
    /// Create an empty multiset
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a multiset containing a single token
    pub fn single(token: Token) -> Self {
        let mut set = Self::new();
        set.add(token);
        set
    }

    /// Create a multiset with `count` copies of `token`
    pub fn repeated(token: Token, count: u32) -> Self {
        let mut set = Self::new();
        set.add_n(token, count);
        set
    }

    /// Add one copy of a token
    pub fn add(&mut self, token: Token) {
        self.add_n(token, 1);
    }

    /// Add `count` copies of a token
    pub fn add_n(&mut self, token: Token, count: u32) {
        if count == 0 {
            return;
        }
        match self.entries.iter_mut().find(|e| e.value == token) {
            Some(entry) => entry.count += count,
            None => self.entries.push(TokenEntry {
                value: token,
                count,
            }),
        }
    }

    /// Remove `count` copies of a token
    ///
    /// Fails without modifying the set if the token is not present in the
    /// required multiplicity.
    pub fn remove_n(&mut self, token: &Token, count: u32) -> Result<(), TokenSetError> {
        if count == 0 {
            return Ok(());
        }
        let idx = self
            .entries
            .iter()
            .position(|e| &e.value == token)
            .ok_or(TokenSetError {
                needed: count,
                available: 0,
            })?;

        let available = self.entries[idx].count;
        if available < count {
            return Err(TokenSetError {
                needed: count,
                available,
            });
        }
        if available == count {
            self.entries.remove(idx);
        } else {
            self.entries[idx].count -= count;
        }
        Ok(())
    }

    /// Multiplicity of a token value
    pub fn multiplicity(&self, token: &Token) -> u32 {
        self.entries
            .iter()
            .find(|e| &e.value == token)
            .map(|e| e.count)
            .unwrap_or(0)
    }

    /// Total number of tokens, counting multiplicity
    pub fn total(&self) -> u32 {
        self.entries.iter().map(|e| e.count).sum()
    }

    /// Whether the multiset holds no tokens
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct token values with their multiplicities, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Token, u32)> {
        self.entries.iter().map(|e| (&e.value, e.count))
    }

    /// Whether every token of `self` is present in `other` with at least the
    /// same multiplicity
    pub fn is_subset_of(&self, other: &TokenSet) -> bool {
        self.entries
            .iter()
            .all(|e| other.multiplicity(&e.value) >= e.count)
    }

    /// Multiset difference with bounds check
    pub fn subtract(&self, other: &TokenSet) -> Result<TokenSet, TokenSetError> {
        let mut result = self.clone();
        for (value, count) in other.iter() {
            result.remove_n(value, count)?;
        }
        Ok(result)
    }

    /// Add every token of `other` into `self`
    pub fn merge(&mut self, other: &TokenSet) {
        for (value, count) in other.iter() {
            self.add_n(value.clone(), count);
        }
    }

    /// Enumerate every way to draw `n` tokens from this multiset
    ///
    /// Returns the empty vec iff fewer than `n` tokens are present. The
    /// enumeration is deterministic: distinct values are visited in insertion
    /// order and each value contributes as many copies as possible first, so
    /// the first selection is always "the first `n` tokens in insertion
    /// order". Replays depend on this order.
    pub fn selections(&self, n: u32) -> Vec<TokenSet> {
        if self.total() < n {
            return vec![];
        }
        if n == 0 {
            return vec![TokenSet::new()];
        }

        let mut out = Vec::new();
        let mut current = TokenSet::new();
        self.select_rec(0, n, &mut current, &mut out);
        out
    }

    fn select_rec(&self, idx: usize, remaining: u32, current: &mut TokenSet, out: &mut Vec<TokenSet>) {
        if remaining == 0 {
            out.push(current.clone());
            return;
        }
        if idx >= self.entries.len() {
            return;
        }
        // Tokens left in entries idx.. must still be able to cover `remaining`.
        let rest: u32 = self.entries[idx..].iter().map(|e| e.count).sum();
        if rest < remaining {
            return;
        }

        let entry = &self.entries[idx];
        let max_take = entry.count.min(remaining);
        for take in (0..=max_take).rev() {
            if take > 0 {
                current.add_n(entry.value.clone(), take);
            }
            self.select_rec(idx + 1, remaining - take, current, out);
            if take > 0 {
                // The tokens were just added, removal cannot fail.
                let _ = current.remove_n(&entry.value, take);
            }
        }
    }
}

impl PartialEq for TokenSet {
    fn eq(&self, other: &Self) -> bool {
        self.total() == other.total() && self.is_subset_of(other)
    }
}

impl FromIterator<Token> for TokenSet {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        let mut set = TokenSet::new();
        for token in iter {
            set.add(token);
        }
        set
    }
}
