use std::{collections::BTreeMap, fmt::Display};

use super::Token;

/// A multiset of tokens. Multiplicities are always strictly positive; a token
/// whose count drops to zero is removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct MultiSet {
    counts: BTreeMap<Token, usize>,
}

impl MultiSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(token: Token) -> Self {
        let mut ms = Self::new();
        ms.add(token, 1);
        ms
    }

    /// Add `count` copies of `token`. Multiplicities saturate at
    /// `usize::MAX`; use [`MultiSet::try_add`] to detect that.
    pub fn add(&mut self, token: Token, count: usize) {
        if count > 0 {
            let current = self.counts.entry(token).or_insert(0);
            *current = current.saturating_add(count);
        }
    }

    /// Like [`MultiSet::add`], but returns false and leaves `self` untouched
    /// if the multiplicity would overflow.
    pub fn try_add(&mut self, token: Token, count: usize) -> bool {
        match self.count(&token).checked_add(count) {
            Some(_) => {
                self.add(token, count);
                true
            }
            None => false,
        }
    }

    /// Merge another multiset into this one (`++`).
    pub fn extend(&mut self, other: MultiSet) {
        for (token, count) in other.counts {
            self.add(token, count);
        }
    }

    /// Like [`MultiSet::extend`], but returns false and leaves `self`
    /// untouched if some multiplicity would overflow.
    pub fn try_extend(&mut self, other: MultiSet) -> bool {
        if other.counts.iter().any(|(t, c)| self.count(t).checked_add(*c).is_none()) {
            return false;
        }
        self.extend(other);
        true
    }

    pub fn count(&self, token: &Token) -> usize {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Total number of tokens, counting multiplicities.
    pub fn len(&self) -> usize {
        self.counts.values().fold(0, |acc, c| acc.saturating_add(*c))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Distinct tokens with their multiplicities, in token order.
    pub fn iter(&self) -> impl Iterator<Item = (&Token, usize)> {
        self.counts.iter().map(|(t, c)| (t, *c))
    }

    /// Every token repeated according to its multiplicity.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.counts.iter().flat_map(|(t, c)| std::iter::repeat_n(t, *c))
    }

    /// True if every token of `other` is present here at least as often.
    pub fn contains(&self, other: &MultiSet) -> bool {
        other.counts.iter().all(|(t, c)| self.count(t) >= *c)
    }

    /// Remove `other` from this multiset. Returns false and leaves `self`
    /// untouched if `other` is not contained.
    pub fn remove_all(&mut self, other: &MultiSet) -> bool {
        if !self.contains(other) {
            return false;
        }
        for (token, count) in &other.counts {
            if let Some(current) = self.counts.get_mut(token) {
                *current -= count;
                if *current == 0 {
                    self.counts.remove(token);
                }
            }
        }
        true
    }
}

impl FromIterator<Token> for MultiSet {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        let mut ms = MultiSet::new();
        for token in iter {
            ms.add(token, 1);
        }
        ms
    }
}

impl FromIterator<(Token, usize)> for MultiSet {
    fn from_iter<I: IntoIterator<Item = (Token, usize)>>(iter: I) -> Self {
        let mut ms = MultiSet::new();
        for (token, count) in iter {
            ms.add(token, count);
        }
        ms
    }
}

impl Display for MultiSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "empty");
        }
        for (idx, (token, count)) in self.iter().enumerate() {
            if idx == 0 {
                write!(f, "{count}`{token}")?;
            } else {
                write!(f, "++{count}`{token}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> MultiSet {
        values.iter().map(|v| Token::Int(*v)).collect()
    }

    #[test]
    fn counts_multiplicities() {
        let ms = ints(&[1, 1, 2]);
        assert_eq!(ms.count(&Token::Int(1)), 2);
        assert_eq!(ms.len(), 3);
        assert_eq!(ms.to_string(), "2`1++1`2");
    }

    #[test]
    fn remove_all_is_all_or_nothing() {
        let mut ms = ints(&[1, 2]);
        assert!(!ms.remove_all(&ints(&[1, 1])));
        assert_eq!(ms, ints(&[1, 2]));
        assert!(ms.remove_all(&ints(&[1])));
        assert_eq!(ms, ints(&[2]));
        assert_eq!(ms.count(&Token::Int(1)), 0);
    }

    #[test]
    fn multiplicities_never_wrap() {
        let mut ms = MultiSet::new();
        ms.add(Token::Int(1), usize::MAX);
        assert!(!ms.try_add(Token::Int(1), 1));
        assert!(!ms.try_extend(ints(&[1, 2])));
        assert_eq!(ms.count(&Token::Int(2)), 0);
        ms.add(Token::Int(1), 5);
        assert_eq!(ms.count(&Token::Int(1)), usize::MAX);
        assert!(ms.try_add(Token::Int(2), 1));
        assert_eq!(ms.len(), usize::MAX);
    }

    #[test]
    fn empty_displays_as_keyword() {
        assert_eq!(MultiSet::new().to_string(), "empty");
    }
}
