//! Vocabularies, lexicons, and token filters.
//!
//! The matrix builder reads a vocabulary through the [`Vocab`] trait,
//! the matrix filler resolves identifiers through the [`Lexicon`]
//! trait, and the text parser restricts the tokens that it keeps
//! through the [`TokenFilter`] trait. [`Vocabulary`] implements all
//! three.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::BuildHasher;

/// Vocabulary mapping tokens to matrix row identifiers.
#[allow(clippy::len_without_is_empty)]
pub trait Vocab {
    /// Get the identifier of a token.
    fn idx(&self, word: &str) -> Option<usize>;

    /// Number of rows needed to address every identifier.
    ///
    /// This is the largest identifier plus one, so a reserved padding
    /// identifier 0 is counted. Saturates at `usize::MAX`.
    fn len(&self) -> usize;

    /// Iterate over tokens and their identifiers.
    fn iter(&self) -> Box<dyn Iterator<Item = (&str, usize)> + '_>;
}

/// Lexicon mapping identifiers back to tokens.
pub trait Lexicon {
    /// Get the token of an identifier.
    fn token(&self, idx: usize) -> Option<&str>;
}

/// Restriction on the tokens that are read from an embedding file.
pub trait TokenFilter {
    /// Returns `true` when the token should be kept.
    fn allows(&self, word: &str) -> bool;
}

/// Vocabulary that assigns consecutive identifiers.
///
/// Identifiers start at `start`, identifiers below `start` are
/// reserved. The default vocabulary starts at 1, so that 0 can be used
/// for padding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Vocabulary {
    start: usize,
    indices: HashMap<String, usize>,
    words: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary::new(1)
    }
}

impl Vocabulary {
    /// Construct an empty vocabulary whose first identifier is `start`.
    pub fn new(start: usize) -> Self {
        Vocabulary {
            start,
            indices: HashMap::new(),
            words: Vec::new(),
        }
    }

    /// Add a token, returning its identifier.
    ///
    /// Adding a token that is already in the vocabulary returns its
    /// existing identifier.
    pub fn add(&mut self, word: impl Into<String>) -> usize {
        let word = word.into();
        if let Some(&idx) = self.indices.get(&word) {
            return idx;
        }

        let idx = self.start + self.words.len();
        self.indices.insert(word.clone(), idx);
        self.words.push(word);
        idx
    }

    /// The first identifier that is assigned to a token.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Number of distinct tokens.
    pub fn words_len(&self) -> usize {
        self.words.len()
    }

    /// Tokens in identifier order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Mapping from identifiers to tokens.
    pub fn reverse(&self) -> BTreeMap<usize, &str> {
        self.words
            .iter()
            .enumerate()
            .map(|(offset, word)| (self.start + offset, word.as_str()))
            .collect()
    }
}

impl<S> Extend<S> for Vocabulary
where
    S: Into<String>,
{
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = S>,
    {
        for word in iter {
            self.add(word);
        }
    }
}

impl Vocab for Vocabulary {
    fn idx(&self, word: &str) -> Option<usize> {
        self.indices.get(word).cloned()
    }

    fn len(&self) -> usize {
        self.start.saturating_add(self.words.len())
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&str, usize)> + '_> {
        Box::new(
            self.words
                .iter()
                .enumerate()
                .map(move |(offset, word)| (word.as_str(), self.start + offset)),
        )
    }
}

impl Lexicon for Vocabulary {
    fn token(&self, idx: usize) -> Option<&str> {
        idx.checked_sub(self.start)
            .and_then(|offset| self.words.get(offset))
            .map(String::as_str)
    }
}

impl<H> Vocab for HashMap<String, usize, H>
where
    H: BuildHasher,
{
    fn idx(&self, word: &str) -> Option<usize> {
        self.get(word).cloned()
    }

    fn len(&self) -> usize {
        self.values()
            .max()
            .map(|&idx| idx.saturating_add(1))
            .unwrap_or(0)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&str, usize)> + '_> {
        Box::new(HashMap::iter(self).map(|(word, &idx)| (word.as_str(), idx)))
    }
}

impl Vocab for BTreeMap<String, usize> {
    fn idx(&self, word: &str) -> Option<usize> {
        self.get(word).cloned()
    }

    fn len(&self) -> usize {
        self.values()
            .max()
            .map(|&idx| idx.saturating_add(1))
            .unwrap_or(0)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&str, usize)> + '_> {
        Box::new(BTreeMap::iter(self).map(|(word, &idx)| (word.as_str(), idx)))
    }
}

impl<H> Lexicon for HashMap<usize, String, H>
where
    H: BuildHasher,
{
    fn token(&self, idx: usize) -> Option<&str> {
        self.get(&idx).map(String::as_str)
    }
}

impl Lexicon for BTreeMap<usize, String> {
    fn token(&self, idx: usize) -> Option<&str> {
        self.get(&idx).map(String::as_str)
    }
}

impl<'a> Lexicon for BTreeMap<usize, &'a str> {
    fn token(&self, idx: usize) -> Option<&str> {
        self.get(&idx).cloned()
    }
}

/// Tokens indexed by position.
impl Lexicon for [String] {
    fn token(&self, idx: usize) -> Option<&str> {
        self.get(idx).map(String::as_str)
    }
}

impl Lexicon for Vec<String> {
    fn token(&self, idx: usize) -> Option<&str> {
        self.as_slice().token(idx)
    }
}

impl<H> TokenFilter for HashSet<String, H>
where
    H: BuildHasher,
{
    fn allows(&self, word: &str) -> bool {
        self.contains(word)
    }
}

impl<'a, H> TokenFilter for HashSet<&'a str, H>
where
    H: BuildHasher,
{
    fn allows(&self, word: &str) -> bool {
        self.contains(word)
    }
}

impl TokenFilter for BTreeSet<String> {
    fn allows(&self, word: &str) -> bool {
        self.contains(word)
    }
}

impl TokenFilter for [String] {
    fn allows(&self, word: &str) -> bool {
        self.iter().any(|allowed| allowed == word)
    }
}

impl TokenFilter for Vec<String> {
    fn allows(&self, word: &str) -> bool {
        self.as_slice().allows(word)
    }
}

impl TokenFilter for Vocabulary {
    fn allows(&self, word: &str) -> bool {
        self.indices.contains_key(word)
    }
}

impl<H> TokenFilter for HashMap<String, usize, H>
where
    H: BuildHasher,
{
    fn allows(&self, word: &str) -> bool {
        self.contains_key(word)
    }
}

impl TokenFilter for BTreeMap<String, usize> {
    fn allows(&self, word: &str) -> bool {
        self.contains_key(word)
    }
}
