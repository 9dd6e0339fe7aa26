//! Token to vector tables.

use std::collections::HashMap;
use std::iter::{FromIterator, Zip};
use std::slice;

use ndarray::{Array1, ArrayView1};

/// The token whose embedding is stored as a separate sentinel.
pub const WHITESPACE_TOKEN: &str = " ";

/// Mapping from tokens to embedding vectors.
///
/// Tokens are kept in insertion order. All regular vectors are expected
/// to have the same number of components. The embedding of the
/// whitespace token is a sentinel that is stored separately, its length
/// may differ from the other vectors.
///
/// A table is built once (by one of the readers or from an iterator)
/// and cannot be modified afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmbeddingTable {
    indices: HashMap<String, usize>,
    words: Vec<String>,
    vectors: Vec<Array1<f32>>,
    whitespace: Option<Array1<f32>>,
    dims: Option<usize>,
}

impl EmbeddingTable {
    /// Get the embedding of a token.
    ///
    /// Looking up the whitespace token returns the sentinel embedding.
    pub fn get(&self, word: &str) -> Option<ArrayView1<f32>> {
        if word == WHITESPACE_TOKEN {
            return self.whitespace();
        }

        self.indices
            .get(word)
            .map(|&idx| self.vectors[idx].view())
    }

    /// Check whether the table contains an embedding for a token.
    pub fn contains(&self, word: &str) -> bool {
        self.get(word).is_some()
    }

    /// Dimensionality of the first regular embedding.
    ///
    /// Returns `None` when the table has no regular embeddings.
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    /// Number of embeddings, including the whitespace sentinel.
    pub fn len(&self) -> usize {
        self.words.len() + self.whitespace.is_some() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The regular tokens in insertion order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// The whitespace sentinel embedding.
    pub fn whitespace(&self) -> Option<ArrayView1<f32>> {
        self.whitespace.as_ref().map(Array1::view)
    }

    /// Iterate over regular tokens and their embeddings.
    ///
    /// The whitespace sentinel is not part of the iteration.
    pub fn iter(&self) -> Iter {
        Iter {
            inner: self.words.iter().zip(self.vectors.iter()),
        }
    }

    /// Add an embedding.
    ///
    /// A later embedding of the same token replaces the earlier one.
    pub(crate) fn insert(&mut self, word: String, vector: Array1<f32>) {
        if word == WHITESPACE_TOKEN {
            self.whitespace = Some(vector);
            return;
        }

        if let Some(&idx) = self.indices.get(&word) {
            log::warn!("Replacing earlier embedding of token '{}'", word);
            self.vectors[idx] = vector;
            return;
        }

        if self.dims.is_none() {
            self.dims = Some(vector.len());
        }

        self.indices.insert(word.clone(), self.words.len());
        self.words.push(word);
        self.vectors.push(vector);
    }

    pub(crate) fn set_whitespace(&mut self, vector: Array1<f32>) {
        self.whitespace = Some(vector);
    }
}

impl<S> FromIterator<(S, Array1<f32>)> for EmbeddingTable
where
    S: Into<String>,
{
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (S, Array1<f32>)>,
    {
        let mut table = EmbeddingTable::default();
        for (word, vector) in iter {
            table.insert(word.into(), vector);
        }
        table
    }
}

impl<'a> IntoIterator for &'a EmbeddingTable {
    type Item = (&'a str, ArrayView1<'a, f32>);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over tokens and embeddings.
pub struct Iter<'a> {
    inner: Zip<slice::Iter<'a, String>, slice::Iter<'a, Array1<f32>>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, ArrayView1<'a, f32>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(word, vector)| (word.as_str(), vector.view()))
    }
}
