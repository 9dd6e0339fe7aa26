//! Embedding matrices aligned to a vocabulary.
//!
//! ```
//! use std::collections::HashMap;
//!
//! use maplit::hashmap;
//! use ndarray::arr1;
//!
//! use embedprep::prelude::*;
//!
//! let table: EmbeddingTable = vec![("cat", arr1(&[1., 1.])), ("DOG", arr1(&[2., 2.]))]
//!     .into_iter()
//!     .collect();
//! let vocab: HashMap<String, usize> = hashmap! { "cat".to_owned() => 1, "DOG".to_owned() => 2 };
//!
//! let matrix = MatrixBuilder::new().build(&table, &vocab).unwrap();
//! assert_eq!(matrix.dim(), (3, 2));
//! ```

use std::mem::size_of;

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{Error, Result};
use crate::table::EmbeddingTable;
use crate::vocab::Vocab;

/// How vocabulary tokens are looked up in the embedding table.
///
/// Only the looked up token is lowercased, the keys of the table are
/// used as they are. In `LowercaseOnly` mode a vocabulary token can
/// therefore never match a table key with uppercase characters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lookup {
    /// Look up the token, then the lowercased token.
    ExactThenLowercase,

    /// Only look up the lowercased token.
    LowercaseOnly,
}

impl Default for Lookup {
    fn default() -> Self {
        Lookup::ExactThenLowercase
    }
}

impl Lookup {
    pub(crate) fn find<'a>(
        self,
        table: &'a EmbeddingTable,
        word: &str,
    ) -> Option<ArrayView1<'a, f32>> {
        match self {
            Lookup::ExactThenLowercase => table
                .get(word)
                .or_else(|| table.get(&word.to_lowercase())),
            Lookup::LowercaseOnly => table.get(&word.to_lowercase()),
        }
    }
}

/// Embedding of tokens that are not in the embedding table.
#[derive(Clone, Debug, PartialEq)]
pub enum Unknown {
    /// Leave the embedding zero.
    Zeros,

    /// Use the given embedding.
    Vector(Array1<f32>),
}

impl Default for Unknown {
    fn default() -> Self {
        Unknown::Zeros
    }
}

impl Unknown {
    /// Check that a default vector fits the embedding dimensionality.
    pub(crate) fn check_dims(&self, dims: usize) -> Result<()> {
        match self {
            Unknown::Vector(v) if v.len() != dims => Err(Error::DimensionMismatch {
                word: String::from("<unknown>"),
                expected: dims,
                got: v.len(),
            }),
            _ => Ok(()),
        }
    }

    /// The embedding to store for a token without a match.
    pub(crate) fn vector(&self) -> Option<ArrayView1<f32>> {
        match self {
            Unknown::Zeros => None,
            Unknown::Vector(v) => Some(v.view()),
        }
    }
}

/// Builder for vocabulary-aligned embedding matrices.
///
/// Row *i* of the matrix holds the embedding of the token with
/// identifier *i*. Rows of identifiers without a matching embedding
/// hold the `Unknown` embedding, rows that no token maps to are zero.
#[derive(Clone, Debug, Default)]
pub struct MatrixBuilder {
    rows: Option<usize>,
    lookup: Lookup,
    unknown: Unknown,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        MatrixBuilder::default()
    }

    /// Use a fixed number of rows rather than the vocabulary length.
    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn unknown(mut self, unknown: Unknown) -> Self {
        self.unknown = unknown;
        self
    }

    /// Build the embedding matrix of `vocab`.
    ///
    /// Fails when `table` is empty, since the dimensionality cannot be
    /// inferred.
    pub fn build<V>(&self, table: &EmbeddingTable, vocab: &V) -> Result<Array2<f32>>
    where
        V: Vocab + ?Sized,
    {
        let dims = table
            .dims()
            .or_else(|| table.whitespace().map(|v| v.len()))
            .ok_or(Error::EmptyTable)?;
        self.unknown.check_dims(dims)?;

        let n_rows = self.rows.unwrap_or_else(|| vocab.len());
        n_rows
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(size_of::<f32>()))
            .filter(|&n_bytes| n_bytes <= isize::MAX as usize)
            .ok_or(Error::Overflow)?;
        let mut matrix = Array2::zeros((n_rows, dims));

        let mut n_found = 0;
        for (word, idx) in vocab.iter() {
            if idx >= n_rows {
                return Err(Error::IndexOutOfBounds {
                    word: word.to_owned(),
                    idx,
                    rows: n_rows,
                });
            }

            let embed = match self.lookup.find(table, word) {
                Some(embed) => {
                    n_found += 1;
                    embed
                }
                None => match self.unknown.vector() {
                    Some(embed) => embed,
                    None => continue,
                },
            };

            if embed.len() != dims {
                return Err(Error::DimensionMismatch {
                    word: word.to_owned(),
                    expected: dims,
                    got: embed.len(),
                });
            }

            matrix.row_mut(idx).assign(&embed);
        }

        log::debug!(
            "Built {}x{} embedding matrix, {} tokens have an embedding",
            n_rows,
            dims,
            n_found
        );

        Ok(matrix)
    }
}

/// Build the embedding matrix of `vocab`.
///
/// The matrix has `rows` rows if given, otherwise `vocab.len()`. If
/// `lowercase_only` is set, only lowercased tokens are looked up,
/// otherwise the lowercased token is a fallback. Rows without an
/// embedding are zero.
pub fn embedding_matrix<V>(
    table: &EmbeddingTable,
    vocab: &V,
    rows: Option<usize>,
    lowercase_only: bool,
) -> Result<Array2<f32>>
where
    V: Vocab + ?Sized,
{
    let lookup = if lowercase_only {
        Lookup::LowercaseOnly
    } else {
        Lookup::ExactThenLowercase
    };

    let mut builder = MatrixBuilder::new().lookup(lookup);
    if let Some(rows) = rows {
        builder = builder.rows(rows);
    }

    builder.build(table, vocab)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use maplit::hashmap;
    use ndarray::{arr1, arr2, Array1};

    use super::{embedding_matrix, Lookup, MatrixBuilder, Unknown};
    use crate::error::Error;
    use crate::table::EmbeddingTable;
    use crate::vocab::Vocabulary;

    fn test_table() -> EmbeddingTable {
        vec![("cat", arr1(&[1., 1.])), ("DOG", arr1(&[2., 2.]))]
            .into_iter()
            .collect()
    }

    fn test_vocab() -> HashMap<String, usize> {
        hashmap! {
            "cat".to_owned() => 1,
            "dog".to_owned() => 2,
        }
    }

    #[test]
    fn lowercase_only_does_not_lowercase_table_keys() {
        let matrix = embedding_matrix(&test_table(), &test_vocab(), None, true).unwrap();
        assert_eq!(matrix, arr2(&[[0f32, 0.], [1., 1.], [0., 0.]]));
    }

    #[test]
    fn fallback_matches_exact_or_lowercased_token() {
        let table = test_table();
        let vocab: HashMap<String, usize> = hashmap! {
            "Cat".to_owned() => 1,
            "DOG".to_owned() => 2,
            "bird".to_owned() => 3,
        };
        let matrix = embedding_matrix(&table, &vocab, None, false).unwrap();
        assert_eq!(
            matrix,
            arr2(&[[0f32, 0.], [1., 1.], [2., 2.], [0., 0.]])
        );
    }

    #[test]
    fn lowercase_only_misses_uppercase_vocabulary_exact_match() {
        let table = test_table();
        let vocab: HashMap<String, usize> = hashmap! { "DOG".to_owned() => 1 };
        let matrix = embedding_matrix(&table, &vocab, None, true).unwrap();
        assert_eq!(matrix, arr2(&[[0f32, 0.], [0., 0.]]));
    }

    #[test]
    fn explicit_row_count() {
        let matrix = MatrixBuilder::new()
            .rows(10)
            .build(&test_table(), &test_vocab())
            .unwrap();
        assert_eq!(matrix.dim(), (10, 2));
        assert_eq!(matrix.row(1), arr1(&[1f32, 1.]));
    }

    #[test]
    fn too_few_rows_is_an_error() {
        assert!(matches!(
            MatrixBuilder::new().rows(2).build(&test_table(), &test_vocab()),
            Err(Error::IndexOutOfBounds { idx: 2, .. })
        ));
    }

    #[test]
    fn empty_table_is_an_error() {
        let table: EmbeddingTable = Vec::<(String, Array1<f32>)>::new().into_iter().collect();
        assert!(matches!(
            embedding_matrix(&table, &test_vocab(), None, false),
            Err(Error::EmptyTable)
        ));
    }

    #[test]
    fn unknown_vector_fills_unmatched_tokens() {
        let mut vocab = Vocabulary::default();
        vocab.extend(vec!["cat", "fish"]);
        let matrix = MatrixBuilder::new()
            .lookup(Lookup::LowercaseOnly)
            .unknown(Unknown::Vector(arr1(&[-1., -1.])))
            .build(&test_table(), &vocab)
            .unwrap();
        assert_eq!(matrix, arr2(&[[0f32, 0.], [1., 1.], [-1., -1.]]));
    }

    #[test]
    fn unknown_vector_must_match_dims() {
        assert!(matches!(
            MatrixBuilder::new()
                .unknown(Unknown::Vector(arr1(&[1., 2., 3.])))
                .build(&test_table(), &test_vocab()),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn mixed_dims_cannot_be_stored() {
        let table: EmbeddingTable = vec![("cat", arr1(&[1., 1.])), ("dog", arr1(&[1., 2., 3.]))]
            .into_iter()
            .collect();
        assert!(matches!(
            embedding_matrix(&table, &test_vocab(), None, false),
            Err(Error::DimensionMismatch { got: 3, .. })
        ));
    }

    #[test]
    fn unaddressable_row_count_is_an_error() {
        let vocab: HashMap<String, usize> = hashmap! { "cat".to_owned() => usize::MAX };
        assert!(matches!(
            embedding_matrix(&test_table(), &vocab, None, false),
            Err(Error::Overflow)
        ));
        assert!(matches!(
            MatrixBuilder::new()
                .rows(usize::MAX / 2)
                .build(&test_table(), &test_vocab()),
            Err(Error::Overflow)
        ));
    }
}
