//! Filling token identifier matrices with embeddings.

use ndarray::{s, Array3, ArrayView2};

use crate::error::{Error, Result};
use crate::matrix::Unknown;
use crate::table::EmbeddingTable;
use crate::vocab::Lexicon;

/// Replaces token identifiers by embeddings.
///
/// A matrix of token identifiers with shape *sentences x positions* is
/// turned into a tensor with shape *sentences x positions x dims*. The
/// identifier of each position is resolved to a token using a
/// [`Lexicon`], the token is lowercased and looked up in an
/// [`EmbeddingTable`].
///
/// Identifiers that are zero or negative are padding, their embeddings
/// are always zero. Positive identifiers that are missing from the
/// lexicon or the embedding table receive the `Unknown` embedding.
#[derive(Clone, Debug, Default)]
pub struct TensorFiller {
    unknown: Unknown,
}

impl TensorFiller {
    pub fn new() -> Self {
        TensorFiller::default()
    }

    pub fn unknown(mut self, unknown: Unknown) -> Self {
        self.unknown = unknown;
        self
    }

    /// Fill the embeddings of the identifiers in `ids`.
    pub fn fill<L>(
        &self,
        ids: ArrayView2<i64>,
        lexicon: &L,
        table: &EmbeddingTable,
        dims: usize,
    ) -> Result<Array3<f32>>
    where
        L: Lexicon + ?Sized,
    {
        self.unknown.check_dims(dims)?;

        let (n_sentences, n_positions) = ids.dim();
        let mut tensor = Array3::zeros((n_sentences, n_positions, dims));

        for ((sent, pos), &id) in ids.indexed_iter() {
            if id <= 0 {
                continue;
            }

            let found = lexicon
                .token(id as usize)
                .and_then(|token| table.get(&token.to_lowercase()).map(|embed| (token, embed)));

            let (token, embed) = match found {
                Some(found) => found,
                None => match self.unknown.vector() {
                    Some(embed) => ("<unknown>", embed),
                    None => continue,
                },
            };

            if embed.len() != dims {
                return Err(Error::DimensionMismatch {
                    word: token.to_owned(),
                    expected: dims,
                    got: embed.len(),
                });
            }

            tensor.slice_mut(s![sent, pos, ..]).assign(&embed);
        }

        Ok(tensor)
    }
}

/// Fill the embeddings of the identifiers in `ids`.
///
/// Positions that are padding or that have no embedding are zero.
pub fn fill_embedding_tensor<L>(
    ids: ArrayView2<i64>,
    lexicon: &L,
    table: &EmbeddingTable,
    dims: usize,
) -> Result<Array3<f32>>
where
    L: Lexicon + ?Sized,
{
    TensorFiller::new().fill(ids, lexicon, table, dims)
}
