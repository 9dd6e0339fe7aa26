//! A library for preparing word embeddings for neural models.
//!
//! embedprep reads pretrained word embeddings in the word2vec/GloVe text
//! format and turns them into matrices that are aligned to a vocabulary
//! or tensors that are aligned to batches of token identifiers. It also
//! trains subword embeddings and queries hosted contextual embedding
//! services.

pub mod chunks;

pub mod error;

pub mod fill;

pub mod matrix;

pub mod prelude;

pub mod remote;

pub mod subword;

pub mod table;

pub mod text;

pub mod train;

pub(crate) mod util;

pub mod vocab;
