//! Prelude exports the most commonly-used types and traits.

pub use crate::error::{Error, Result};

pub use crate::fill::{fill_embedding_tensor, TensorFiller};

pub use crate::matrix::{embedding_matrix, Lookup, MatrixBuilder, Unknown};

pub use crate::remote::{Capabilities, ContextualEmbedder, RemoteConfig, RemoteEmbedder};

pub use crate::table::EmbeddingTable;

pub use crate::text::{
    load_embedding_file, load_word_embeddings, ReadText, ReadWordEmbeddings, WriteText,
};

pub use crate::train::{FastTextModel, ModelType, ReadModel, TrainConfig, WriteModel};

pub use crate::vocab::{Lexicon, TokenFilter, Vocab, Vocabulary};
