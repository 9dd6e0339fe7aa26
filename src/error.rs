//! Error types.

use std::io;

use ndarray::ShapeError;
use thiserror::Error;

/// `Result` type alias for operations that can fail.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Errors raised while reading, building, training, or querying embeddings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Error reading data.
    #[error("{desc}: {error}")]
    Read {
        desc: String,
        #[source]
        error: io::Error,
    },

    /// Error writing data.
    #[error("{desc}: {error}")]
    Write {
        desc: String,
        #[source]
        error: io::Error,
    },

    /// Invalid file format or malformed data.
    #[error("Invalid format: {0}")]
    Format(String),

    /// The embedding dimensionality cannot be inferred from an empty table.
    #[error("Cannot infer the embedding dimensionality from an empty embedding table")]
    EmptyTable,

    /// A vector does not have the expected number of components.
    #[error("Embedding of '{word}' has {got} components, expected {expected}")]
    DimensionMismatch {
        word: String,
        expected: usize,
        got: usize,
    },

    /// A vocabulary identifier does not address a matrix row.
    #[error("Identifier {idx} of '{word}' is out of bounds for a matrix with {rows} rows")]
    IndexOutOfBounds {
        word: String,
        idx: usize,
        rows: usize,
    },

    /// The word is unknown and has no subword units.
    #[error("Word '{0}' is not in the vocabulary and has no subword units")]
    OutOfVocabulary(String),

    /// A trained model was required.
    #[error("The model has not been trained")]
    NotTrained,

    /// No token of the training corpus survived the minimum count.
    #[error("Training corpus does not contain tokens with a count of at least {min_count}")]
    EmptyCorpus { min_count: u32 },

    /// A capability is not available in this build or environment.
    #[error("{capability} is not available: {reason}")]
    Unavailable { capability: String, reason: String },

    /// The remote embedding service could not be reached or failed.
    #[error("Remote embedding service error: {0}")]
    Remote(String),

    /// `ndarray` shape error.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// Data cannot be represented using the native word size.
    #[error("Data cannot be represented using the native word size")]
    Overflow,
}

impl Error {
    pub fn read_error(desc: impl Into<String>, error: io::Error) -> Self {
        Error::Read {
            desc: desc.into(),
            error,
        }
    }

    pub fn write_error(desc: impl Into<String>, error: io::Error) -> Self {
        Error::Write {
            desc: desc.into(),
            error,
        }
    }

    pub(crate) fn unavailable(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Unavailable {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}
