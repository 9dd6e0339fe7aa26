//! Subword embedding training.
//!
//! [`FastTextModel`] trains word embeddings that are enriched with
//! subword information, so that embeddings can also be computed for
//! words that were not seen during training. Trained models can be
//! saved to and loaded from files.

mod config;
pub use self::config::{ModelType, TrainConfig};

mod io;
pub use self::io::{ReadModel, WriteModel};

mod model;
pub use self::model::FastTextModel;
