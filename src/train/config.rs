use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest supported bucket exponent.
const MAX_BUCKETS_EXP: u32 = 30;

/// Training objective.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Predict context words from the focus word.
    SkipGram,

    /// Predict the focus word from its context words.
    Cbow,
}

/// Hyperparameters of the subword embedding trainer.
///
/// The configuration can be read from TOML. Fields that are absent
/// get their default values:
///
/// ```
/// use embedprep::train::{ModelType, TrainConfig};
///
/// let config = TrainConfig::from_toml_str("model = \"cbow\"\ndims = 50").unwrap();
/// assert_eq!(config.model, ModelType::Cbow);
/// assert_eq!(config.dims, 50);
/// assert_eq!(config.window, 3);
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct TrainConfig {
    pub model: ModelType,

    /// Embedding dimensionality.
    pub dims: u32,

    /// Maximum distance between the focus word and a context word.
    pub window: u32,

    /// Words that occur less often are discarded.
    pub min_count: u32,

    /// Negative samples per positive example.
    pub negative: u32,

    /// Initial learning rate, decays linearly to zero.
    pub lr: f32,

    /// Subsampling threshold for frequent words. Occurrences of words
    /// with a relative frequency above the threshold are randomly
    /// discarded during training. Zero disables subsampling.
    pub sample: f32,

    /// Minimum subword length. Zero disables subwords.
    pub min_n: u32,

    /// Maximum subword length.
    pub max_n: u32,

    /// Subwords are hashed into *2^buckets_exp* buckets.
    pub buckets_exp: u32,

    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            model: ModelType::SkipGram,
            dims: 5,
            window: 3,
            min_count: 1,
            negative: 5,
            lr: 0.05,
            sample: 1e-3,
            min_n: 3,
            max_n: 6,
            buckets_exp: 16,
            seed: 42,
        }
    }
}

impl TrainConfig {
    /// Read a configuration from TOML.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: TrainConfig = toml::from_str(toml)
            .map_err(|e| Error::Format(format!("Cannot deserialize training configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns `true` if words are represented by their subwords as well.
    pub fn subwords(&self) -> bool {
        self.min_n != 0
    }

    /// Number of subword buckets.
    pub fn buckets(&self) -> usize {
        if self.subwords() {
            1 << self.buckets_exp
        } else {
            0
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.dims == 0 {
            return Err(Error::Format(String::from(
                "The embedding dimensionality must be positive",
            )));
        }

        if self.window == 0 {
            return Err(Error::Format(String::from(
                "The context window size must be positive",
            )));
        }

        if self.lr.is_nan() || self.lr <= 0.0 {
            return Err(Error::Format(format!(
                "The learning rate must be positive, got: {}",
                self.lr
            )));
        }

        if self.sample.is_nan() || self.sample < 0.0 {
            return Err(Error::Format(format!(
                "The subsampling threshold must not be negative, got: {}",
                self.sample
            )));
        }

        if self.subwords() {
            if self.min_n > self.max_n {
                return Err(Error::Format(format!(
                    "The minimum subword length ({}) exceeds the maximum subword length ({})",
                    self.min_n, self.max_n
                )));
            }

            if self.buckets_exp > MAX_BUCKETS_EXP {
                return Err(Error::Format(format!(
                    "The bucket exponent must be at most {}, got: {}",
                    MAX_BUCKETS_EXP, self.buckets_exp
                )));
            }
        }

        Ok(())
    }
}
