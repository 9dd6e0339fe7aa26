use std::cmp;

use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use super::config::{ModelType, TrainConfig};
use crate::chunks::vocab::CountedVocab;
use crate::error::{Error, Result};
use crate::subword::{BucketIndexer, SubwordIndices};

/// Exponent of the unigram distribution for negative sampling.
const NEGATIVE_POWER: f64 = 0.75;

/// The learning rate does not decay below this fraction of the initial rate.
const MIN_LR_FRACTION: f32 = 1e-4;

/// Subword embedding model.
///
/// Words are represented by the average of a word embedding and the
/// embeddings of their subwords (character n-grams). Words that were not
/// seen during training are represented by their subwords alone.
///
/// The model is trained with negative sampling, using the skip-gram or
/// CBOW objective. Training mutates the model, so it takes the model
/// by mutable reference.
///
/// ```
/// use embedprep::train::{FastTextModel, TrainConfig};
///
/// let corpus = vec![
///     vec!["the", "cat", "sat", "on", "the", "mat"],
///     vec!["the", "dog", "sat", "on", "the", "log"],
/// ];
///
/// let mut model = FastTextModel::new(TrainConfig {
///     buckets_exp: 10,
///     ..TrainConfig::default()
/// })
/// .unwrap();
/// model.train(&corpus, 10).unwrap();
///
/// assert_eq!(model.vector("cat").unwrap().len(), 5);
/// // Unknown words are represented by their subwords.
/// assert!(model.vector("cats").is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct FastTextModel {
    pub(crate) config: TrainConfig,
    pub(crate) indexer: BucketIndexer,
    pub(crate) vocab: CountedVocab,
    pub(crate) input: Array2<f32>,
    pub(crate) output: Array2<f32>,
    word_rows: Vec<Vec<usize>>,
}

impl FastTextModel {
    /// Construct an untrained model.
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;

        Ok(FastTextModel {
            indexer: BucketIndexer::new(config.buckets_exp as usize),
            config,
            vocab: CountedVocab::default(),
            input: Array2::zeros((0, 0)),
            output: Array2::zeros((0, 0)),
            word_rows: Vec::new(),
        })
    }

    /// Construct a model from trained parameters.
    pub(crate) fn from_parts(
        config: TrainConfig,
        vocab: CountedVocab,
        input: Array2<f32>,
        output: Array2<f32>,
    ) -> Result<Self> {
        config.validate()?;

        let dims = config.dims as usize;
        let n_words = vocab.len();
        if input.dim() != (n_words + config.buckets(), dims) {
            return Err(Error::Format(format!(
                "Input matrix has shape {:?}, expected: {:?}",
                input.dim(),
                (n_words + config.buckets(), dims)
            )));
        }
        if output.dim() != (n_words, dims) {
            return Err(Error::Format(format!(
                "Output matrix has shape {:?}, expected: {:?}",
                output.dim(),
                (n_words, dims)
            )));
        }

        let mut model = FastTextModel::new(config)?;
        model.vocab = vocab;
        model.input = input;
        model.output = output;
        model.word_rows = model.compute_word_rows();

        Ok(model)
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn dims(&self) -> usize {
        self.config.dims as usize
    }

    /// Returns `true` once a vocabulary was built.
    pub fn is_trained(&self) -> bool {
        !self.vocab.is_empty()
    }

    /// Words of the vocabulary, most frequent first.
    pub fn words(&self) -> &[String] {
        self.vocab.words()
    }

    /// Training corpus count of a word.
    pub fn word_count(&self, word: &str) -> Option<u64> {
        self.vocab.idx(word).map(|idx| self.vocab.counts()[idx])
    }

    /// Build the vocabulary and initialize the parameters.
    ///
    /// Any earlier training is discarded.
    pub fn build_vocab<S>(&mut self, corpus: &[Vec<S>]) -> Result<()>
    where
        S: AsRef<str>,
    {
        let vocab = CountedVocab::from_corpus(corpus, self.config.min_count);
        if vocab.is_empty() {
            return Err(Error::EmptyCorpus {
                min_count: self.config.min_count,
            });
        }

        let dims = self.dims();
        let n_words = vocab.len();
        let bound = 1.0 / dims as f32;

        let mut rng = XorShiftRng::seed_from_u64(self.config.seed);
        self.input = Array2::from_shape_fn((n_words + self.config.buckets(), dims), |_| {
            rng.gen_range(-bound..bound)
        });
        self.output = Array2::zeros((n_words, dims));
        self.vocab = vocab;
        self.word_rows = self.compute_word_rows();

        log::info!(
            "Built vocabulary with {} words, {} subword buckets",
            n_words,
            self.config.buckets()
        );

        Ok(())
    }

    /// Build the vocabulary, then train for `epochs` passes over the corpus.
    pub fn train<S>(&mut self, corpus: &[Vec<S>], epochs: usize) -> Result<()>
    where
        S: AsRef<str>,
    {
        self.build_vocab(corpus)?;

        let sentences: Vec<Vec<usize>> = corpus
            .iter()
            .map(|sentence| {
                sentence
                    .iter()
                    .filter_map(|token| self.vocab.idx(token.as_ref()))
                    .collect()
            })
            .collect();
        let n_tokens: usize = sentences.iter().map(Vec::len).sum();
        let total = (n_tokens * epochs) as f32;

        let negatives = WeightedIndex::new(
            self.vocab
                .counts()
                .iter()
                .map(|&count| (count as f64).powf(NEGATIVE_POWER)),
        )
        .map_err(|e| Error::Format(format!("Cannot construct negative sampler: {}", e)))?;
        let keep = keep_probabilities(self.vocab.counts(), self.config.sample);
        let mut rng = XorShiftRng::seed_from_u64(self.config.seed.wrapping_add(1));

        log::info!(
            "Training {:?} model for {} epochs on {} tokens",
            self.config.model,
            epochs,
            n_tokens
        );

        let window = self.config.window as usize;
        let mut processed = 0usize;
        for epoch in 0..epochs {
            let mut loss = 0f32;
            let mut n_examples = 0usize;

            for sentence in &sentences {
                let lr =
                    self.config.lr * (1.0 - processed as f32 / total).max(MIN_LR_FRACTION);
                processed += sentence.len();

                let sentence: Vec<usize> = sentence
                    .iter()
                    .cloned()
                    .filter(|&word| keep[word] >= 1.0 || rng.gen::<f32>() < keep[word])
                    .collect();

                for pos in 0..sentence.len() {
                    let reduced = rng.gen_range(1..=window);
                    let start = pos.saturating_sub(reduced);
                    let end = cmp::min(pos + reduced + 1, sentence.len());
                    let context = (start..end).filter(|&ctx| ctx != pos);

                    match self.config.model {
                        ModelType::SkipGram => {
                            let inputs = self.word_rows[sentence[pos]].clone();
                            for ctx in context {
                                loss += self.update(
                                    &inputs,
                                    sentence[ctx],
                                    lr,
                                    &negatives,
                                    &mut rng,
                                );
                                n_examples += 1;
                            }
                        }
                        ModelType::Cbow => {
                            let inputs: Vec<usize> = context
                                .flat_map(|ctx| self.word_rows[sentence[ctx]].iter().cloned())
                                .collect();
                            if !inputs.is_empty() {
                                loss += self.update(
                                    &inputs,
                                    sentence[pos],
                                    lr,
                                    &negatives,
                                    &mut rng,
                                );
                                n_examples += 1;
                            }
                        }
                    }
                }
            }

            log::debug!(
                "Epoch {}/{}: average loss {:.4}",
                epoch + 1,
                epochs,
                loss / cmp::max(n_examples, 1) as f32
            );
        }

        log::info!("Finished training after {} epochs", epochs);

        Ok(())
    }

    /// Get the embedding of a word.
    ///
    /// Words that were not seen during training are represented by
    /// their subwords. Fails if the word is unknown and has no subwords.
    pub fn vector(&self, word: &str) -> Result<Array1<f32>> {
        if !self.is_trained() {
            return Err(Error::NotTrained);
        }

        let rows = match self.vocab.idx(word) {
            Some(idx) => self.word_rows[idx].clone(),
            None => self.subword_rows(word),
        };

        if rows.is_empty() {
            return Err(Error::OutOfVocabulary(word.to_owned()));
        }

        Ok(self.mean_rows(&rows))
    }

    /// Rows of the input matrix that make up the embedding of each word.
    fn compute_word_rows(&self) -> Vec<Vec<usize>> {
        self.vocab
            .words()
            .iter()
            .enumerate()
            .map(|(idx, word)| {
                let mut rows = vec![idx];
                rows.extend(self.subword_rows(word));
                rows
            })
            .collect()
    }

    fn subword_rows(&self, word: &str) -> Vec<usize> {
        if !self.config.subwords() {
            return Vec::new();
        }

        let n_words = self.vocab.len();
        word.subword_indices(
            self.config.min_n as usize,
            self.config.max_n as usize,
            &self.indexer,
        )
        .into_iter()
        .map(|bucket| n_words + bucket as usize)
        .collect()
    }

    fn mean_rows(&self, rows: &[usize]) -> Array1<f32> {
        let mut embed = Array1::zeros(self.dims());
        for &row in rows {
            embed += &self.input.row(row);
        }
        embed /= rows.len() as f32;
        embed
    }

    /// One step of stochastic gradient descent with negative sampling.
    ///
    /// Returns the loss of the example.
    fn update(
        &mut self,
        inputs: &[usize],
        target: usize,
        lr: f32,
        negatives: &WeightedIndex<f64>,
        rng: &mut XorShiftRng,
    ) -> f32 {
        let hidden = self.mean_rows(inputs);
        let mut grad = Array1::zeros(self.dims());
        let mut loss = 0f32;

        for sample in 0..=self.config.negative {
            let (out_idx, label) = if sample == 0 {
                (target, 1.0)
            } else {
                let negative = negatives.sample(rng);
                if negative == target {
                    continue;
                }
                (negative, 0.0)
            };

            let mut out = self.output.row_mut(out_idx);
            let score = sigmoid(hidden.dot(&out));
            let alpha = lr * (label - score);
            grad.scaled_add(alpha, &out);
            out.scaled_add(alpha, &hidden);

            let prob = if label > 0.5 { score } else { 1.0 - score };
            loss -= prob.max(1e-7).ln();
        }

        for &row in inputs {
            let mut embed = self.input.row_mut(row);
            embed += &grad;
        }

        loss
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Probability of keeping an occurrence of each word during training.
///
/// Words whose relative frequency exceeds `sample` are kept with a
/// probability of *(sqrt(f / t) + 1) * t / f*, where *f* is the word
/// count and *t* is `sample` times the corpus size.
pub(crate) fn keep_probabilities(counts: &[u64], sample: f32) -> Vec<f32> {
    let n_tokens: u64 = counts.iter().sum();
    if sample <= 0.0 || n_tokens == 0 {
        return vec![1.0; counts.len()];
    }

    let threshold = f64::from(sample) * n_tokens as f64;
    counts
        .iter()
        .map(|&count| {
            let count = count as f64;
            (((count / threshold).sqrt() + 1.0) * threshold / count).min(1.0) as f32
        })
        .collect()
}
