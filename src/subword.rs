//! Subword units of words.

use std::cmp;
use std::hash::{Hash, Hasher};

use fnv::FnvHasher;

/// Begin-of-word marker.
pub const BOW: char = '<';

/// End-of-word marker.
pub const EOW: char = '>';

/// Iterator over n-grams in a sequence.
///
/// N-grams provides an iterator over the n-grams in a sentence between a
/// minimum and maximum length.
///
/// **Warning:** no guarantee is provided with regard to the iteration
/// order. The iterator only guarantees that all n-grams are produced.
pub struct NGrams<'a, T>
where
    T: 'a,
{
    max_n: usize,
    min_n: usize,
    seq: &'a [T],
    ngram: &'a [T],
}

impl<'a, T> NGrams<'a, T> {
    /// Create a new n-ngram iterator.
    ///
    /// The iterator will create n-ngrams of length *[min_n, max_n]*
    pub fn new(seq: &'a [T], min_n: usize, max_n: usize) -> Self {
        assert!(min_n != 0, "The minimum n-gram length cannot be zero.");
        assert!(
            min_n <= max_n,
            "The maximum length should be equal to or greater than the minimum length."
        );

        let upper = cmp::min(max_n, seq.len());

        NGrams {
            min_n,
            max_n,
            seq,
            ngram: &seq[..upper],
        }
    }
}

impl<'a, T> Iterator for NGrams<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        if self.ngram.len() < self.min_n {
            if self.seq.len() <= self.min_n {
                return None;
            }

            self.seq = &self.seq[1..];

            let upper = cmp::min(self.max_n, self.seq.len());
            self.ngram = &self.seq[..upper];
        }

        let ngram = self.ngram;

        self.ngram = &self.ngram[..self.ngram.len() - 1];

        Some(ngram)
    }
}

/// Hashes n-grams into a fixed number of buckets.
///
/// The number of buckets is *2^buckets_exp*. Since a non-perfect hash
/// function is used, multiple n-grams can map to the same bucket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BucketIndexer {
    buckets_exp: usize,
    mask: u64,
}

impl BucketIndexer {
    /// Construct an indexer with *2^buckets_exp* buckets.
    ///
    /// The largest possible bucket exponent is 64.
    pub fn new(buckets_exp: usize) -> Self {
        assert!(
            buckets_exp <= 64,
            "The largest possible buckets exponent is 64."
        );

        let mask = if buckets_exp == 64 {
            !0
        } else {
            (1 << buckets_exp) - 1
        };

        BucketIndexer { buckets_exp, mask }
    }

    pub fn buckets_exp(&self) -> usize {
        self.buckets_exp
    }

    /// The number of buckets.
    pub fn buckets(&self) -> u64 {
        self.mask.wrapping_add(1)
    }

    pub fn index_ngram(&self, ngram: &[char]) -> u64 {
        let mut hasher = FnvHasher::default();
        ngram.hash(&mut hasher);
        hasher.finish() & self.mask
    }
}

/// Extension trait for computing subword indices.
///
/// Subword indexing assigns an identifier to each subword (n-gram) of a
/// string. The string is bracketed with [`BOW`] and [`EOW`] before the
/// n-grams are extracted, so that prefixes and suffixes get their own
/// subwords.
pub trait SubwordIndices {
    /// Return the bucket indices of the subwords of a string.
    ///
    /// The n-grams that are used are of length *[min_n, max_n]*.
    fn subword_indices(&self, min_n: usize, max_n: usize, indexer: &BucketIndexer) -> Vec<u64>;
}

impl SubwordIndices for str {
    fn subword_indices(&self, min_n: usize, max_n: usize, indexer: &BucketIndexer) -> Vec<u64> {
        let mut chars = Vec::with_capacity(self.len() + 2);
        chars.push(BOW);
        chars.extend(self.chars());
        chars.push(EOW);

        let mut indices = Vec::with_capacity((max_n - min_n + 1) * chars.len());
        for ngram in NGrams::new(&chars, min_n, max_n) {
            indices.push(indexer.index_ngram(ngram));
        }

        indices
    }
}
