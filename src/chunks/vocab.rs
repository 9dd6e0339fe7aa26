use std::cmp;
use std::collections::{HashMap, HashSet};
use std::convert::TryInto;
use std::io::{Read, Seek, Write};
use std::mem::size_of;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::chunks::io::{
    read_chunk_start, write_chunk_start, ChunkIdentifier, ReadChunk, WriteChunk,
};
use crate::error::{Error, Result};

/// Fixed size of a vocabulary entry: word length (u32) and count (u64).
const ENTRY_SIZE: u64 = (size_of::<u32>() + size_of::<u64>()) as u64;

/// Upper bound on the number of entries allocated before reading them.
const MAX_PREALLOC: usize = 1 << 16;

/// Vocabulary of a trained model, with token counts.
///
/// Words are ordered by decreasing count, ties are ordered by their
/// first occurrence in the training corpus.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CountedVocab {
    indices: HashMap<String, usize>,
    words: Vec<String>,
    counts: Vec<u64>,
}

impl CountedVocab {
    /// Construct a vocabulary from words and their counts.
    ///
    /// Panics when there are duplicate words.
    pub fn new(words: Vec<String>, counts: Vec<u64>) -> Self {
        assert_eq!(
            words.len(),
            counts.len(),
            "every word should have a count."
        );

        let indices: HashMap<String, usize> = words
            .iter()
            .enumerate()
            .map(|(idx, word)| (word.clone(), idx))
            .collect();
        assert_eq!(
            words.len(),
            indices.len(),
            "words contained duplicate entries."
        );

        CountedVocab {
            indices,
            words,
            counts,
        }
    }

    /// Count the tokens of a corpus.
    ///
    /// Tokens that occur fewer than `min_count` times are discarded.
    pub fn from_corpus<S>(corpus: &[Vec<S>], min_count: u32) -> Self
    where
        S: AsRef<str>,
    {
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        let mut counts: Vec<(&str, u64)> = Vec::new();
        for token in corpus.iter().flatten() {
            let token = token.as_ref();
            match first_seen.get(token) {
                Some(&idx) => counts[idx].1 += 1,
                None => {
                    first_seen.insert(token, counts.len());
                    counts.push((token, 1));
                }
            }
        }

        counts.retain(|&(_, count)| count >= u64::from(min_count));
        // Stable sort, ties keep their order of first occurrence.
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        let (words, counts) = counts
            .into_iter()
            .map(|(word, count)| (word.to_owned(), count))
            .unzip();

        CountedVocab::new(words, counts)
    }

    pub fn idx(&self, word: &str) -> Option<usize> {
        self.indices.get(word).cloned()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl ReadChunk for CountedVocab {
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        let chunk_len = read_chunk_start(read, ChunkIdentifier::CountedVocab)?;
        let mut remaining = chunk_len.checked_sub(size_of::<u64>() as u64).ok_or_else(|| {
            Error::Format(format!("Vocabulary chunk is too short: {} bytes", chunk_len))
        })?;

        let vocab_len = read
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read vocabulary length", e))?;
        // Every entry takes at least a length and a count.
        if vocab_len > remaining / ENTRY_SIZE {
            return Err(Error::Format(format!(
                "Vocabulary of {} words does not fit in a chunk of {} bytes",
                vocab_len, chunk_len
            )));
        }
        let vocab_len: usize = vocab_len.try_into().map_err(|_| Error::Overflow)?;

        let capacity = cmp::min(vocab_len, MAX_PREALLOC);
        let mut words = Vec::with_capacity(capacity);
        let mut counts = Vec::with_capacity(capacity);
        for _ in 0..vocab_len {
            let word_len = read
                .read_u32::<LittleEndian>()
                .map_err(|e| Error::read_error("Cannot read word length", e))?
                as u64;
            remaining = remaining
                .checked_sub(ENTRY_SIZE + word_len)
                .ok_or_else(|| {
                    Error::Format(String::from("Vocabulary entry exceeds the chunk length"))
                })?;

            let mut bytes = Vec::new();
            read.by_ref()
                .take(word_len)
                .read_to_end(&mut bytes)
                .map_err(|e| Error::read_error("Cannot read word", e))?;
            if bytes.len() as u64 != word_len {
                return Err(Error::Format(format!(
                    "Word is truncated, expected {} bytes, got: {}",
                    word_len,
                    bytes.len()
                )));
            }
            let word = String::from_utf8(bytes)
                .map_err(|e| Error::Format(format!("Word contains invalid UTF-8: {}", e)))?;
            let count = read
                .read_u64::<LittleEndian>()
                .map_err(|e| Error::read_error("Cannot read word count", e))?;

            words.push(word);
            counts.push(count);
        }

        if words.iter().collect::<HashSet<_>>().len() != words.len() {
            return Err(Error::Format(String::from(
                "Vocabulary contains duplicate words",
            )));
        }

        Ok(CountedVocab::new(words, counts))
    }
}

impl WriteChunk for CountedVocab {
    fn chunk_identifier(&self) -> ChunkIdentifier {
        ChunkIdentifier::CountedVocab
    }

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        // Chunk size: vocabulary size (u64), for each word:
        // word length in bytes (u32), word bytes (variable-length),
        // count (u64).
        let chunk_len = size_of::<u64>()
            + self
                .words
                .iter()
                .map(|w| w.len() + size_of::<u32>() + size_of::<u64>())
                .sum::<usize>();

        write_chunk_start(write, self.chunk_identifier(), chunk_len as u64)?;
        write
            .write_u64::<LittleEndian>(self.words.len() as u64)
            .map_err(|e| Error::write_error("Cannot write vocabulary length", e))?;

        for (word, &count) in self.words.iter().zip(&self.counts) {
            write
                .write_u32::<LittleEndian>(word.len() as u32)
                .map_err(|e| Error::write_error("Cannot write word length", e))?;
            write
                .write_all(word.as_bytes())
                .map_err(|e| Error::write_error("Cannot write word", e))?;
            write
                .write_u64::<LittleEndian>(count)
                .map_err(|e| Error::write_error("Cannot write word count", e))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Seek, SeekFrom, Write};

    use byteorder::{LittleEndian, WriteBytesExt};

    use super::CountedVocab;
    use crate::chunks::io::{
        read_chunk_size, write_chunk_start, ChunkIdentifier, ReadChunk, WriteChunk,
    };
    use crate::error::Error;

    fn test_corpus() -> Vec<Vec<&'static str>> {
        vec![
            vec!["a", "rose", "is", "a", "rose"],
            vec!["is", "a", "flower"],
        ]
    }

    #[test]
    fn counts_and_orders_words() {
        let vocab = CountedVocab::from_corpus(&test_corpus(), 1);
        assert_eq!(vocab.words(), &["a", "rose", "is", "flower"]);
        assert_eq!(vocab.counts(), &[3, 2, 2, 1]);
        assert_eq!(vocab.idx("is"), Some(2));
    }

    #[test]
    fn discards_infrequent_words() {
        let vocab = CountedVocab::from_corpus(&test_corpus(), 2);
        assert_eq!(vocab.words(), &["a", "rose", "is"]);
        assert_eq!(vocab.idx("flower"), None);
    }

    #[test]
    fn counted_vocab_write_read_roundtrip() {
        let check_vocab = CountedVocab::from_corpus(&test_corpus(), 1);
        let mut cursor = Cursor::new(Vec::new());
        check_vocab.write_chunk(&mut cursor).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();
        let vocab = CountedVocab::read_chunk(&mut cursor).unwrap();
        assert_eq!(vocab, check_vocab);
    }

    #[test]
    fn counted_vocab_correct_chunk_size() {
        let check_vocab = CountedVocab::from_corpus(&test_corpus(), 1);
        let mut cursor = Cursor::new(Vec::new());
        check_vocab.write_chunk(&mut cursor).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        let chunk_size = read_chunk_size(&mut cursor);
        assert_eq!(
            cursor.read_to_end(&mut Vec::new()).unwrap(),
            chunk_size as usize
        );
    }

    #[test]
    fn huge_vocabulary_length_is_an_error() {
        let mut cursor = Cursor::new(Vec::new());
        write_chunk_start(&mut cursor, ChunkIdentifier::CountedVocab, 20).unwrap();
        cursor.write_u64::<LittleEndian>(u64::MAX).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        assert!(matches!(
            CountedVocab::read_chunk(&mut cursor),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn lying_chunk_length_is_an_error() {
        // The chunk claims to be huge, but the data ends after one word length.
        let mut cursor = Cursor::new(Vec::new());
        write_chunk_start(&mut cursor, ChunkIdentifier::CountedVocab, u64::MAX).unwrap();
        cursor.write_u64::<LittleEndian>(u64::MAX / 16).unwrap();
        cursor.write_u32::<LittleEndian>(u32::MAX).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        assert!(CountedVocab::read_chunk(&mut cursor).is_err());
    }

    #[test]
    fn word_longer_than_chunk_is_an_error() {
        let mut cursor = Cursor::new(Vec::new());
        write_chunk_start(&mut cursor, ChunkIdentifier::CountedVocab, 8 + 12 + 3).unwrap();
        cursor.write_u64::<LittleEndian>(1).unwrap();
        cursor.write_u32::<LittleEndian>(u32::MAX).unwrap();
        cursor.write_all(b"abc").unwrap();
        cursor.write_u64::<LittleEndian>(1).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        assert!(matches!(
            CountedVocab::read_chunk(&mut cursor),
            Err(Error::Format(_))
        ));
    }
}
