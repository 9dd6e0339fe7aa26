//! Readers and writers for text embedding files.
//!
//! This module provides two readers:
//!
//! 1. `ReadWordEmbeddings`: tolerant reader for files as they are
//!    distributed by word2vec, GloVe, and fastText. Lines with fewer than
//!    five fields (such as the *vocab_size n_components* header of
//!    word2vec text files) are skipped, a line that starts with a space
//!    holds the embedding of the whitespace token, and tokens can be
//!    restricted with a [`TokenFilter`].
//! 2. `ReadText`: strict reader for files that are known to be clean.
//!    Each line must contain a word followed by its embedding.
//!
//! For example:
//!
//! ```
//! use std::collections::HashSet;
//! use std::io::Cursor;
//!
//! use embedprep::prelude::*;
//!
//! let data = "2 4\nberlin 1 2 3 4\nparis 5 6 7 8\n";
//! let keep: HashSet<String> = vec!["berlin".to_owned()].into_iter().collect();
//!
//! let (table, dims) =
//!     EmbeddingTable::read_word_embeddings_filtered(&mut Cursor::new(data), &keep).unwrap();
//!
//! assert_eq!(dims, Some(4));
//! assert!(table.get("berlin").is_some());
//! assert!(table.get("paris").is_none());
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use itertools::Itertools;
use ndarray::Array1;

use crate::error::{Error, Result};
use crate::table::EmbeddingTable;
use crate::vocab::TokenFilter;

/// Lines with fewer fields are not embeddings.
const MIN_FIELDS: usize = 5;

/// Read an embedding file with the tolerant reader.
///
/// Returns the embeddings and the dimensionality of the first regular
/// embedding that was read. If `filter` is given, only the tokens that
/// it allows are kept; the embedding of the whitespace token is always
/// kept.
pub fn load_word_embeddings(
    path: impl AsRef<Path>,
    filter: Option<&dyn TokenFilter>,
) -> Result<(EmbeddingTable, Option<usize>)> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| {
        Error::read_error(
            format!("Cannot open embedding file {}", path.display()),
            e,
        )
    })?;
    let mut reader = BufReader::new(f);

    let (table, dims) = read_filtered(&mut reader, filter)?;
    log::info!(
        "Read {} embeddings with {} dimensions from {}",
        table.len(),
        dims.map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_owned()),
        path.display()
    );

    Ok((table, dims))
}

/// Read an embedding file with the strict reader.
pub fn load_embedding_file(path: impl AsRef<Path>) -> Result<EmbeddingTable> {
    let path = path.as_ref();
    log::info!("Loading external word embeddings from {}", path.display());

    let f = File::open(path).map_err(|e| {
        Error::read_error(
            format!("Cannot open embedding file {}", path.display()),
            e,
        )
    })?;

    EmbeddingTable::read_text(&mut BufReader::new(f))
}

/// Tolerant reader for embedding files.
///
/// The text contains one word embedding per line in the following
/// format:
///
/// *word0 component_1 component_2 ... component_n*
///
/// Lines with fewer than five fields are skipped. A line that starts with
/// a space character is read as the embedding of the whitespace token,
/// all of its fields are vector components.
///
/// The dimensionality is taken from the first regular embedding and is
/// not checked against the following lines.
pub trait ReadWordEmbeddings<R>
where
    Self: Sized,
    R: BufRead,
{
    /// Read all embeddings.
    fn read_word_embeddings(reader: &mut R) -> Result<(Self, Option<usize>)>;

    /// Read the embeddings of tokens that are allowed by `filter`.
    fn read_word_embeddings_filtered<F>(
        reader: &mut R,
        filter: &F,
    ) -> Result<(Self, Option<usize>)>
    where
        F: TokenFilter + ?Sized;
}

impl<R> ReadWordEmbeddings<R> for EmbeddingTable
where
    R: BufRead,
{
    fn read_word_embeddings(reader: &mut R) -> Result<(Self, Option<usize>)> {
        read_filtered(reader, None)
    }

    fn read_word_embeddings_filtered<F>(
        reader: &mut R,
        filter: &F,
    ) -> Result<(Self, Option<usize>)>
    where
        F: TokenFilter + ?Sized,
    {
        read_filtered(reader, Some(&FilterRef(filter)))
    }
}

/// Unsized filters cannot be turned into trait objects directly.
struct FilterRef<'a, F: ?Sized>(&'a F);

impl<'a, F> TokenFilter for FilterRef<'a, F>
where
    F: TokenFilter + ?Sized,
{
    fn allows(&self, word: &str) -> bool {
        self.0.allows(word)
    }
}

fn read_filtered<R>(
    reader: &mut R,
    filter: Option<&dyn TokenFilter>,
) -> Result<(EmbeddingTable, Option<usize>)>
where
    R: BufRead,
{
    let mut table = EmbeddingTable::default();
    let mut dims = None;
    let mut n_skipped = 0usize;

    let mut line = String::new();
    while read_line(reader, &mut line)? {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < MIN_FIELDS {
            n_skipped += 1;
            continue;
        }

        if line.starts_with(' ') {
            table.set_whitespace(parse_components(&fields)?);
        } else if filter.map(|f| f.allows(fields[0])).unwrap_or(true) {
            let vector = parse_components(&fields[1..])?;
            if dims.is_none() {
                dims = Some(vector.len());
            }
            table.insert(fields[0].to_owned(), vector);
        }
    }

    if n_skipped != 0 {
        log::debug!("Skipped {} lines with fewer than {} fields", n_skipped, MIN_FIELDS);
    }

    Ok((table, dims))
}

/// Strict reader for embedding files.
///
/// The text should contain one word embedding per line in the
/// following format:
///
/// *word0 component_1 component_2 ... component_n*
///
/// Every line is read as an embedding, empty lines are an error.
pub trait ReadText<R>
where
    Self: Sized,
    R: BufRead,
{
    /// Read the embeddings from the given buffered reader.
    fn read_text(reader: &mut R) -> Result<Self>;
}

impl<R> ReadText<R> for EmbeddingTable
where
    R: BufRead,
{
    fn read_text(reader: &mut R) -> Result<Self> {
        let mut table = EmbeddingTable::default();

        let mut line = String::new();
        while read_line(reader, &mut line)? {
            let mut parts = line.split_whitespace();
            let word = parts
                .next()
                .ok_or_else(|| Error::Format(String::from("Spurious empty line")))?;
            let components: Vec<&str> = parts.collect();
            table.insert(word.to_owned(), parse_components(&components)?);
        }

        Ok(table)
    }
}

/// Read the next line into `line`, without the line terminator.
///
/// Returns `false` at the end of the input.
fn read_line<R>(reader: &mut R, line: &mut String) -> Result<bool>
where
    R: BufRead,
{
    let mut buf = Vec::new();
    let n = reader
        .read_until(b'\n', &mut buf)
        .map_err(|e| Error::read_error("Cannot read line from embedding file", e))?;
    if n == 0 {
        return Ok(false);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    *line = String::from_utf8(buf)
        .map_err(|e| Error::Format(format!("Line contains invalid UTF-8: {}", e)))?;

    Ok(true)
}

fn parse_components(fields: &[&str]) -> Result<Array1<f32>> {
    fields
        .iter()
        .map(|field| {
            field.parse::<f32>().map_err(|e| {
                Error::Format(format!("Cannot parse vector component '{}': {}", field, e))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Array1::from)
}

/// Method to write an `EmbeddingTable` to a text file.
///
/// The text will contain one word embedding per line in the following
/// format:
///
/// *word0 component_1 component_2 ... component_n*
///
/// The embedding of the whitespace token is written last, as a line
/// that starts with a space.
pub trait WriteText<W>
where
    W: Write,
{
    /// Write the embeddings to the given writer.
    fn write_text(&self, writer: &mut W) -> Result<()>;
}

impl<W> WriteText<W> for EmbeddingTable
where
    W: Write,
{
    fn write_text(&self, write: &mut W) -> Result<()> {
        for (word, embed) in self.iter() {
            let embed_str = embed.iter().map(ToString::to_string).join(" ");
            writeln!(write, "{} {}", word, embed_str)
                .map_err(|e| Error::write_error("Cannot write word embedding", e))?;
        }

        if let Some(embed) = self.whitespace() {
            let embed_str = embed.iter().map(ToString::to_string).join(" ");
            writeln!(write, " {}", embed_str)
                .map_err(|e| Error::write_error("Cannot write whitespace embedding", e))?;
        }

        Ok(())
    }
}
