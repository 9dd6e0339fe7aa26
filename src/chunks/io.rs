use std::convert::TryFrom;
use std::fmt::{self, Display};
use std::io::{Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

const MODEL_VERSION: u32 = 0;

const MAGIC: [u8; 4] = *b"EmPr";

/// Type identifier of `f32` matrix components.
pub(crate) const F32_TYPE_ID: u32 = 10;

/// Identifiers of the chunks of a model file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ChunkIdentifier {
    Header = 0,
    Metadata = 1,
    CountedVocab = 2,
    NdArray = 3,
}

impl TryFrom<u32> for ChunkIdentifier {
    type Error = Error;

    fn try_from(identifier: u32) -> Result<Self> {
        match identifier {
            1 => Ok(ChunkIdentifier::Metadata),
            2 => Ok(ChunkIdentifier::CountedVocab),
            3 => Ok(ChunkIdentifier::NdArray),
            unknown => Err(Error::Format(format!(
                "Unknown chunk identifier: {}",
                unknown
            ))),
        }
    }
}

impl Display for ChunkIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChunkIdentifier::Header => "Header",
            ChunkIdentifier::Metadata => "Metadata",
            ChunkIdentifier::CountedVocab => "CountedVocab",
            ChunkIdentifier::NdArray => "NdArray",
        };

        f.write_str(name)
    }
}

/// Read the identifier and length that start a chunk.
///
/// Fails if the chunk is not of the `expected` type. Returns the length
/// of the remainder of the chunk.
pub(crate) fn read_chunk_start<R>(read: &mut R, expected: ChunkIdentifier) -> Result<u64>
where
    R: Read,
{
    let identifier = read
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::read_error("Cannot read chunk identifier", e))?;
    let identifier = ChunkIdentifier::try_from(identifier)?;
    if identifier != expected {
        return Err(Error::Format(format!(
            "Expected a {} chunk, got: {}",
            expected, identifier
        )));
    }

    read.read_u64::<LittleEndian>()
        .map_err(|e| Error::read_error(format!("Cannot read {} chunk length", expected), e))
}

/// Write the identifier and length that start a chunk.
pub(crate) fn write_chunk_start<W>(write: &mut W, identifier: ChunkIdentifier, len: u64) -> Result<()>
where
    W: Write,
{
    write
        .write_u32::<LittleEndian>(identifier as u32)
        .map_err(|e| {
            Error::write_error(format!("Cannot write {} chunk identifier", identifier), e)
        })?;
    write
        .write_u64::<LittleEndian>(len)
        .map_err(|e| Error::write_error(format!("Cannot write {} chunk length", identifier), e))
}

pub trait ReadChunk
where
    Self: Sized,
{
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek;
}

pub trait WriteChunk {
    /// Get the identifier of a chunk.
    fn chunk_identifier(&self) -> ChunkIdentifier;

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek;
}

/// Model file header.
///
/// The header consists of the magic `EmPr`, the format version, and the
/// identifiers of the chunks that follow the header.
#[derive(Debug, Eq, PartialEq)]
pub struct Header {
    chunk_identifiers: Vec<ChunkIdentifier>,
}

impl Header {
    pub fn new(chunk_identifiers: impl Into<Vec<ChunkIdentifier>>) -> Self {
        Header {
            chunk_identifiers: chunk_identifiers.into(),
        }
    }

    pub fn chunk_identifiers(&self) -> &[ChunkIdentifier] {
        &self.chunk_identifiers
    }
}

impl WriteChunk for Header {
    fn chunk_identifier(&self) -> ChunkIdentifier {
        ChunkIdentifier::Header
    }

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        write
            .write_all(&MAGIC)
            .map_err(|e| Error::write_error("Cannot write magic", e))?;
        write
            .write_u32::<LittleEndian>(MODEL_VERSION)
            .map_err(|e| Error::write_error("Cannot write model version", e))?;
        write
            .write_u32::<LittleEndian>(self.chunk_identifiers.len() as u32)
            .map_err(|e| Error::write_error("Cannot write number of chunks", e))?;

        self.chunk_identifiers.iter().try_for_each(|&identifier| {
            write
                .write_u32::<LittleEndian>(identifier as u32)
                .map_err(|e| Error::write_error("Cannot write chunk identifier", e))
        })
    }
}

impl ReadChunk for Header {
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        let mut magic = [0u8; 4];
        read.read_exact(&mut magic)
            .map_err(|e| Error::read_error("Cannot read magic", e))?;
        if magic != MAGIC {
            return Err(Error::Format(format!(
                "Not a model file, expected magic 'EmPr', got: '{}'",
                String::from_utf8_lossy(&magic)
            )));
        }

        let version = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read model version", e))?;
        if version != MODEL_VERSION {
            return Err(Error::Format(format!(
                "Unsupported model version: {}",
                version
            )));
        }

        let n_chunks = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read number of chunks", e))?;
        let chunk_identifiers = (0..n_chunks)
            .map(|_| {
                read.read_u32::<LittleEndian>()
                    .map_err(|e| Error::read_error("Cannot read chunk identifier", e))
                    .and_then(ChunkIdentifier::try_from)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Header { chunk_identifiers })
    }
}

#[cfg(test)]
pub(crate) fn read_chunk_size(read: &mut impl Read) -> u64 {
    // Skip identifier.
    read.read_u32::<LittleEndian>().unwrap();

    // Return chunk length.
    read.read_u64::<LittleEndian>().unwrap()
}
