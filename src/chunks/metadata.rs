//! Metadata chunks

use std::io::{Read, Seek, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use toml::Value;

use crate::chunks::io::{read_chunk_start, write_chunk_start, ChunkIdentifier, ReadChunk, WriteChunk};
use crate::error::{Error, Result};

/// Model metadata, stored as TOML.
///
/// The trainer stores its configuration in the metadata, so that a
/// model can be read without knowing its hyperparameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata(pub Value);

impl Metadata {
    /// Construct metadata from a serializable value.
    pub fn from_serialize<T>(value: &T) -> Result<Self>
    where
        T: Serialize,
    {
        Value::try_from(value)
            .map(Metadata)
            .map_err(|e| Error::Format(format!("Cannot serialize metadata: {}", e)))
    }

    /// Deserialize the metadata.
    pub fn deserialize<T>(self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.0
            .try_into()
            .map_err(|e| Error::Format(format!("Cannot deserialize metadata: {}", e)))
    }
}

impl ReadChunk for Metadata {
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        let chunk_len = read_chunk_start(read, ChunkIdentifier::Metadata)?;

        let mut toml = String::new();
        let n_read = read
            .take(chunk_len)
            .read_to_string(&mut toml)
            .map_err(|e| Error::read_error("Cannot read TOML metadata", e))?;
        if n_read as u64 != chunk_len {
            return Err(Error::Format(format!(
                "Metadata is truncated, expected {} bytes, got: {}",
                chunk_len, n_read
            )));
        }

        toml.parse::<Value>()
            .map(Metadata)
            .map_err(|e| Error::Format(format!("Cannot parse TOML metadata: {}", e)))
    }
}

impl WriteChunk for Metadata {
    fn chunk_identifier(&self) -> ChunkIdentifier {
        ChunkIdentifier::Metadata
    }

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        let toml = self.0.to_string();

        write_chunk_start(write, self.chunk_identifier(), toml.len() as u64)?;
        write
            .write_all(toml.as_bytes())
            .map_err(|e| Error::write_error("Cannot write TOML metadata", e))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Seek, SeekFrom};

    use super::Metadata;
    use crate::chunks::io::{read_chunk_size, ReadChunk, WriteChunk};
    use crate::train::{ModelType, TrainConfig};

    fn test_config() -> TrainConfig {
        TrainConfig {
            model: ModelType::Cbow,
            dims: 300,
            negative: 10,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn metadata_correct_chunk_size() {
        let check_metadata = Metadata::from_serialize(&test_config()).unwrap();
        let mut cursor = Cursor::new(Vec::new());
        check_metadata.write_chunk(&mut cursor).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        let chunk_size = read_chunk_size(&mut cursor);
        assert_eq!(
            cursor.read_to_end(&mut Vec::new()).unwrap() as u64,
            chunk_size
        );
    }

    #[test]
    fn config_survives_metadata_chunk() {
        let mut cursor = Cursor::new(Vec::new());
        Metadata::from_serialize(&test_config())
            .unwrap()
            .write_chunk(&mut cursor)
            .unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        let config: TrainConfig = Metadata::read_chunk(&mut cursor)
            .unwrap()
            .deserialize()
            .unwrap();
        assert_eq!(config, test_config());
    }

    #[test]
    fn truncated_metadata_is_an_error() {
        let mut cursor = Cursor::new(Vec::new());
        Metadata::from_serialize(&test_config())
            .unwrap()
            .write_chunk(&mut cursor)
            .unwrap();
        let mut data = cursor.into_inner();
        data.truncate(data.len() - 3);

        assert!(Metadata::read_chunk(&mut Cursor::new(data)).is_err());
    }
}
