use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use super::config::TrainConfig;
use super::model::FastTextModel;
use crate::chunks::array::NdArray;
use crate::chunks::io::{ChunkIdentifier, Header, ReadChunk, WriteChunk};
use crate::chunks::metadata::Metadata;
use crate::chunks::vocab::CountedVocab;
use crate::error::{Error, Result};

const MODEL_CHUNKS: [ChunkIdentifier; 4] = [
    ChunkIdentifier::Metadata,
    ChunkIdentifier::CountedVocab,
    ChunkIdentifier::NdArray,
    ChunkIdentifier::NdArray,
];

/// Read a trained model.
pub trait ReadModel
where
    Self: Sized,
{
    fn read_model<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek;
}

/// Write a trained model.
pub trait WriteModel {
    fn write_model<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek;
}

impl ReadModel for FastTextModel {
    fn read_model<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        let header = Header::read_chunk(read)?;
        if header.chunk_identifiers() != &MODEL_CHUNKS[..] {
            return Err(Error::Format(format!(
                "Unexpected chunks in model file: {:?}",
                header.chunk_identifiers()
            )));
        }

        let metadata = Metadata::read_chunk(read)?;
        let config: TrainConfig = metadata.deserialize()?;

        let vocab = CountedVocab::read_chunk(read)?;
        let input = NdArray::read_chunk(read)?;
        let output = NdArray::read_chunk(read)?;

        FastTextModel::from_parts(config, vocab, input.into(), output.into())
    }
}

impl WriteModel for FastTextModel {
    fn write_model<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        if !self.is_trained() {
            return Err(Error::NotTrained);
        }

        Header::new(MODEL_CHUNKS.to_vec()).write_chunk(write)?;
        Metadata::from_serialize(&self.config)?.write_chunk(write)?;
        self.vocab.write_chunk(write)?;
        NdArray::write_ndarray_chunk(self.input.view(), write)?;
        NdArray::write_ndarray_chunk(self.output.view(), write)
    }
}

impl FastTextModel {
    /// Load a trained model from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            Error::read_error(format!("Cannot open model file: {}", path.display()), e)
        })?;

        let model = Self::read_model(&mut BufReader::new(f))?;
        log::info!(
            "Loaded model with {} words from {}",
            model.vocab.len(),
            path.display()
        );

        Ok(model)
    }

    /// Save a trained model to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let f = File::create(path).map_err(|e| {
            Error::write_error(format!("Cannot create model file: {}", path.display()), e)
        })?;

        let mut writer = BufWriter::new(f);
        self.write_model(&mut writer)?;
        writer
            .flush()
            .map_err(|e| Error::write_error("Cannot flush model file", e))?;

        log::info!("Saved model to {}", path.display());

        Ok(())
    }
}
