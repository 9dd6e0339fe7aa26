use std::convert::TryInto;
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array2, ArrayView2};

use crate::chunks::io::{
    read_chunk_start, write_chunk_start, ChunkIdentifier, ReadChunk, WriteChunk, F32_TYPE_ID,
};
use crate::error::{Error, Result};
use crate::util::padding;

/// Size of the fields between the chunk length and the padding:
/// rows (u64), columns (u32), and type identifier (u32).
const SHAPE_SIZE: usize = size_of::<u64>() + size_of::<u32>() + size_of::<u32>();

/// Parameter matrix of a trained model.
///
/// The matrix components are aligned to the size of `f32` within the
/// file, so that the data could be memory mapped.
#[derive(Clone, Debug, PartialEq)]
pub struct NdArray {
    inner: Array2<f32>,
}

impl NdArray {
    pub fn new(arr: Array2<f32>) -> Self {
        NdArray { inner: arr }
    }

    pub fn view(&self) -> ArrayView2<f32> {
        self.inner.view()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.inner.dim()
    }

    /// Write a matrix without taking ownership.
    pub(crate) fn write_ndarray_chunk<W>(data: ArrayView2<f32>, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        let start = write.seek(SeekFrom::Current(0)).map_err(|e| {
            Error::write_error("Cannot get file position for computing padding", e)
        })?;
        // Padding is relative to the start of the matrix data.
        let data_start = start + (size_of::<u32>() + size_of::<u64>() + SHAPE_SIZE) as u64;
        let n_padding = padding::<f32>(data_start);
        let chunk_len =
            SHAPE_SIZE as u64 + n_padding + (data.len() * size_of::<f32>()) as u64;

        write_chunk_start(write, ChunkIdentifier::NdArray, chunk_len)?;
        write
            .write_u64::<LittleEndian>(data.nrows() as u64)
            .map_err(|e| Error::write_error("Cannot write number of matrix rows", e))?;
        write
            .write_u32::<LittleEndian>(data.ncols() as u32)
            .map_err(|e| Error::write_error("Cannot write number of matrix columns", e))?;
        write
            .write_u32::<LittleEndian>(F32_TYPE_ID)
            .map_err(|e| Error::write_error("Cannot write matrix type identifier", e))?;
        write
            .write_all(&vec![0; n_padding as usize])
            .map_err(|e| Error::write_error("Cannot write padding", e))?;

        for &component in data.iter() {
            write
                .write_f32::<LittleEndian>(component)
                .map_err(|e| Error::write_error("Cannot write matrix component", e))?;
        }

        Ok(())
    }
}

impl From<Array2<f32>> for NdArray {
    fn from(arr: Array2<f32>) -> Self {
        NdArray::new(arr)
    }
}

impl From<NdArray> for Array2<f32> {
    fn from(arr: NdArray) -> Self {
        arr.inner
    }
}

impl ReadChunk for NdArray {
    fn read_chunk<R>(read: &mut R) -> Result<Self>
    where
        R: Read + Seek,
    {
        let chunk_len = read_chunk_start(read, ChunkIdentifier::NdArray)?;

        let rows: usize = read
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read number of matrix rows", e))?
            .try_into()
            .map_err(|_| Error::Overflow)?;
        let cols = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read number of matrix columns", e))?
            as usize;

        let type_id = read
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::read_error("Cannot read matrix type identifier", e))?;
        if type_id != F32_TYPE_ID {
            return Err(Error::Format(format!(
                "Matrix components should have type f32 ({}), got: {}",
                F32_TYPE_ID, type_id
            )));
        }

        let pos = read.seek(SeekFrom::Current(0)).map_err(|e| {
            Error::read_error("Cannot get file position for computing padding", e)
        })?;
        let n_padding = padding::<f32>(pos);
        read.seek(SeekFrom::Current(n_padding as i64))
            .map_err(|e| Error::read_error("Cannot skip padding", e))?;

        let n_components = rows.checked_mul(cols).ok_or(Error::Overflow)?;
        let data_len = (n_components as u64)
            .checked_mul(size_of::<f32>() as u64)
            .ok_or(Error::Overflow)?;
        let needed = data_len
            .checked_add(SHAPE_SIZE as u64 + n_padding)
            .ok_or(Error::Overflow)?;
        if needed > chunk_len {
            return Err(Error::Format(format!(
                "Matrix of shape ({}, {}) does not fit in a chunk of {} bytes",
                rows, cols, chunk_len
            )));
        }

        // The buffer grows with the data that is actually present.
        let mut bytes = Vec::new();
        read.by_ref()
            .take(data_len)
            .read_to_end(&mut bytes)
            .map_err(|e| Error::read_error("Cannot read matrix components", e))?;
        if bytes.len() as u64 != data_len {
            return Err(Error::Format(format!(
                "Matrix is truncated, expected {} bytes, got: {}",
                data_len,
                bytes.len()
            )));
        }
        let mut data = vec![0f32; n_components];
        LittleEndian::read_f32_into(&bytes, &mut data);

        Ok(NdArray::new(Array2::from_shape_vec((rows, cols), data)?))
    }
}

impl WriteChunk for NdArray {
    fn chunk_identifier(&self) -> ChunkIdentifier {
        ChunkIdentifier::NdArray
    }

    fn write_chunk<W>(&self, write: &mut W) -> Result<()>
    where
        W: Write + Seek,
    {
        Self::write_ndarray_chunk(self.inner.view(), write)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Seek, SeekFrom};

    use byteorder::{LittleEndian, WriteBytesExt};
    use ndarray::Array2;

    use super::{NdArray, SHAPE_SIZE};
    use crate::chunks::io::{
        read_chunk_size, write_chunk_start, ChunkIdentifier, ReadChunk, WriteChunk, F32_TYPE_ID,
    };
    use crate::error::Error;

    fn write_shape(cursor: &mut Cursor<Vec<u8>>, chunk_len: u64, rows: u64, cols: u32) {
        write_chunk_start(cursor, ChunkIdentifier::NdArray, chunk_len).unwrap();
        cursor.write_u64::<LittleEndian>(rows).unwrap();
        cursor.write_u32::<LittleEndian>(cols).unwrap();
        cursor.write_u32::<LittleEndian>(F32_TYPE_ID).unwrap();
    }

    fn test_ndarray() -> NdArray {
        // Shaped like the input matrix of a tiny model.
        NdArray::new(Array2::from_shape_fn((37, 5), |(r, c)| {
            r as f32 - c as f32 / 8.
        }))
    }

    #[test]
    fn ndarray_correct_chunk_size() {
        for offset in 0..8u64 {
            let check_arr = test_ndarray();
            let mut cursor = Cursor::new(Vec::new());
            cursor.seek(SeekFrom::Start(offset)).unwrap();
            check_arr.write_chunk(&mut cursor).unwrap();
            cursor.seek(SeekFrom::Start(offset)).unwrap();

            let chunk_size = read_chunk_size(&mut cursor);
            assert_eq!(
                cursor.read_to_end(&mut Vec::new()).unwrap() as u64,
                chunk_size
            );
        }
    }

    #[test]
    fn components_are_aligned() {
        for offset in 0..4u64 {
            let mut cursor = Cursor::new(Vec::new());
            cursor.seek(SeekFrom::Start(offset)).unwrap();
            test_ndarray().write_chunk(&mut cursor).unwrap();

            let data_len = 37 * 5 * 4;
            assert_eq!((cursor.get_ref().len() - data_len) % 4, 0);
        }
    }

    #[test]
    fn ndarray_write_read_roundtrip() {
        for offset in 0..4u64 {
            let check_arr = test_ndarray();
            let mut cursor = Cursor::new(Vec::new());
            cursor.seek(SeekFrom::Start(offset)).unwrap();
            check_arr.write_chunk(&mut cursor).unwrap();
            cursor.seek(SeekFrom::Start(offset)).unwrap();
            let arr = NdArray::read_chunk(&mut cursor).unwrap();
            assert_eq!(arr.shape(), (37, 5));
            assert_eq!(arr, check_arr);
        }
    }

    #[test]
    fn transposed_view_is_written_in_logical_order() {
        let check = test_ndarray();
        let transposed = check.view().t().to_owned();
        let mut cursor = Cursor::new(Vec::new());
        NdArray::write_ndarray_chunk(check.view().t(), &mut cursor).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(Array2::from(NdArray::read_chunk(&mut cursor).unwrap()), transposed);
    }

    #[test]
    fn overflowing_shape_is_an_error() {
        let mut cursor = Cursor::new(Vec::new());
        write_shape(&mut cursor, u64::MAX, u64::MAX, 5);
        cursor.seek(SeekFrom::Start(0)).unwrap();

        assert!(matches!(
            NdArray::read_chunk(&mut cursor),
            Err(Error::Overflow)
        ));
    }

    #[test]
    fn shape_larger_than_chunk_is_an_error() {
        let mut cursor = Cursor::new(Vec::new());
        write_shape(&mut cursor, SHAPE_SIZE as u64 + 16, 1 << 40, 4);
        cursor.seek(SeekFrom::Start(0)).unwrap();

        assert!(matches!(
            NdArray::read_chunk(&mut cursor),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn truncated_components_are_an_error() {
        // The chunk length is consistent, but the data stops early.
        let mut cursor = Cursor::new(Vec::new());
        write_shape(&mut cursor, u64::MAX, 1 << 40, 4);
        cursor.write_f32::<LittleEndian>(1.).unwrap();
        cursor.seek(SeekFrom::Start(0)).unwrap();

        assert!(matches!(
            NdArray::read_chunk(&mut cursor),
            Err(Error::Format(_))
        ));
    }
}
