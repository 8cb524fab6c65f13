//! Bounds-checked binary reader.

use crate::format::{
    align_size, ArrayHeader, ChunkHeader, CompressedDataHeader, FileHeader, ObjectHeader,
    ObjectReference, ARRAY_HEADER_SIZE, CHUNK_HEADER_SIZE, COMPRESSED_DATA_HEADER_SIZE,
    FILE_HEADER_SIZE, OBJECT_HEADER_SIZE, OBJECT_REFERENCE_SIZE,
};
use byteorder::{BigEndian, ByteOrder};
use bytemuck::Pod;
use std::path::Path;
use vellum_core::{Error, Result};

/// Cursor over a borrowed buffer.
///
/// Every read checks `position + width <= len` first and fails with
/// [`Error::BufferUnderflow`] otherwise; a failed read leaves the cursor
/// where it was.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        BinaryReader { data, pos: 0 }
    }

    /// Read a whole file into memory.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    /// Underlying buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the cursor is at the end.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Move the cursor to `pos` (at most the buffer length).
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::underflow(pos, self.data.len()));
        }
        self.pos = pos;
        Ok(())
    }

    /// Advance the cursor by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Skip to the next multiple of `alignment`.
    pub fn skip_padding(&mut self, alignment: usize) -> Result<()> {
        let target = align_size(self.pos, alignment);
        self.skip(target - self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::underflow(n, self.remaining()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Read a byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    /// Read a big-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    /// Read a big-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    /// Read a big-endian i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    /// Read an f32 stored in host byte order.
    pub fn read_f32(&mut self) -> Result<f32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(f32::from_ne_bytes(raw))
    }

    /// Read an f64 stored in host byte order.
    pub fn read_f64(&mut self) -> Result<f64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(f64::from_ne_bytes(raw))
    }

    /// Read a u32 length prefix followed by UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos;
        let len = self.read_u32()? as usize;
        let bytes = match self.take(len) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.pos = start;
                return Err(e);
            }
        };
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::InvalidData(format!("string at offset {}: {}", start, e)))
    }

    /// Borrow the next `n` bytes without copying.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Borrow the value at the cursor as `&T` without advancing.
    ///
    /// Fails with `BufferUnderflow` if too few bytes remain and with
    /// `Misaligned` if the address is not aligned for `T`.
    pub fn peek_as<T: Pod>(&self) -> Result<&'a T> {
        let size = std::mem::size_of::<T>();
        if size > self.remaining() {
            return Err(Error::underflow(size, self.remaining()));
        }
        let bytes = &self.data[self.pos..self.pos + size];
        bytemuck::try_from_bytes(bytes).map_err(|_| Error::Misaligned {
            offset: self.pos,
            align: std::mem::align_of::<T>(),
        })
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Read a file header (no magic/version check).
    pub fn read_file_header(&mut self) -> Result<FileHeader> {
        FileHeader::from_bytes(self.take(FILE_HEADER_SIZE)?)
    }

    /// Read an object header.
    pub fn read_object_header(&mut self) -> Result<ObjectHeader> {
        ObjectHeader::from_bytes(self.take(OBJECT_HEADER_SIZE)?)
    }

    /// Read an array header.
    pub fn read_array_header(&mut self) -> Result<ArrayHeader> {
        ArrayHeader::from_bytes(self.take(ARRAY_HEADER_SIZE)?)
    }

    /// Read a chunk header.
    pub fn read_chunk_header(&mut self) -> Result<ChunkHeader> {
        ChunkHeader::from_bytes(self.take(CHUNK_HEADER_SIZE)?)
    }

    /// Read a compressed-data header.
    pub fn read_compressed_header(&mut self) -> Result<CompressedDataHeader> {
        CompressedDataHeader::from_bytes(self.take(COMPRESSED_DATA_HEADER_SIZE)?)
    }

    /// Read an object reference.
    pub fn read_reference(&mut self) -> Result<ObjectReference> {
        ObjectReference::from_bytes(self.take(OBJECT_REFERENCE_SIZE)?)
    }

    /// Read an object header and borrow its payload.
    ///
    /// The cursor is restored if the payload is truncated.
    pub fn read_object(&mut self) -> Result<(ObjectHeader, &'a [u8])> {
        let start = self.pos;
        let header = self.read_object_header()?;
        match self.take(header.data_size as usize) {
            Ok(payload) => Ok((header, payload)),
            Err(e) => {
                self.pos = start;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::BinaryWriter;
    use vellum_core::TypeId;

    #[test]
    fn test_underflow_reports_sizes() {
        let data = [1u8, 2, 3];
        let mut r = BinaryReader::new(&data);
        assert!(matches!(
            r.read_u32(),
            Err(Error::BufferUnderflow {
                needed: 4,
                available: 3
            })
        ));
        // Failed read does not move the cursor
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_u16().unwrap(), 0x0102);
        assert!(r.read_u16().is_err());
        assert_eq!(r.read_u8().unwrap(), 3);
        assert!(r.is_eof());
    }

    #[test]
    fn test_read_bytes_is_zero_copy() {
        let data = vec![9u8; 16];
        let mut r = BinaryReader::new(&data);
        r.skip(4).unwrap();
        let slice = r.read_bytes(8).unwrap();
        assert_eq!(slice.as_ptr(), data[4..].as_ptr());
        assert_eq!(r.remaining(), 4);
    }

    #[test]
    fn test_read_object_truncated_payload() {
        let mut w = BinaryWriter::new();
        w.write_object(TypeId::CIRCLE, 1, &[1, 2, 3, 4]).unwrap();
        let bytes = w.into_inner();
        let mut r = BinaryReader::new(&bytes[..bytes.len() - 1]);
        assert!(matches!(r.read_object(), Err(Error::BufferUnderflow { .. })));
        assert_eq!(r.position(), 0);

        let mut r = BinaryReader::new(&bytes);
        let (header, payload) = r.read_object().unwrap();
        assert_eq!(header.data_size, 4);
        assert_eq!(payload, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_peek_as_bounds_and_alignment() {
        let words: Vec<u32> = vec![0x1122_3344, 7];
        let bytes: &[u8] = bytemuck::cast_slice(&words);
        let mut r = BinaryReader::new(bytes);
        assert_eq!(*r.peek_as::<u32>().unwrap(), 0x1122_3344);
        assert_eq!(r.position(), 0);

        r.seek(1).unwrap();
        assert!(matches!(
            r.peek_as::<u32>(),
            Err(Error::Misaligned { offset: 1, align: 4 })
        ));

        r.seek(6).unwrap();
        assert!(matches!(
            r.peek_as::<u32>(),
            Err(Error::BufferUnderflow { .. })
        ));
    }

    #[test]
    fn test_read_string_rejects_bad_utf8_and_truncation() {
        let mut r = BinaryReader::new(&[0, 0, 0, 2, 0xFF, 0xFE]);
        assert!(matches!(r.read_string(), Err(Error::InvalidData(_))));

        let mut r = BinaryReader::new(&[0, 0, 0, 9, b'a']);
        assert!(r.read_string().is_err());
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_seek_and_padding() {
        let data = [0u8; 10];
        let mut r = BinaryReader::new(&data);
        assert!(r.seek(11).is_err());
        r.seek(3).unwrap();
        r.skip_padding(4).unwrap();
        assert_eq!(r.position(), 4);
        r.seek(9).unwrap();
        assert!(r.skip_padding(8).is_err());
    }
}
