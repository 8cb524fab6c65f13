//! Zero-copy reader.

use super::region::cast_error;
use super::writer::payload_offset;
use crate::format::{FileHeader, ObjectHeader, FILE_HEADER_SIZE, OBJECT_HEADER_SIZE};
use bytemuck::Pod;
use std::mem::{align_of, size_of};
use vellum_core::{Error, Result};

/// Borrows typed values directly out of a byte buffer.
///
/// Offsets are relative to the start of `data`, which must be at least
/// 8-byte aligned for alignment checks to be meaningful.
#[derive(Debug, Clone)]
pub struct ZeroCopyReader<'a> {
    data: &'a [u8],
    header: FileHeader,
    pos: usize,
}

impl<'a> ZeroCopyReader<'a> {
    /// Validate the header and position the cursor at the data section.
    ///
    /// The readable range ends at `total_size`.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = FileHeader::from_bytes(data)?;
        header.validate()?;

        let total = usize::try_from(header.total_size)
            .map_err(|_| Error::structure("total_size exceeds address space"))?;
        if total > data.len() {
            return Err(Error::structure(format!(
                "total_size {} exceeds buffer length {}",
                total,
                data.len()
            )));
        }
        let start = usize::try_from(header.data_offset)
            .map_err(|_| Error::structure("data_offset exceeds address space"))?
            .max(FILE_HEADER_SIZE);
        if start > total {
            return Err(Error::structure(format!(
                "data offset {} is past total_size {}",
                start, total
            )));
        }

        Ok(ZeroCopyReader {
            data: &data[..total],
            header,
            pos: start,
        })
    }

    /// Validated header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Current offset.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Bytes left before `total_size`.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the cursor is at the end.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Move the cursor to `pos`.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::underflow(pos, self.data.len()));
        }
        self.pos = pos;
        Ok(())
    }

    /// Advance the cursor by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::underflow(n, self.remaining()));
        }
        self.pos += n;
        Ok(())
    }

    /// Typed view at `offset` without moving the cursor.
    pub fn get<T: Pod>(&self, offset: usize) -> Result<&'a T> {
        let bytes = self.span(offset, size_of::<T>())?;
        bytemuck::try_from_bytes(bytes).map_err(|e| cast_error(e, offset, align_of::<T>()))
    }

    /// Read one `T` at the next multiple of its alignment.
    pub fn read<T: Pod>(&mut self) -> Result<&'a T> {
        let offset = self.aligned(align_of::<T>())?;
        let value = self.get::<T>(offset)?;
        self.pos = offset + size_of::<T>();
        Ok(value)
    }

    /// Read `count` contiguous `T`s at the next multiple of their alignment.
    pub fn read_array<T: Pod>(&mut self, count: usize) -> Result<&'a [T]> {
        let offset = self.aligned(align_of::<T>())?;
        let len = count
            .checked_mul(size_of::<T>())
            .ok_or_else(|| Error::underflow(usize::MAX, self.remaining()))?;
        let bytes = self.span(offset, len)?;
        let values =
            bytemuck::try_cast_slice(bytes).map_err(|e| cast_error(e, offset, align_of::<T>()))?;
        self.pos = offset + len;
        Ok(values)
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.span(self.pos, n)?;
        self.pos += n;
        Ok(bytes)
    }

    /// Read an object written by `ZeroCopyWriter::write_object`.
    ///
    /// Fails with `StructureMismatch` when the stored size differs from
    /// `size_of::<T>()`.
    pub fn read_object<T: Pod>(&mut self) -> Result<(ObjectHeader, &'a T)> {
        let payload_at = payload_offset(self.pos, align_of::<T>().max(4));
        let header_at = payload_at - OBJECT_HEADER_SIZE;
        let header = ObjectHeader::from_bytes(self.span(header_at, OBJECT_HEADER_SIZE)?)?;
        if header.data_size as usize != size_of::<T>() {
            return Err(Error::structure(format!(
                "object {} holds {} bytes, expected {}",
                header.object_id,
                header.data_size,
                size_of::<T>()
            )));
        }
        let value = self.get::<T>(payload_at)?;
        self.pos = payload_at + size_of::<T>();
        Ok((header, value))
    }

    fn aligned(&self, align: usize) -> Result<usize> {
        let offset = (self.pos + align - 1) & !(align - 1);
        if offset > self.data.len() {
            return Err(Error::underflow(offset - self.pos, self.remaining()));
        }
        Ok(offset)
    }

    fn span(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.saturating_add(len);
        if end > self.data.len() {
            return Err(Error::underflow(
                len,
                self.data.len().saturating_sub(offset),
            ));
        }
        Ok(&self.data[offset..end])
    }
}
