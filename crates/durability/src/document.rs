//! Flat documents.
//!
//! A document is a header followed by the whole object stream, optionally
//! compressed as a single block. It is the simplest layout: built in memory
//! with a [`BinaryWriter`] and read back in one piece.

use crate::codec::{decode_block, encode_block};
use crate::encoding::{BinaryReader, BinaryWriter, ObjectMark};
use crate::format::{FileHeader, ObjectHeader, FILE_HEADER_SIZE};
use crate::validation::{checksum, FormatValidator, ValidationResult};
use bytemuck::Pod;
use std::path::Path;
use tracing::{debug, info};
use vellum_core::{CompressionKind, CompressionLevel, Error, FormatFlags, Result, TypeId};

/// Builder for a flat document.
#[derive(Debug)]
pub struct DocumentWriter {
    writer: BinaryWriter,
    object_count: u32,
    compression: CompressionKind,
    level: CompressionLevel,
    checksum: bool,
}

impl Default for DocumentWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentWriter {
    /// Start an uncompressed document with checksums enabled.
    pub fn new() -> Self {
        let mut writer = BinaryWriter::with_capacity(4096);
        writer.write_file_header(&FileHeader::new());
        DocumentWriter {
            writer,
            object_count: 0,
            compression: CompressionKind::None,
            level: CompressionLevel::Default,
            checksum: true,
        }
    }

    /// Compress the object stream as one block (builder pattern).
    pub fn with_compression(mut self, kind: CompressionKind, level: CompressionLevel) -> Self {
        self.compression = kind;
        self.level = level;
        self
    }

    /// Enable or disable the data-section checksum (builder pattern).
    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    /// Objects written so far.
    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    /// Underlying writer, for payload bytes between `begin_object` and
    /// `end_object`.
    pub fn payload_writer(&mut self) -> &mut BinaryWriter {
        &mut self.writer
    }

    fn count_object(&mut self) -> Result<()> {
        self.object_count = self
            .object_count
            .checked_add(1)
            .ok_or_else(|| Error::InvalidData("document object count overflow".into()))?;
        Ok(())
    }

    /// Append an object.
    pub fn write_object(&mut self, type_id: TypeId, object_id: u32, payload: &[u8]) -> Result<()> {
        self.writer.write_object(type_id, object_id, payload)?;
        self.count_object()
    }

    /// Append an object whose payload is the bytes of `value`.
    pub fn write_pod<T: Pod>(&mut self, type_id: TypeId, object_id: u32, value: &T) -> Result<()> {
        self.write_object(type_id, object_id, bytemuck::bytes_of(value))
    }

    /// Start an object whose payload is written through `payload_writer`.
    pub fn begin_object(&mut self, type_id: TypeId, object_id: u32) -> ObjectMark {
        self.writer.begin_object(type_id, object_id)
    }

    /// Finish an object started with `begin_object`.
    pub fn end_object(&mut self, mark: ObjectMark) -> Result<u32> {
        let size = self.writer.end_object(mark)?;
        self.count_object()?;
        Ok(size)
    }

    /// Produce the final bytes: header patched with counts, size and CRC.
    pub fn finish(self) -> Result<Vec<u8>> {
        let bytes = self.writer.into_inner();
        let objects = &bytes[FILE_HEADER_SIZE..];

        let mut header = FileHeader::new();
        header.object_count = self.object_count;
        header.compression = self.compression.as_u8();

        let mut out = if self.compression.is_compressed() {
            header.flags.insert(FormatFlags::COMPRESSED);
            let block = encode_block(self.compression, self.level, objects)?;
            let mut out = Vec::with_capacity(FILE_HEADER_SIZE + block.len());
            out.extend_from_slice(&[0u8; FILE_HEADER_SIZE]);
            out.extend_from_slice(&block);
            out
        } else {
            bytes
        };

        header.total_size = out.len() as u64;
        if self.checksum {
            header.flags.insert(FormatFlags::CHECKSUM_PRESENT);
            header.checksum = checksum(&out[FILE_HEADER_SIZE..]);
        }
        out[..FILE_HEADER_SIZE].copy_from_slice(&header.to_bytes());

        debug!(
            objects = header.object_count,
            bytes = header.total_size,
            compression = ?self.compression,
            "Document finished"
        );
        Ok(out)
    }

    /// Finish and write to `path`; returns the final header.
    pub fn write_to_file(self, path: impl AsRef<Path>) -> Result<FileHeader> {
        let bytes = self.finish()?;
        std::fs::write(path.as_ref(), &bytes)?;
        FileHeader::from_bytes(&bytes)
    }

    /// Finish, write to `path`, then re-validate the written file.
    ///
    /// Fails with [`Error::Validation`] if the checksum or structure check
    /// of the file on disk reports an error.
    pub fn write_validated(self, path: impl AsRef<Path>) -> Result<FileHeader> {
        let path = path.as_ref();
        let header = self.write_to_file(path)?;
        let validator = FormatValidator::new();
        let mut report = ValidationResult::new();
        report.merge(validator.validate_file_checksum(path));
        report.merge(validator.validate_structure(path));
        report.into_result()?;
        info!(
            path = %path.display(),
            objects = header.object_count,
            "Document written and validated"
        );
        Ok(header)
    }
}

/// A flat document loaded into memory.
#[derive(Debug, Clone)]
pub struct DocumentReader {
    header: FileHeader,
    objects: Vec<u8>,
}

impl DocumentReader {
    /// Parse a document from bytes, decompressing the object stream if needed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = FileHeader::from_bytes(bytes)?;
        header.validate()?;
        if header.is_streaming() {
            return Err(Error::InvalidData(
                "chunked files are read with StreamingReader".into(),
            ));
        }
        if header.is_aligned() {
            return Err(Error::InvalidData(
                "aligned zero-copy files are read with ZeroCopyReader".into(),
            ));
        }

        let start = header.data_offset.max(FILE_HEADER_SIZE as u64) as usize;
        let end = if header.total_size >= start as u64 && header.total_size <= bytes.len() as u64
        {
            header.total_size as usize
        } else {
            bytes.len()
        };
        if start > end {
            return Err(Error::underflow(start, bytes.len()));
        }
        let section = &bytes[start..end];

        let objects = if header.is_compressed() {
            decode_block(section, u32::MAX as usize)?
        } else {
            section.to_vec()
        };
        Ok(DocumentReader { header, objects })
    }

    /// Read and parse a document file.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// File header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Objects declared by the header.
    pub fn object_count(&self) -> u32 {
        self.header.object_count
    }

    /// Decoded object stream.
    pub fn data(&self) -> &[u8] {
        &self.objects
    }

    /// Iterate over `(header, payload)` pairs.
    ///
    /// Yields one `Err` and stops if the stream is truncated.
    pub fn objects(&self) -> Objects<'_> {
        Objects {
            reader: BinaryReader::new(&self.objects),
            failed: false,
        }
    }
}

/// Iterator over the objects of a [`DocumentReader`].
#[derive(Debug, Clone)]
pub struct Objects<'a> {
    reader: BinaryReader<'a>,
    failed: bool,
}

impl<'a> Iterator for Objects<'a> {
    type Item = Result<(ObjectHeader, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_eof() {
            return None;
        }
        match self.reader.read_object() {
            Ok(object) => Some(Ok(object)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_uncompressed() {
        let mut doc = DocumentWriter::new();
        doc.write_object(TypeId::POINT2D, 1, &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();
        doc.write_pod(TypeId::COLOR, 2, &[255u8, 0, 0, 255]).unwrap();
        let bytes = doc.finish().unwrap();

        let reader = DocumentReader::from_bytes(&bytes).unwrap();
        assert_eq!(reader.object_count(), 2);
        assert!(reader.header().flags.contains(FormatFlags::CHECKSUM_PRESENT));
        assert_eq!(reader.header().total_size, bytes.len() as u64);

        let objects: Vec<_> = reader.objects().collect::<Result<_>>().unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].0.type_id, TypeId::POINT2D);
        assert_eq!(objects[1].1, &[255, 0, 0, 255]);
    }

    #[test]
    fn test_roundtrip_compressed() {
        let mut doc = DocumentWriter::new()
            .with_compression(CompressionKind::HighRatio, CompressionLevel::Best);
        for i in 0..50u32 {
            doc.write_object(TypeId::ELLIPSE, i, &[0u8; 64]).unwrap();
        }
        let bytes = doc.finish().unwrap();
        assert!(bytes.len() < FILE_HEADER_SIZE + 50 * 76);

        let reader = DocumentReader::from_bytes(&bytes).unwrap();
        assert!(reader.header().is_compressed());
        assert_eq!(reader.objects().count(), 50);
        assert!(reader.objects().all(|o| o.unwrap().1 == [0u8; 64]));
    }

    #[test]
    fn test_begin_end_object() {
        let mut doc = DocumentWriter::new().with_checksum(false);
        let mark = doc.begin_object(TypeId::DRAWING, 1);
        doc.payload_writer().write_string("root").unwrap();
        doc.payload_writer().write_u32(3);
        assert_eq!(doc.end_object(mark).unwrap(), 12);
        let bytes = doc.finish().unwrap();

        let reader = DocumentReader::from_bytes(&bytes).unwrap();
        assert_eq!(reader.header().checksum, 0);
        let (header, payload) = reader.objects().next().unwrap().unwrap();
        assert_eq!(header.data_size, 12);
        let mut r = BinaryReader::new(payload);
        assert_eq!(r.read_string().unwrap(), "root");
        assert_eq!(r.read_u32().unwrap(), 3);
    }

    #[test]
    fn test_truncated_stream_yields_error() {
        let mut doc = DocumentWriter::new();
        doc.write_object(TypeId::LINE, 1, &[9u8; 16]).unwrap();
        let bytes = doc.finish().unwrap();
        let reader = DocumentReader::from_bytes(&bytes[..bytes.len() - 4]).unwrap();
        let mut objects = reader.objects();
        assert!(objects.next().unwrap().is_err());
        assert!(objects.next().is_none());
    }

    #[test]
    fn test_write_validated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.vgbf");
        let mut doc = DocumentWriter::new();
        doc.write_object(TypeId::GROUP, 1, &[1u8; 8]).unwrap();
        let header = doc.write_validated(&path).unwrap();
        assert_eq!(header.object_count, 1);
        assert_eq!(DocumentReader::read_file(&path).unwrap().object_count(), 1);
    }
}
