//! Header, object and structural validation.
//!
//! The structural walker reads only framing records. Payloads are skipped by
//! seeking, and every length is checked against the bytes that remain before
//! anything is read, so a corrupted `data_size` cannot cause an over-read.

use super::checksum::data_section_checksum;
use super::ValidationResult;
use crate::codec::decode_block;
use crate::format::{
    ChunkHeader, FileHeader, ObjectHeader, CHUNK_HEADER_SIZE, CURRENT_VERSION, FILE_HEADER_SIZE,
    MAGIC, OBJECT_HEADER_SIZE,
};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;
use vellum_core::{CompressionKind, Error, ErrorKind, TypeId, LARGE_OBJECT_THRESHOLD};

/// Largest block the walker will decompress while validating
const MAX_VALIDATION_BLOCK: usize = u32::MAX as usize;

/// Result of walking one object region.
#[derive(Debug, Clone, Copy)]
struct Walk {
    objects: u64,
    /// Offset just past the last complete object
    consumed: u64,
    /// False when the walk stopped on an error
    complete: bool,
}

/// Validator for headers, checksums and object structure.
#[derive(Debug, Clone)]
pub struct FormatValidator {
    large_object_threshold: u64,
}

impl Default for FormatValidator {
    fn default() -> Self {
        FormatValidator {
            large_object_threshold: LARGE_OBJECT_THRESHOLD,
        }
    }
}

impl FormatValidator {
    /// Create a validator with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size above which objects are reported as unusually large.
    pub fn with_large_object_threshold(mut self, bytes: u64) -> Self {
        self.large_object_threshold = bytes;
        self
    }

    /// Check every header field that can be checked without the data.
    pub fn validate_header(&self, header: &FileHeader) -> ValidationResult {
        let mut result = ValidationResult::new();

        if header.magic != MAGIC {
            result.add_error(
                ErrorKind::InvalidMagic,
                format!("Invalid magic number: 0x{:08X}", header.magic),
            );
        }

        if header.version.major > CURRENT_VERSION.major {
            result.add_error(
                ErrorKind::UnsupportedVersion,
                format!(
                    "Unsupported version {} (current {})",
                    header.version, CURRENT_VERSION
                ),
            );
        } else if header.version.major == CURRENT_VERSION.major
            && header.version.minor > CURRENT_VERSION.minor
        {
            result.add_warning(format!(
                "File version {} is newer than current {}",
                header.version, CURRENT_VERSION
            ));
        }

        if header.data_offset < FILE_HEADER_SIZE as u64 {
            result.add_error(
                ErrorKind::InvalidData,
                format!(
                    "Data offset {} is inside the {}-byte header",
                    header.data_offset, FILE_HEADER_SIZE
                ),
            );
        }

        if header.object_count > 0 && header.total_size <= header.data_offset {
            result.add_error(
                ErrorKind::StructureMismatch,
                format!(
                    "Header declares {} objects but total size {} leaves no data after offset {}",
                    header.object_count, header.total_size, header.data_offset
                ),
            );
        }

        match header.compression_kind() {
            None => result.add_error(
                ErrorKind::UnknownCompression,
                format!("Unknown compression kind: {}", header.compression),
            ),
            Some(CompressionKind::None) if header.is_compressed() => {
                result.add_warning("Compressed flag set but compression kind is None")
            }
            Some(_) => {}
        }

        result
    }

    /// Check one object header against the bytes available for its payload.
    pub fn validate_object_header(
        &self,
        header: &ObjectHeader,
        available: u64,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();

        if !header.type_id.is_known_range() {
            result.add_error(
                ErrorKind::InvalidData,
                format!("Invalid type id {}", header.type_id.as_u8()),
            );
        }

        if header.data_size == 0 && header.type_id != TypeId::NONE {
            result.add_warning(format!(
                "Zero-size object {} of type {}",
                header.object_id, header.type_id
            ));
        }

        let size = header.data_size as u64;
        if size > available {
            result.add_error(
                ErrorKind::StructureMismatch,
                format!(
                    "Object {} declares {} bytes but only {} remain",
                    header.object_id, size, available
                ),
            );
        }

        if size > self.large_object_threshold {
            result.add_warning(format!(
                "Unusually large object {}: {} bytes",
                header.object_id, size
            ));
        }

        result
    }

    /// Recompute the data-section CRC of the file at `path`.
    pub fn validate_file_checksum(&self, path: impl AsRef<Path>) -> ValidationResult {
        match File::open(path.as_ref()) {
            Ok(file) => self.validate_checksum_from(&mut BufReader::new(file)),
            Err(e) => io_failure(&e),
        }
    }

    /// Recompute the data-section CRC of `reader` and compare it to the header.
    ///
    /// A stored checksum of zero means "not present" and is never compared.
    pub fn validate_checksum_from<R: Read + Seek>(&self, reader: &mut R) -> ValidationResult {
        let mut result = ValidationResult::new();
        let header = match read_header(reader) {
            Ok(header) => header,
            Err(e) => {
                result.add_failure(&e);
                return result;
            }
        };

        if !header.has_checksum() {
            result.add_warning("No checksum present");
            return result;
        }

        match data_section_checksum(reader, header.data_offset) {
            Ok(actual) if actual == header.checksum => {}
            Ok(actual) => result.add_failure(&Error::ChecksumMismatch {
                expected: header.checksum,
                actual,
            }),
            Err(e) => result.add_failure(&Error::Io(e)),
        }
        result
    }

    /// Walk the object structure of the file at `path`.
    pub fn validate_structure(&self, path: impl AsRef<Path>) -> ValidationResult {
        match File::open(path.as_ref()) {
            Ok(file) => self.validate_structure_from(&mut BufReader::new(file)),
            Err(e) => io_failure(&e),
        }
    }

    /// Walk the object structure of `reader` using framing records only.
    ///
    /// Handles flat, flat-compressed and chunked layouts; aligned zero-copy
    /// layouts get a warning and are not walked. An object-count
    /// mismatch is an error; a consumed length that differs from
    /// `total_size` is only a warning because trailing padding is legal.
    pub fn validate_structure_from<R: Read + Seek>(&self, reader: &mut R) -> ValidationResult {
        let mut result = ValidationResult::new();
        let header = match read_header(reader) {
            Ok(header) => header,
            Err(e) => {
                result.add_failure(&e);
                return result;
            }
        };

        result.merge(self.validate_header(&header));
        if result.has_error(ErrorKind::InvalidMagic)
            || result.has_error(ErrorKind::UnsupportedVersion)
        {
            return result;
        }

        let file_len = match reader.seek(SeekFrom::End(0)) {
            Ok(len) => len,
            Err(e) => {
                result.add_failure(&Error::Io(e));
                return result;
            }
        };

        let start = header.data_offset.max(FILE_HEADER_SIZE as u64);
        let mut end = file_len;
        if header.total_size > file_len {
            result.add_error(
                ErrorKind::StructureMismatch,
                format!(
                    "Total size {} exceeds file length {}",
                    header.total_size, file_len
                ),
            );
        } else if header.total_size >= start {
            end = header.total_size;
        }
        if start > end {
            result.add_error(
                ErrorKind::StructureMismatch,
                format!("Data offset {} is past the end of the data ({})", start, end),
            );
            return result;
        }

        if header.is_aligned() {
            result.add_warning("Aligned zero-copy layout: object framing not walked");
            return result;
        }

        let walk = if header.is_streaming() {
            self.walk_chunks(reader, start, end, &mut result)
        } else if header.is_compressed() {
            self.walk_compressed(reader, start, end, &mut result)
        } else {
            self.walk_stream(reader, start, end, &mut result)
        };

        if walk.objects != header.object_count as u64 {
            result.add_error(
                ErrorKind::StructureMismatch,
                format!(
                    "Found {} objects, header declares {}",
                    walk.objects, header.object_count
                ),
            );
        }
        if walk.complete && walk.consumed != header.total_size {
            result.add_warning(format!(
                "Consumed {} bytes, header declares total size {}",
                walk.consumed, header.total_size
            ));
        }

        debug!(
            objects = walk.objects,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "Structure validation finished"
        );
        result
    }

    /// Walk objects in `[start, end)` of a seekable source.
    fn walk_stream<R: Read + Seek>(
        &self,
        reader: &mut R,
        start: u64,
        end: u64,
        result: &mut ValidationResult,
    ) -> Walk {
        let mut walk = Walk {
            objects: 0,
            consumed: start,
            complete: true,
        };
        let mut pos = start;
        let mut raw = [0u8; OBJECT_HEADER_SIZE];
        while end - pos >= OBJECT_HEADER_SIZE as u64 {
            if let Err(e) = reader
                .seek(SeekFrom::Start(pos))
                .and_then(|_| reader.read_exact(&mut raw))
            {
                result.add_failure(&Error::Io(e));
                walk.complete = false;
                break;
            }
            let header = match ObjectHeader::from_bytes(&raw) {
                Ok(header) => header,
                Err(e) => {
                    result.add_failure(&e);
                    walk.complete = false;
                    break;
                }
            };
            let available = end - pos - OBJECT_HEADER_SIZE as u64;
            result.merge(self.validate_object_header(&header, available));
            if header.data_size as u64 > available {
                walk.complete = false;
                break;
            }
            pos += OBJECT_HEADER_SIZE as u64 + header.data_size as u64;
            walk.objects += 1;
            walk.consumed = pos;
        }
        walk
    }

    /// Walk objects in an in-memory region.
    fn walk_slice(&self, data: &[u8], result: &mut ValidationResult) -> Walk {
        let mut walk = Walk {
            objects: 0,
            consumed: 0,
            complete: true,
        };
        let mut pos = 0usize;
        while data.len() - pos >= OBJECT_HEADER_SIZE {
            let header = match ObjectHeader::from_bytes(&data[pos..]) {
                Ok(header) => header,
                Err(e) => {
                    result.add_failure(&e);
                    walk.complete = false;
                    break;
                }
            };
            let available = (data.len() - pos - OBJECT_HEADER_SIZE) as u64;
            result.merge(self.validate_object_header(&header, available));
            if header.data_size as u64 > available {
                walk.complete = false;
                break;
            }
            pos += header.record_len();
            walk.objects += 1;
            walk.consumed = pos as u64;
        }
        walk
    }

    /// Walk a flat layout whose data section is one compressed block.
    fn walk_compressed<R: Read + Seek>(
        &self,
        reader: &mut R,
        start: u64,
        end: u64,
        result: &mut ValidationResult,
    ) -> Walk {
        let failed = Walk {
            objects: 0,
            consumed: start,
            complete: false,
        };
        let block = match read_range(reader, start, end) {
            Ok(block) => block,
            Err(e) => {
                result.add_failure(&e);
                return failed;
            }
        };
        let data = match decode_block(&block, MAX_VALIDATION_BLOCK) {
            Ok(data) => data,
            Err(e) => {
                result.add_failure(&e);
                return failed;
            }
        };
        let inner = self.walk_slice(&data, result);
        if inner.complete && inner.consumed != data.len() as u64 {
            result.add_warning(format!(
                "{} trailing bytes after the last object",
                data.len() as u64 - inner.consumed
            ));
        }
        Walk {
            objects: inner.objects,
            consumed: end,
            complete: inner.complete,
        }
    }

    /// Walk a chunked layout, checking each chunk's object count.
    fn walk_chunks<R: Read + Seek>(
        &self,
        reader: &mut R,
        start: u64,
        end: u64,
        result: &mut ValidationResult,
    ) -> Walk {
        let mut walk = Walk {
            objects: 0,
            consumed: start,
            complete: true,
        };
        let mut pos = start;
        let mut index = 0u64;
        while end - pos >= CHUNK_HEADER_SIZE as u64 {
            let chunk = match read_range(reader, pos, pos + CHUNK_HEADER_SIZE as u64)
                .and_then(|raw| ChunkHeader::from_bytes(&raw))
            {
                Ok(chunk) => chunk,
                Err(e) => {
                    result.add_failure(&e);
                    walk.complete = false;
                    break;
                }
            };
            let body_start = pos + CHUNK_HEADER_SIZE as u64;
            let body_end = body_start + chunk.chunk_size as u64;
            if body_end > end {
                result.add_error(
                    ErrorKind::StructureMismatch,
                    format!(
                        "Chunk {} declares {} bytes but only {} remain",
                        index,
                        chunk.chunk_size,
                        end - body_start
                    ),
                );
                walk.complete = false;
                break;
            }

            let inner = if chunk.is_compressed() {
                let decoded = read_range(reader, body_start, body_end)
                    .and_then(|block| decode_block(&block, MAX_VALIDATION_BLOCK));
                match decoded {
                    Ok(data) => {
                        let inner = self.walk_slice(&data, result);
                        (inner, data.len() as u64)
                    }
                    Err(e) => {
                        result.add_failure(&e);
                        walk.complete = false;
                        break;
                    }
                }
            } else {
                let inner = self.walk_stream(reader, body_start, body_end, result);
                let consumed = inner.consumed - body_start;
                (
                    Walk {
                        consumed,
                        ..inner
                    },
                    chunk.chunk_size as u64,
                )
            };
            let (inner, body_len) = inner;
            walk.objects += inner.objects;
            if !inner.complete {
                walk.complete = false;
                break;
            }
            if inner.consumed != body_len {
                result.add_error(
                    ErrorKind::StructureMismatch,
                    format!(
                        "Chunk {} has {} bytes after its last object",
                        index,
                        body_len - inner.consumed
                    ),
                );
            }
            if inner.objects != chunk.object_count as u64 {
                result.add_error(
                    ErrorKind::StructureMismatch,
                    format!(
                        "Chunk {} holds {} objects, header declares {}",
                        index, inner.objects, chunk.object_count
                    ),
                );
            }

            pos = body_end;
            walk.consumed = pos;
            index += 1;
        }
        walk
    }
}

fn io_failure(e: &std::io::Error) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.add_error(ErrorKind::IoFailure, format!("I/O error: {}", e));
    result
}

/// Read and parse the header at offset 0 (no magic/version check).
pub(crate) fn read_header<R: Read + Seek>(reader: &mut R) -> vellum_core::Result<FileHeader> {
    let raw = read_range(reader, 0, FILE_HEADER_SIZE as u64)?;
    FileHeader::from_bytes(&raw)
}

/// Read `[start, end)`; a short source yields `BufferUnderflow`.
fn read_range<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
) -> vellum_core::Result<Vec<u8>> {
    let len = (end - start) as usize;
    reader.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity(len);
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(Error::underflow(len, buf.len()));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_block;
    use crate::encoding::BinaryWriter;
    use crate::format::{CHUNK_FLAG_COMPRESSED, OBJECT_HEADER_SIZE};
    use crate::validation::checksum;
    use std::io::Cursor;
    use vellum_core::{CompressionLevel, FormatFlags, Version};

    fn objects() -> Vec<u8> {
        let mut w = BinaryWriter::new();
        w.write_object(TypeId::POINT2D, 1, &[0u8; 8]).unwrap();
        w.write_object(TypeId::CIRCLE, 2, &[1u8; 12]).unwrap();
        w.write_object(TypeId::LAYER, 3, &[2u8; 4]).unwrap();
        w.into_inner()
    }

    fn flat_file(data: &[u8], count: u32) -> Vec<u8> {
        let mut header = FileHeader::new();
        header.object_count = count;
        header.total_size = (FILE_HEADER_SIZE + data.len()) as u64;
        header.checksum = checksum(data);
        header.flags = FormatFlags::CHECKSUM_PRESENT;
        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_valid_flat_file() {
        let file = flat_file(&objects(), 3);
        let v = FormatValidator::new();
        let structure = v.validate_structure_from(&mut Cursor::new(&file));
        assert!(structure.is_valid(), "{}", structure);
        assert!(structure.warnings.is_empty(), "{}", structure);
        let crc = v.validate_checksum_from(&mut Cursor::new(&file));
        assert!(crc.is_valid(), "{}", crc);
    }

    #[test]
    fn test_count_mismatch_is_error() {
        let file = flat_file(&objects(), 4);
        let result = FormatValidator::new().validate_structure_from(&mut Cursor::new(&file));
        assert!(result.has_error(ErrorKind::StructureMismatch));
    }

    #[test]
    fn test_trailing_padding_is_warning() {
        let mut data = objects();
        data.extend_from_slice(&[0u8; 5]);
        let file = flat_file(&data, 3);
        let result = FormatValidator::new().validate_structure_from(&mut Cursor::new(&file));
        assert!(result.is_valid(), "{}", result);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_oversized_data_size_stops_walk() {
        let mut file = flat_file(&objects(), 3);
        // data_size of the first object
        let at = FILE_HEADER_SIZE + 8;
        file[at..at + 4].copy_from_slice(&u32::MAX.to_be_bytes());
        let result = FormatValidator::new().validate_structure_from(&mut Cursor::new(&file));
        assert!(!result.is_valid());
        assert!(result.has_error(ErrorKind::StructureMismatch));
    }

    #[test]
    fn test_payload_corruption_only_trips_checksum() {
        let mut file = flat_file(&objects(), 3);
        file[FILE_HEADER_SIZE + OBJECT_HEADER_SIZE + 2] ^= 0x40;
        let v = FormatValidator::new();
        let crc = v.validate_checksum_from(&mut Cursor::new(&file));
        assert!(crc.has_error(ErrorKind::ChecksumMismatch));
        let structure = v.validate_structure_from(&mut Cursor::new(&file));
        assert!(structure.is_valid(), "{}", structure);
    }

    #[test]
    fn test_zero_checksum_not_compared() {
        let mut file = flat_file(&objects(), 3);
        file[36..40].copy_from_slice(&[0, 0, 0, 0]);
        file[100] ^= 0xFF;
        let result = FormatValidator::new().validate_checksum_from(&mut Cursor::new(&file));
        assert!(result.is_valid());
        assert_eq!(result.warnings, vec!["No checksum present".to_string()]);
    }

    #[test]
    fn test_header_checks() {
        let v = FormatValidator::new();
        let mut header = FileHeader::new();
        header.data_offset = 10;
        header.object_count = 2;
        header.total_size = 10;
        header.compression = 5;
        let result = v.validate_header(&header);
        assert!(result.has_error(ErrorKind::InvalidData));
        assert!(result.has_error(ErrorKind::StructureMismatch));
        assert!(result.has_error(ErrorKind::UnknownCompression));

        let mut header = FileHeader::new();
        header.flags = FormatFlags::COMPRESSED;
        header.version = Version::new(CURRENT_VERSION.major, CURRENT_VERSION.minor + 1);
        let result = v.validate_header(&header);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_object_header_checks() {
        let v = FormatValidator::new().with_large_object_threshold(16);
        let result = v.validate_object_header(&ObjectHeader::new(TypeId(45), 1, 4), 100);
        assert!(result.has_error(ErrorKind::InvalidData));

        let result = v.validate_object_header(&ObjectHeader::new(TypeId::LINE, 1, 0), 100);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);

        let result = v.validate_object_header(&ObjectHeader::new(TypeId::LINE, 1, 32), 100);
        assert!(result.is_valid());
        assert!(result.warnings[0].contains("large"));

        let result = v.validate_object_header(&ObjectHeader::new(TypeId::LINE, 1, 32), 31);
        assert!(result.has_error(ErrorKind::StructureMismatch));
    }

    #[test]
    fn test_bad_magic_stops_walk() {
        let mut file = flat_file(&objects(), 3);
        file[0] = b'X';
        let result = FormatValidator::new().validate_structure_from(&mut Cursor::new(&file));
        assert_eq!(result.errors.len(), 1);
        assert!(result.has_error(ErrorKind::InvalidMagic));
    }

    #[test]
    fn test_short_file_reports_underflow() {
        let result =
            FormatValidator::new().validate_structure_from(&mut Cursor::new(vec![0u8; 20]));
        assert!(result.has_error(ErrorKind::BufferUnderflow));
    }

    #[test]
    fn test_compressed_flat_layout() {
        let data = objects();
        let block = encode_block(CompressionKind::Fast, CompressionLevel::Default, &data).unwrap();
        let mut header = FileHeader::new();
        header.flags = FormatFlags::COMPRESSED;
        header.compression = CompressionKind::Fast.as_u8();
        header.object_count = 3;
        header.total_size = (FILE_HEADER_SIZE + block.len()) as u64;
        let mut file = header.to_bytes().to_vec();
        file.extend_from_slice(&block);

        let result = FormatValidator::new().validate_structure_from(&mut Cursor::new(&file));
        assert!(result.is_valid(), "{}", result);
    }

    #[test]
    fn test_chunked_layout_checks_chunk_counts() {
        let data = objects();
        let block = encode_block(CompressionKind::Fast, CompressionLevel::Default, &data).unwrap();

        let plain = ChunkHeader {
            chunk_size: data.len() as u32,
            object_count: 3,
            flags: 0,
            checksum: 0,
        };
        let packed = ChunkHeader {
            chunk_size: block.len() as u32,
            object_count: 2,
            flags: CHUNK_FLAG_COMPRESSED,
            checksum: 0,
        };
        let mut body = Vec::new();
        body.extend_from_slice(&plain.to_bytes());
        body.extend_from_slice(&data);
        body.extend_from_slice(&packed.to_bytes());
        body.extend_from_slice(&block);

        let mut header = FileHeader::new();
        header.flags = FormatFlags::STREAMING | FormatFlags::COMPRESSED;
        header.compression = CompressionKind::Fast.as_u8();
        header.object_count = 6;
        header.total_size = (FILE_HEADER_SIZE + body.len()) as u64;
        let mut file = header.to_bytes().to_vec();
        file.extend_from_slice(&body);

        let result = FormatValidator::new().validate_structure_from(&mut Cursor::new(&file));
        // Second chunk claims 2 objects but holds 3
        assert_eq!(result.errors.len(), 1, "{}", result);
        assert!(result.has_error(ErrorKind::StructureMismatch));
    }
}
