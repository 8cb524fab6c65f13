//! File header format.
//!
//! # Binary Format (96 bytes, big-endian)
//!
//! ```text
//! 0  magic u32 | 4 ver_major u16 | 6 ver_minor u16 | 8 flags u32 | 12 pad[4]
//! 16 total_size u64 | 24 data_offset u64 | 32 object_count u32 | 36 checksum u32
//! 40 compression u8 | 41 reserved[55]
//! ```
//!
//! `total_size` is the length of the whole file including this header.
//! `checksum` is the CRC32 of every byte after `data_offset`; zero means the
//! checksum is absent.

use byteorder::{BigEndian, ByteOrder};
use tracing::warn;
use vellum_core::{CompressionKind, Error, FormatFlags, Result, Version};

/// Magic number identifying a file: "VGBF"
pub const MAGIC: u32 = 0x5647_4246;

/// Newest format version this build writes
pub const CURRENT_VERSION: Version = Version::new(1, 0);

/// Size of the file header in bytes
pub const FILE_HEADER_SIZE: usize = 96;

/// File header (96 bytes).
///
/// Written provisionally when a file is created and rewritten in place once
/// the final counts are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Magic number, [`MAGIC`] for valid files
    pub magic: u32,
    /// Format version the file was written with
    pub version: Version,
    /// Feature bits
    pub flags: FormatFlags,
    /// Total file length in bytes
    pub total_size: u64,
    /// Offset of the first data byte
    pub data_offset: u64,
    /// Number of top-level objects
    pub object_count: u32,
    /// CRC32 of the data section, 0 when absent
    pub checksum: u32,
    /// Raw compression byte; kept raw so unknown values survive for validation
    pub compression: u8,
}

impl Default for FileHeader {
    fn default() -> Self {
        FileHeader::new()
    }
}

impl FileHeader {
    /// Create a provisional header for an empty file at the current version.
    pub fn new() -> Self {
        FileHeader {
            magic: MAGIC,
            version: CURRENT_VERSION,
            flags: FormatFlags::NONE,
            total_size: FILE_HEADER_SIZE as u64,
            data_offset: FILE_HEADER_SIZE as u64,
            object_count: 0,
            checksum: 0,
            compression: CompressionKind::None.as_u8(),
        }
    }

    /// Compression kind, or `None` if the byte is undefined.
    pub fn compression_kind(&self) -> Option<CompressionKind> {
        CompressionKind::from_u8(self.compression)
    }

    /// Whether the data section is a chunk sequence.
    pub fn is_streaming(&self) -> bool {
        self.flags.contains(FormatFlags::STREAMING)
    }

    /// Whether the data section (or each chunk) is compressed.
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(FormatFlags::COMPRESSED)
    }

    /// Whether the data section is a zero-copy layout with alignment padding.
    pub fn is_aligned(&self) -> bool {
        self.flags.contains(FormatFlags::ALIGNED)
    }

    /// Whether `checksum` carries a data-section CRC.
    pub fn has_checksum(&self) -> bool {
        self.checksum != 0
    }

    /// Serialize to the fixed 96-byte layout.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[0..4], self.magic);
        BigEndian::write_u16(&mut buf[4..6], self.version.major);
        BigEndian::write_u16(&mut buf[6..8], self.version.minor);
        BigEndian::write_u32(&mut buf[8..12], self.flags.bits());
        BigEndian::write_u64(&mut buf[16..24], self.total_size);
        BigEndian::write_u64(&mut buf[24..32], self.data_offset);
        BigEndian::write_u32(&mut buf[32..36], self.object_count);
        BigEndian::write_u32(&mut buf[36..40], self.checksum);
        buf[40] = self.compression;
        buf
    }

    /// Deserialize from the first 96 bytes of `bytes`.
    ///
    /// Only the length is checked here; call [`FileHeader::validate`] to check
    /// magic and version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(Error::underflow(FILE_HEADER_SIZE, bytes.len()));
        }
        Ok(FileHeader {
            magic: BigEndian::read_u32(&bytes[0..4]),
            version: Version::new(
                BigEndian::read_u16(&bytes[4..6]),
                BigEndian::read_u16(&bytes[6..8]),
            ),
            flags: FormatFlags::from_bits(BigEndian::read_u32(&bytes[8..12])),
            total_size: BigEndian::read_u64(&bytes[16..24]),
            data_offset: BigEndian::read_u64(&bytes[24..32]),
            object_count: BigEndian::read_u32(&bytes[32..36]),
            checksum: BigEndian::read_u32(&bytes[36..40]),
            compression: bytes[40],
        })
    }

    /// Check magic and version.
    ///
    /// A newer minor of the current major is accepted with a warning; a newer
    /// major is rejected.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(Error::InvalidMagic { found: self.magic });
        }
        if self.version.major > CURRENT_VERSION.major {
            return Err(Error::UnsupportedVersion {
                found: self.version,
                current: CURRENT_VERSION,
            });
        }
        if self.version.major == CURRENT_VERSION.major && self.version.minor > CURRENT_VERSION.minor
        {
            warn!(
                found = %self.version,
                current = %CURRENT_VERSION,
                "File written by a newer minor version"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileHeader {
        FileHeader {
            magic: MAGIC,
            version: Version::new(1, 0),
            flags: FormatFlags::STREAMING | FormatFlags::CHECKSUM_PRESENT,
            total_size: 4096,
            data_offset: 96,
            object_count: 17,
            checksum: 0xCAFE_BABE,
            compression: 1,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), FILE_HEADER_SIZE);
        assert_eq!(FileHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_layout_is_big_endian() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..4], b"VGBF");
        assert_eq!(&bytes[4..8], &[0, 1, 0, 0]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
        assert_eq!(&bytes[16..24], &4096u64.to_be_bytes());
        assert_eq!(&bytes[32..36], &17u32.to_be_bytes());
        assert_eq!(bytes[40], 1);
        assert!(bytes[41..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_header_too_short() {
        let err = FileHeader::from_bytes(&[0u8; 40]).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferUnderflow {
                needed: 96,
                available: 40
            }
        ));
    }

    #[test]
    fn test_validate_rejects_bad_magic() {
        let mut header = sample();
        header.magic = 0x1234_5678;
        assert!(matches!(
            header.validate(),
            Err(Error::InvalidMagic { found: 0x1234_5678 })
        ));
    }

    #[test]
    fn test_validate_rejects_newer_major() {
        let mut header = sample();
        header.version = Version::new(CURRENT_VERSION.major + 1, 0);
        let err = header.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, Error::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_validate_accepts_newer_minor() {
        let mut header = sample();
        header.version = Version::new(CURRENT_VERSION.major, CURRENT_VERSION.minor + 3);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_unknown_compression_byte_survives() {
        let mut header = sample();
        header.compression = 9;
        let parsed = FileHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed.compression, 9);
        assert_eq!(parsed.compression_kind(), None);
    }
}
