//! Object framing records.
//!
//! ```text
//! ObjectHeader (12):         type u8 | flags u8 | reserved u16 | object_id u32 | data_size u32
//! ArrayHeader (8):           element_type u8 | flags u8 | reserved u16 | count u32
//! ChunkHeader (16):          chunk_size u32 | object_count u32 | flags u32 | checksum u32
//! CompressedDataHeader (12): uncompressed u32 | compressed u32 | kind u8 | reserved[3]
//! ObjectReference (4):       object_id u32
//! ```

use byteorder::{BigEndian, ByteOrder};
use vellum_core::{Error, Result, TypeId};

/// Size of an object header in bytes
pub const OBJECT_HEADER_SIZE: usize = 12;

/// Size of an array header in bytes
pub const ARRAY_HEADER_SIZE: usize = 8;

/// Size of a chunk header in bytes
pub const CHUNK_HEADER_SIZE: usize = 16;

/// Size of a compressed-data header in bytes
pub const COMPRESSED_DATA_HEADER_SIZE: usize = 12;

/// Size of an object reference in bytes
pub const OBJECT_REFERENCE_SIZE: usize = 4;

/// Chunk flag: body is a compressed-data header followed by compressed bytes
pub const CHUNK_FLAG_COMPRESSED: u32 = 1;

/// Round `size` up to a multiple of `alignment` (a power of two).
#[inline]
pub const fn align_size(size: usize, alignment: usize) -> usize {
    (size + alignment - 1) & !(alignment - 1)
}

fn ensure_len(bytes: &[u8], needed: usize) -> Result<()> {
    if bytes.len() < needed {
        return Err(Error::underflow(needed, bytes.len()));
    }
    Ok(())
}

/// Header preceding every object payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object type tag
    pub type_id: TypeId,
    /// Per-object flags
    pub flags: u8,
    /// Identity assigned by the writer's registry (0 when unregistered)
    pub object_id: u32,
    /// Payload length in bytes
    pub data_size: u32,
}

impl ObjectHeader {
    /// Create an object header with no flags.
    pub fn new(type_id: TypeId, object_id: u32, data_size: u32) -> Self {
        ObjectHeader {
            type_id,
            flags: 0,
            object_id,
            data_size,
        }
    }

    /// Header plus payload length.
    pub fn record_len(&self) -> usize {
        OBJECT_HEADER_SIZE + self.data_size as usize
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; OBJECT_HEADER_SIZE] {
        let mut buf = [0u8; OBJECT_HEADER_SIZE];
        buf[0] = self.type_id.as_u8();
        buf[1] = self.flags;
        BigEndian::write_u32(&mut buf[4..8], self.object_id);
        BigEndian::write_u32(&mut buf[8..12], self.data_size);
        buf
    }

    /// Deserialize from the first 12 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, OBJECT_HEADER_SIZE)?;
        Ok(ObjectHeader {
            type_id: TypeId(bytes[0]),
            flags: bytes[1],
            object_id: BigEndian::read_u32(&bytes[4..8]),
            data_size: BigEndian::read_u32(&bytes[8..12]),
        })
    }
}

/// Header preceding a homogeneous array of elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayHeader {
    /// Type of every element
    pub element_type: TypeId,
    /// Array flags
    pub flags: u8,
    /// Number of elements
    pub count: u32,
}

impl ArrayHeader {
    /// Create an array header with no flags.
    pub fn new(element_type: TypeId, count: u32) -> Self {
        ArrayHeader {
            element_type,
            flags: 0,
            count,
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; ARRAY_HEADER_SIZE] {
        let mut buf = [0u8; ARRAY_HEADER_SIZE];
        buf[0] = self.element_type.as_u8();
        buf[1] = self.flags;
        BigEndian::write_u32(&mut buf[4..8], self.count);
        buf
    }

    /// Deserialize from the first 8 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, ARRAY_HEADER_SIZE)?;
        Ok(ArrayHeader {
            element_type: TypeId(bytes[0]),
            flags: bytes[1],
            count: BigEndian::read_u32(&bytes[4..8]),
        })
    }
}

/// Header preceding each chunk of a streaming file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkHeader {
    /// Body length in bytes (as stored, i.e. compressed when compressed)
    pub chunk_size: u32,
    /// Objects framed inside the chunk
    pub object_count: u32,
    /// Chunk flags, see [`CHUNK_FLAG_COMPRESSED`]
    pub flags: u32,
    /// CRC32 of the stored body, 0 when checksums are disabled
    pub checksum: u32,
}

impl ChunkHeader {
    /// Whether the body starts with a [`CompressedDataHeader`].
    pub fn is_compressed(&self) -> bool {
        self.flags & CHUNK_FLAG_COMPRESSED != 0
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[0..4], self.chunk_size);
        BigEndian::write_u32(&mut buf[4..8], self.object_count);
        BigEndian::write_u32(&mut buf[8..12], self.flags);
        BigEndian::write_u32(&mut buf[12..16], self.checksum);
        buf
    }

    /// Deserialize from the first 16 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, CHUNK_HEADER_SIZE)?;
        Ok(ChunkHeader {
            chunk_size: BigEndian::read_u32(&bytes[0..4]),
            object_count: BigEndian::read_u32(&bytes[4..8]),
            flags: BigEndian::read_u32(&bytes[8..12]),
            checksum: BigEndian::read_u32(&bytes[12..16]),
        })
    }
}

/// Header preceding a compressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedDataHeader {
    /// Length after decompression
    pub uncompressed_size: u32,
    /// Length of the compressed bytes that follow
    pub compressed_size: u32,
    /// Raw compression kind byte
    pub kind: u8,
}

impl CompressedDataHeader {
    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; COMPRESSED_DATA_HEADER_SIZE] {
        let mut buf = [0u8; COMPRESSED_DATA_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[0..4], self.uncompressed_size);
        BigEndian::write_u32(&mut buf[4..8], self.compressed_size);
        buf[8] = self.kind;
        buf
    }

    /// Deserialize from the first 12 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, COMPRESSED_DATA_HEADER_SIZE)?;
        Ok(CompressedDataHeader {
            uncompressed_size: BigEndian::read_u32(&bytes[0..4]),
            compressed_size: BigEndian::read_u32(&bytes[4..8]),
            kind: bytes[8],
        })
    }
}

/// Reference to another object by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectReference {
    /// Referenced object id
    pub object_id: u32,
}

impl ObjectReference {
    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; OBJECT_REFERENCE_SIZE] {
        self.object_id.to_be_bytes()
    }

    /// Deserialize from the first 4 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, OBJECT_REFERENCE_SIZE)?;
        Ok(ObjectReference {
            object_id: BigEndian::read_u32(&bytes[0..4]),
        })
    }
}
