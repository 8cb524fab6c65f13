//! On-disk byte formats.
//!
//! Every record has a fixed size and explicit padding. Multi-byte integers are
//! stored big-endian and converted only inside `to_bytes` / `from_bytes`, so no
//! other module interprets header bytes directly.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ FileHeader (96 bytes)              │
//! ├────────────────────────────────────┤  data_offset
//! │ flat:       ObjectHeader + payload │
//! │             ObjectHeader + payload │
//! │             ...                    │
//! │ compressed: CompressedDataHeader   │
//! │             + compressed objects   │
//! │ streaming:  ChunkHeader + body     │
//! │             ChunkHeader + body     │
//! │             ...                    │
//! └────────────────────────────────────┘  total_size
//! ```
//!
//! # Module Structure
//!
//! - `header`: file header, magic and version constants
//! - `records`: object, array, chunk and compressed-data headers

pub mod header;
pub mod records;

pub use header::{FileHeader, CURRENT_VERSION, FILE_HEADER_SIZE, MAGIC};
pub use records::{
    align_size, ArrayHeader, ChunkHeader, CompressedDataHeader, ObjectHeader, ObjectReference,
    ARRAY_HEADER_SIZE, CHUNK_FLAG_COMPRESSED, CHUNK_HEADER_SIZE, COMPRESSED_DATA_HEADER_SIZE,
    OBJECT_HEADER_SIZE, OBJECT_REFERENCE_SIZE,
};
