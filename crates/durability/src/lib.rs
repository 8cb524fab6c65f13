//! Persistence layer for Vellum
//!
//! This crate handles everything that turns scene objects into bytes and back:
//!
//! - Binary wire format: file header and fixed-size records
//! - Encode/decode engine with identity registry and back-patching
//! - Compression codecs behind a closed `Codec` enum
//! - Validation: header, checksum and structure checks plus recovery reads
//! - Version migration registry with the standard format migrations
//! - Streaming I/O with pause/resume/interrupt and progress reporting
//! - Zero-copy regions and memory-mapped files
//! - Flat in-memory documents

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec; // Compression codecs and framed blocks
pub mod document; // Flat documents built and read in memory
pub mod encoding; // BinaryWriter / BinaryReader
pub mod format; // File header and record layouts
pub mod migration; // Version registry and migrations
pub mod streaming; // Chunked streaming writer/reader
pub mod validation; // Integrity checks and recovery
pub mod zero_copy; // Aligned regions and memory maps

// === Re-exports ===

// Format
pub use format::{
    ArrayHeader, ChunkHeader, CompressedDataHeader, FileHeader, ObjectHeader, ObjectReference,
    CURRENT_VERSION, FILE_HEADER_SIZE, MAGIC,
};

// Encoding
pub use encoding::{BinaryReader, BinaryWriter, ObjectMark};

// Codecs
pub use codec::{
    decode_block, encode_block, recommended_kind, Codec, CompressionStats, Compressor,
    IdentityCodec, RunLengthCodec,
};

// Validation
pub use validation::{
    checksum, read_validated, read_with_recovery, FormatValidator, IntegrityCheck,
    RecoveredFile, ValidationIssue, ValidationResult,
};

// Migration
pub use migration::{
    read_current, register_standard_migrations, CurrentFormatHandler, FormatHandler,
    MigrationRegistry, MigrationResult,
};

// Streaming
pub use streaming::{
    AsyncStreamingReader, AsyncStreamingWriter, Pending, StreamHandle, StreamObject,
    StreamState, StreamingConfig, StreamingConfigError, StreamingProgress, StreamingReader,
    StreamingWriter,
};

// Zero-copy
pub use zero_copy::{
    AlignedBuffer, MappedFile, MappedFileMut, MemoryRegion, RegionStorage, ZeroCopyReader,
    ZeroCopyWriter,
};

// Documents
pub use document::{DocumentReader, DocumentWriter};
