//! Error types for Vellum
//!
//! This module defines all error types used throughout the engine.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Every variant maps to a fieldless [`ErrorKind`] so validation reports and
//! callers can classify failures without matching on payloads.

use crate::types::Version;
use std::io;
use thiserror::Error;

/// Result type alias for Vellum operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the persistence engine
#[derive(Debug, Error)]
pub enum Error {
    /// File header does not start with the format magic
    #[error("Invalid magic number: 0x{found:08X}")]
    InvalidMagic {
        /// Magic value found in the header
        found: u32,
    },

    /// File was written by a newer major format version
    #[error("Unsupported version {found} (current {current})")]
    UnsupportedVersion {
        /// Version stored in the file
        found: Version,
        /// Newest version this build understands
        current: Version,
    },

    /// A read needed more bytes than remain in the buffer
    #[error("Buffer underflow: needed {needed} bytes, {available} available")]
    BufferUnderflow {
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// A bump allocation did not fit in the fixed-capacity region
    #[error("Memory region exhausted: requested {requested} bytes, {remaining} remaining")]
    MemoryRegionExhausted {
        /// Bytes requested including alignment padding
        requested: usize,
        /// Bytes left before the allocation
        remaining: usize,
    },

    /// Stored and recomputed CRC32 differ
    #[error("Checksum mismatch: expected 0x{expected:08X}, computed 0x{actual:08X}")]
    ChecksumMismatch {
        /// Checksum stored on disk
        expected: u32,
        /// Checksum computed over the data
        actual: u32,
    },

    /// Object framing disagrees with header counts or sizes
    #[error("Structure mismatch: {0}")]
    StructureMismatch(String),

    /// No chain of registered migrations connects two versions
    #[error("No migration path from {from} to {to}")]
    NoMigrationPath {
        /// Source version
        from: Version,
        /// Target version
        to: Version,
    },

    /// A single migration step reported failure
    #[error("Migration step {from} -> {to} failed: {reason}")]
    MigrationStepFailed {
        /// Step source version
        from: Version,
        /// Step target version
        to: Version,
        /// Last error message reported by the step
        reason: String,
    },

    /// Codec could not compress the input
    #[error("Compression failure: {0}")]
    CompressionFailure(String),

    /// Decompressed length differs from the recorded length
    #[error("Decompression size mismatch: expected {expected} bytes, got {actual}")]
    DecompressionSizeMismatch {
        /// Length recorded in the compressed header
        expected: usize,
        /// Length actually produced
        actual: usize,
    },

    /// Compression byte does not name a known codec
    #[error("Unknown compression kind: {0}")]
    UnknownCompression(u8),

    /// A typed view would not be aligned for its type
    #[error("Misaligned access at offset {offset} (alignment {align})")]
    Misaligned {
        /// Byte offset of the attempted view
        offset: usize,
        /// Required alignment
        align: usize,
    },

    /// Malformed data that is not covered by a more specific kind
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Operation not allowed in the current stream state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration rejected by `validate()`
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Stream was interrupted; no further work is performed
    #[error("Operation interrupted")]
    Interrupted,

    /// Validation found errors before the data was trusted
    #[error("Validation failed ({kind:?}): {report}")]
    Validation {
        /// Kind of the first error in the report
        kind: ErrorKind,
        /// Rendered validation report
        report: String,
    },

    /// I/O error at the OS boundary (open/read/write/map)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Fieldless classification of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// See [`Error::InvalidMagic`]
    InvalidMagic,
    /// See [`Error::UnsupportedVersion`]
    UnsupportedVersion,
    /// See [`Error::BufferUnderflow`]
    BufferUnderflow,
    /// See [`Error::MemoryRegionExhausted`]
    MemoryRegionExhausted,
    /// See [`Error::ChecksumMismatch`]
    ChecksumMismatch,
    /// See [`Error::StructureMismatch`]
    StructureMismatch,
    /// See [`Error::NoMigrationPath`]
    NoMigrationPath,
    /// See [`Error::MigrationStepFailed`]
    MigrationStepFailed,
    /// See [`Error::CompressionFailure`]
    CompressionFailure,
    /// See [`Error::DecompressionSizeMismatch`]
    DecompressionSizeMismatch,
    /// See [`Error::UnknownCompression`]
    UnknownCompression,
    /// See [`Error::Misaligned`]
    Misaligned,
    /// See [`Error::InvalidData`]
    InvalidData,
    /// See [`Error::InvalidState`]
    InvalidState,
    /// See [`Error::InvalidConfig`]
    InvalidConfig,
    /// See [`Error::Interrupted`]
    Interrupted,
    /// See [`Error::Validation`]
    Validation,
    /// See [`Error::Io`]
    IoFailure,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidMagic { .. } => ErrorKind::InvalidMagic,
            Error::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Error::BufferUnderflow { .. } => ErrorKind::BufferUnderflow,
            Error::MemoryRegionExhausted { .. } => ErrorKind::MemoryRegionExhausted,
            Error::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Error::StructureMismatch(_) => ErrorKind::StructureMismatch,
            Error::NoMigrationPath { .. } => ErrorKind::NoMigrationPath,
            Error::MigrationStepFailed { .. } => ErrorKind::MigrationStepFailed,
            Error::CompressionFailure(_) => ErrorKind::CompressionFailure,
            Error::DecompressionSizeMismatch { .. } => ErrorKind::DecompressionSizeMismatch,
            Error::UnknownCompression(_) => ErrorKind::UnknownCompression,
            Error::Misaligned { .. } => ErrorKind::Misaligned,
            Error::InvalidData(_) => ErrorKind::InvalidData,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::Interrupted => ErrorKind::Interrupted,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Io(_) => ErrorKind::IoFailure,
        }
    }

    /// True when nothing downstream of the failing header can be trusted.
    ///
    /// Only an unrecognised magic or a newer major version qualify.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidMagic { .. } | Error::UnsupportedVersion { .. }
        )
    }

    /// Shorthand for a buffer underflow.
    pub fn underflow(needed: usize, available: usize) -> Self {
        Error::BufferUnderflow { needed, available }
    }

    /// Shorthand for a structure mismatch.
    pub fn structure(detail: impl Into<String>) -> Self {
        Error::StructureMismatch(detail.into())
    }
}

// `io::Error` is not `Clone`; a cloned I/O error keeps its kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::InvalidMagic { found } => Error::InvalidMagic { found: *found },
            Error::UnsupportedVersion { found, current } => Error::UnsupportedVersion {
                found: *found,
                current: *current,
            },
            Error::BufferUnderflow { needed, available } => Error::BufferUnderflow {
                needed: *needed,
                available: *available,
            },
            Error::MemoryRegionExhausted {
                requested,
                remaining,
            } => Error::MemoryRegionExhausted {
                requested: *requested,
                remaining: *remaining,
            },
            Error::ChecksumMismatch { expected, actual } => Error::ChecksumMismatch {
                expected: *expected,
                actual: *actual,
            },
            Error::StructureMismatch(detail) => Error::StructureMismatch(detail.clone()),
            Error::NoMigrationPath { from, to } => Error::NoMigrationPath {
                from: *from,
                to: *to,
            },
            Error::MigrationStepFailed { from, to, reason } => Error::MigrationStepFailed {
                from: *from,
                to: *to,
                reason: reason.clone(),
            },
            Error::CompressionFailure(detail) => Error::CompressionFailure(detail.clone()),
            Error::DecompressionSizeMismatch { expected, actual } => {
                Error::DecompressionSizeMismatch {
                    expected: *expected,
                    actual: *actual,
                }
            }
            Error::UnknownCompression(kind) => Error::UnknownCompression(*kind),
            Error::Misaligned { offset, align } => Error::Misaligned {
                offset: *offset,
                align: *align,
            },
            Error::InvalidData(detail) => Error::InvalidData(detail.clone()),
            Error::InvalidState(detail) => Error::InvalidState(detail.clone()),
            Error::InvalidConfig(detail) => Error::InvalidConfig(detail.clone()),
            Error::Interrupted => Error::Interrupted,
            Error::Validation { kind, report } => Error::Validation {
                kind: *kind,
                report: report.clone(),
            },
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
        }
    }
}
