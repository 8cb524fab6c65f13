//! Core types for Vellum
//!
//! This crate defines the foundational types shared by the persistence engine:
//! - Version: format version with lexicographic ordering
//! - TypeId: object type tag partitioned into category ranges
//! - FormatFlags: file-level feature bits
//! - CompressionKind / CompressionLevel: codec selection
//! - Error: error type hierarchy with fieldless `ErrorKind`
//! - Limits: size thresholds used by validation and streaming

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use limits::{
    CHECKSUM_BLOCK_SIZE, DEFAULT_CHUNK_SIZE, LARGE_OBJECT_THRESHOLD, MIN_COMPRESSION_INPUT,
};
pub use types::{CompressionKind, CompressionLevel, FormatFlags, TypeCategory, TypeId, Version};
