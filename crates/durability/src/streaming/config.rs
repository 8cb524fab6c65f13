//! Streaming configuration.

use crate::codec::{Codec, Compressor};
use crate::format::COMPRESSED_DATA_HEADER_SIZE;
use std::time::Duration;
use vellum_core::{CompressionKind, CompressionLevel, Error, DEFAULT_CHUNK_SIZE};

/// Smallest file I/O buffer used by `create` / `open`
const MIN_IO_BUFFER: usize = 8 * 1024;

/// Streaming writer/reader configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingConfig {
    /// Target chunk body size in bytes (default: 1MB).
    ///
    /// A chunk is flushed before an object would push it past this size. An
    /// object larger than the chunk size gets a chunk of its own.
    pub chunk_size: usize,

    /// Chunk buffers per stream (default: 2).
    ///
    /// One buffer assembles (or decodes) the current chunk; the rest size the
    /// file I/O buffer of [`StreamingWriter::create`](super::StreamingWriter::create)
    /// and [`StreamingReader::open`](super::StreamingReader::open).
    pub buffer_count: usize,

    /// Compression applied to each chunk (default: none).
    pub compression: CompressionKind,

    /// Compression effort (default: `Default`).
    pub compression_level: CompressionLevel,

    /// Write and verify per-chunk and whole-file CRC32 (default: true).
    pub enable_checksums: bool,

    /// Deliver progress callbacks (default: true).
    pub enable_progress: bool,

    /// Minimum time between progress callbacks (default: 100ms).
    pub progress_interval: Duration,

    /// Largest stored chunk body the reader will load, in bytes (default: 100MB).
    ///
    /// Must hold a full chunk after worst-case compression; the writer rejects
    /// objects whose own chunk would exceed it.
    pub max_memory_usage: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            buffer_count: 2,
            compression: CompressionKind::None,
            compression_level: CompressionLevel::Default,
            enable_checksums: true,
            enable_progress: true,
            progress_interval: Duration::from_millis(100),
            max_memory_usage: 100 * 1024 * 1024, // 100MB
        }
    }
}

impl StreamingConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set chunk size (builder pattern).
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set buffer count (builder pattern).
    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    /// Set chunk compression (builder pattern).
    pub fn with_compression(mut self, kind: CompressionKind, level: CompressionLevel) -> Self {
        self.compression = kind;
        self.compression_level = level;
        self
    }

    /// Enable or disable checksums (builder pattern).
    pub fn with_checksums(mut self, enabled: bool) -> Self {
        self.enable_checksums = enabled;
        self
    }

    /// Enable or disable progress callbacks (builder pattern).
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.enable_progress = enabled;
        self
    }

    /// Set progress interval (builder pattern).
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the reader memory limit (builder pattern).
    pub fn with_max_memory_usage(mut self, bytes: usize) -> Self {
        self.max_memory_usage = bytes;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), StreamingConfigError> {
        if self.chunk_size == 0 {
            return Err(StreamingConfigError::ChunkSizeZero);
        }
        if self.chunk_size > u32::MAX as usize {
            return Err(StreamingConfigError::ChunkSizeTooLarge);
        }
        if self.buffer_count == 0 {
            return Err(StreamingConfigError::BufferCountZero);
        }
        if self.max_stored_size(self.chunk_size) > self.max_memory_usage {
            return Err(StreamingConfigError::ChunkExceedsMemoryLimit);
        }
        Ok(())
    }

    /// Largest stored body for a chunk holding `raw_len` bytes of records.
    ///
    /// Compressed bodies carry a block header and may grow up to the codec's
    /// worst case.
    pub fn max_stored_size(&self, raw_len: usize) -> usize {
        if self.compression.is_compressed() {
            Codec::for_kind(self.compression)
                .max_compressed_size(raw_len)
                .saturating_add(COMPRESSED_DATA_HEADER_SIZE)
        } else {
            raw_len
        }
    }

    /// Capacity of the file I/O buffer: `buffer_count - 1` chunks, bounded
    /// below by 8KB and above by the memory limit.
    pub fn io_buffer_capacity(&self) -> usize {
        self.chunk_size
            .saturating_mul(self.buffer_count.saturating_sub(1))
            .min(self.max_memory_usage)
            .max(MIN_IO_BUFFER)
    }

    /// Create a configuration optimized for testing (small chunks, no throttling).
    pub fn for_testing() -> Self {
        StreamingConfig {
            chunk_size: 64 * 1024, // 64KB for many chunks in tests
            progress_interval: Duration::ZERO,
            max_memory_usage: 16 * 1024 * 1024,
            ..Self::default()
        }
    }
}

/// Streaming configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamingConfigError {
    /// Chunk size is zero.
    #[error("Chunk size must be greater than zero")]
    ChunkSizeZero,

    /// Chunk size does not fit the 32-bit chunk header.
    #[error("Chunk size must fit in 32 bits")]
    ChunkSizeTooLarge,

    /// No buffers budgeted.
    #[error("Buffer count must be at least 1")]
    BufferCountZero,

    /// A full chunk, stored with the configured codec, exceeds the memory limit.
    #[error("Stored chunk size cannot exceed max memory usage")]
    ChunkExceedsMemoryLimit,
}

impl From<StreamingConfigError> for Error {
    fn from(e: StreamingConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
