//! Size thresholds
//!
//! These constants are shared by validation, streaming, and the codec
//! recommendation helper.

/// Objects larger than this are reported as a validation warning (100MB).
pub const LARGE_OBJECT_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default streaming chunk size (1MB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Inputs smaller than this are not worth compressing (1KB).
pub const MIN_COMPRESSION_INPUT: usize = 1024;

/// Block size used when streaming a file through the CRC (1MB).
pub const CHECKSUM_BLOCK_SIZE: usize = 1024 * 1024;
