//! Streaming I/O
//!
//! Large scenes are written and read one chunk at a time so memory stays
//! bounded by the chunk size rather than the file size.
//!
//! # Layout
//!
//! ```text
//! FileHeader (Streaming flag)
//! ChunkHeader | body
//! ChunkHeader | body
//! ...
//! ```
//!
//! A body is `ObjectHeader + payload` records, or one compressed block of
//! them when chunk flag bit 0 is set.
//!
//! # Module Structure
//!
//! - `config`: Chunk size, compression, checksum and progress settings
//! - `control`: Thread-safe pause/resume/interrupt gate
//! - `progress`: Progress snapshots and callback types
//! - `writer`: Chunked writer with header finalization
//! - `reader`: Chunk-at-a-time reader
//! - `async_io`: Background-thread wrappers

pub mod async_io;
pub mod config;
pub mod control;
pub mod progress;
pub mod reader;
pub mod writer;

pub use async_io::{AsyncStreamingReader, AsyncStreamingWriter, Pending};
pub use config::{StreamingConfig, StreamingConfigError};
pub use control::{StreamHandle, StreamState};
pub use progress::{ErrorCallback, ObjectCallback, ProgressCallback, StreamingProgress};
pub use reader::{StreamObject, StreamingReader};
pub use writer::StreamingWriter;
