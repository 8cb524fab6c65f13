//! Chunked streaming writer.

use super::config::StreamingConfig;
use super::control::{StreamHandle, StreamState};
use super::progress::{ErrorCallback, ProgressCallback, ProgressTracker, StreamingProgress};
use crate::codec::encode_block;
use crate::format::{
    ChunkHeader, FileHeader, ObjectHeader, CHUNK_FLAG_COMPRESSED, CHUNK_HEADER_SIZE,
    FILE_HEADER_SIZE, OBJECT_HEADER_SIZE,
};
use crate::validation::checksum;
use bytemuck::Pod;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, warn};
use vellum_core::{Error, FormatFlags, Result, TypeId};

/// Writes objects into a sequence of chunks behind a provisional header.
///
/// The header is rewritten with the final counts, size and checksum by
/// [`finalize`](Self::finalize). A writer dropped without finalizing is
/// finalized on drop unless it was interrupted.
///
/// An I/O error from the sink fails the writer: the error is returned again
/// by every later call and nothing is finalized, since the bytes on disk no
/// longer match the writer's counters.
pub struct StreamingWriter<W: Write + Seek> {
    sink: Option<W>,
    base: u64,
    config: StreamingConfig,
    handle: StreamHandle,
    chunk: Vec<u8>,
    chunk_objects: u32,
    object_count: u32,
    data_bytes: u64,
    chunks_written: u64,
    data_crc: crc32fast::Hasher,
    progress: ProgressTracker,
    on_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
    finalized: Option<FileHeader>,
    failed: Option<Error>,
}

impl StreamingWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and start a stream in it.
    pub fn create(path: impl AsRef<Path>, config: StreamingConfig) -> Result<Self> {
        config.validate()?;
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::with_capacity(config.io_buffer_capacity(), file), config)
    }
}

impl<W: Write + Seek> StreamingWriter<W> {
    /// Start a stream at the sink's current position.
    pub fn new(mut sink: W, config: StreamingConfig) -> Result<Self> {
        config.validate()?;
        let base = sink.stream_position()?;
        sink.write_all(&FileHeader::new().to_bytes())?;

        let progress = ProgressTracker::new(config.enable_progress, config.progress_interval);
        Ok(StreamingWriter {
            sink: Some(sink),
            base,
            chunk: Vec::with_capacity(config.chunk_size),
            config,
            handle: StreamHandle::new(),
            chunk_objects: 0,
            object_count: 0,
            data_bytes: 0,
            chunks_written: 0,
            data_crc: crc32fast::Hasher::new(),
            progress,
            on_progress: None,
            on_error: None,
            finalized: None,
            failed: None,
        })
    }

    /// Install a progress callback.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.on_progress = Some(callback);
    }

    /// Install an error callback.
    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    /// Control handle; clone it to pause or interrupt from another thread.
    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        self.handle.state()
    }

    /// Pause at the next object.
    pub fn pause(&self) {
        self.handle.pause();
    }

    /// Resume a paused writer.
    pub fn resume(&self) {
        self.handle.resume();
    }

    /// Interrupt; every later write fails with [`Error::Interrupted`].
    pub fn interrupt(&self) {
        self.handle.interrupt();
    }

    /// Configuration in use.
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Objects accepted so far (buffered or flushed).
    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    /// Chunks written to the sink.
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Data-section bytes written to the sink (excluding the buffered chunk).
    pub fn bytes_written(&self) -> u64 {
        self.data_bytes
    }

    /// Current progress snapshot. Totals are unknown while writing.
    pub fn progress(&self) -> StreamingProgress {
        self.progress.snapshot()
    }

    /// Append one object.
    pub fn write_object(&mut self, type_id: TypeId, object_id: u32, payload: &[u8]) -> Result<()> {
        let result = self.append(type_id, object_id, payload);
        self.notify(result)
    }

    /// Append one object whose payload is the bytes of a `Pod` value.
    pub fn write_pod<T: Pod>(&mut self, type_id: TypeId, object_id: u32, value: &T) -> Result<()> {
        self.write_object(type_id, object_id, bytemuck::bytes_of(value))
    }

    /// Whether a sink error has failed the writer.
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Write the buffered chunk now, even if it is not full.
    pub fn flush_chunk(&mut self) -> Result<()> {
        let result = self
            .ensure_usable()
            .and_then(|()| self.handle.checkpoint())
            .and_then(|()| self.flush_buffered());
        self.notify(result)
    }

    /// Flush the last chunk and rewrite the header. Idempotent.
    ///
    /// Allowed after an interrupt; the header then describes the objects
    /// accepted before the interrupt.
    pub fn finalize(&mut self) -> Result<FileHeader> {
        if let Some(header) = self.finalized {
            return Ok(header);
        }
        let result = self.ensure_usable().and_then(|()| self.write_header());
        self.notify(result)
    }

    /// Finalize and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        self.finalize()?;
        self.sink
            .take()
            .ok_or_else(|| Error::InvalidState("sink already released".into()))
    }

    fn ensure_usable(&self) -> Result<()> {
        match &self.failed {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn append(&mut self, type_id: TypeId, object_id: u32, payload: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        self.handle.checkpoint()?;
        let data_size = u32::try_from(payload.len()).map_err(|_| {
            Error::InvalidData(format!(
                "object payload of {} bytes exceeds u32 range",
                payload.len()
            ))
        })?;
        let object_count = self
            .object_count
            .checked_add(1)
            .ok_or_else(|| Error::InvalidState("object count overflow".into()))?;

        let record_len = OBJECT_HEADER_SIZE + payload.len();
        // A record larger than a chunk is stored as a chunk of its own
        let stored = self.config.max_stored_size(record_len);
        if stored > self.config.max_memory_usage {
            return Err(Error::InvalidData(format!(
                "object {} needs a chunk of up to {} bytes, memory limit is {}",
                object_id, stored, self.config.max_memory_usage
            )));
        }

        if !self.chunk.is_empty() && self.chunk.len() + record_len > self.config.chunk_size {
            self.flush_buffered()?;
        }

        let mark = self.chunk.len();
        let header = ObjectHeader::new(type_id, object_id, data_size);
        self.chunk.extend_from_slice(&header.to_bytes());
        self.chunk.extend_from_slice(payload);
        self.chunk_objects += 1;

        if self.chunk.len() >= self.config.chunk_size {
            if let Err(e) = self.flush_buffered() {
                self.chunk.truncate(mark);
                self.chunk_objects -= 1;
                return Err(e);
            }
        }

        self.object_count = object_count;
        self.progress.record(record_len as u64, 1);
        self.progress.report(self.on_progress.as_mut(), false);
        Ok(())
    }

    fn flush_buffered(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::InvalidState("sink already released".into()))?;

        let compressed;
        let (body, flags) = if self.config.compression.is_compressed() {
            compressed = encode_block(
                self.config.compression,
                self.config.compression_level,
                &self.chunk,
            )?;
            (compressed.as_slice(), CHUNK_FLAG_COMPRESSED)
        } else {
            (self.chunk.as_slice(), 0)
        };

        let chunk_size = u32::try_from(body.len()).map_err(|_| {
            Error::InvalidData(format!("chunk of {} bytes exceeds u32 range", body.len()))
        })?;
        let header = ChunkHeader {
            chunk_size,
            object_count: self.chunk_objects,
            flags,
            checksum: if self.config.enable_checksums {
                checksum(body)
            } else {
                0
            },
        };
        let header_bytes = header.to_bytes();
        if let Err(e) = sink
            .write_all(&header_bytes)
            .and_then(|()| sink.write_all(body))
        {
            return Err(self.fail(e));
        }
        self.data_crc.update(&header_bytes);
        self.data_crc.update(body);

        self.data_bytes += (CHUNK_HEADER_SIZE + body.len()) as u64;
        self.chunks_written += 1;
        debug!(
            chunk = self.chunks_written,
            objects = self.chunk_objects,
            raw = self.chunk.len(),
            stored = body.len(),
            "Flushed chunk"
        );
        self.chunk.clear();
        self.chunk_objects = 0;
        Ok(())
    }

    fn write_header(&mut self) -> Result<FileHeader> {
        self.flush_buffered()?;

        let mut header = FileHeader::new();
        header.flags.insert(FormatFlags::STREAMING);
        if self.config.compression.is_compressed() {
            header.flags.insert(FormatFlags::COMPRESSED);
        }
        header.compression = self.config.compression.as_u8();
        header.object_count = self.object_count;
        header.total_size = FILE_HEADER_SIZE as u64 + self.data_bytes;
        if self.config.enable_checksums {
            header.flags.insert(FormatFlags::CHECKSUM_PRESENT);
            header.checksum = self.data_crc.clone().finalize();
        }

        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::InvalidState("sink already released".into()))?;
        let end = self.base + header.total_size;
        let written = sink
            .seek(SeekFrom::Start(self.base))
            .and_then(|_| sink.write_all(&header.to_bytes()))
            .and_then(|()| sink.seek(SeekFrom::Start(end)))
            .and_then(|_| sink.flush());
        if let Err(e) = written {
            return Err(self.fail(e));
        }

        self.finalized = Some(header);
        self.handle.mark_finalized();
        self.progress.report(self.on_progress.as_mut(), true);
        info!(
            objects = header.object_count,
            chunks = self.chunks_written,
            bytes = header.total_size,
            interrupted = self.handle.is_interrupted(),
            "Stream finalized"
        );
        Ok(header)
    }

    fn fail(&mut self, e: std::io::Error) -> Error {
        let err = Error::Io(e);
        warn!(error = %err, objects = self.object_count, "Stream writer failed");
        self.failed = Some(err.clone());
        err
    }

    fn notify<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if let Some(callback) = self.on_error.as_mut() {
                callback(e);
            }
        }
        result
    }
}

impl<W: Write + Seek> Drop for StreamingWriter<W> {
    fn drop(&mut self) {
        if self.sink.is_none()
            || self.finalized.is_some()
            || self.failed.is_some()
            || self.handle.is_interrupted()
        {
            return;
        }
        if let Err(e) = self.write_header() {
            warn!(error = %e, "Failed to finalize stream on drop");
        }
    }
}

impl<W: Write + Seek> fmt::Debug for StreamingWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingWriter")
            .field("state", &self.handle.state())
            .field("object_count", &self.object_count)
            .field("chunks_written", &self.chunks_written)
            .field("buffered", &self.chunk.len())
            .field("failed", &self.failed.is_some())
            .finish_non_exhaustive()
    }
}
