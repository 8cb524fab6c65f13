//! Chunked streaming reader.

use super::config::StreamingConfig;
use super::control::{StreamHandle, StreamState};
use super::progress::{
    ErrorCallback, ObjectCallback, ProgressCallback, ProgressTracker, StreamingProgress,
};
use crate::codec::decode_block;
use crate::format::{
    ChunkHeader, FileHeader, ObjectHeader, CHUNK_HEADER_SIZE, FILE_HEADER_SIZE,
    OBJECT_HEADER_SIZE,
};
use crate::validation::checksum;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info, warn};
use vellum_core::{Error, Result, TypeId};

/// An object borrowed from the reader's current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamObject<'a> {
    /// Object header as stored
    pub header: ObjectHeader,
    /// Payload bytes
    pub payload: &'a [u8],
}

impl StreamObject<'_> {
    /// Object type.
    pub fn type_id(&self) -> TypeId {
        self.header.type_id
    }

    /// Object id.
    pub fn object_id(&self) -> u32 {
        self.header.object_id
    }
}

/// Reads objects from a streaming (chunked) or flat uncompressed file.
///
/// At most one chunk is held in memory, plus the compressed staging buffer
/// while a compressed chunk is being decoded.
///
/// The first read error is terminal: every later read returns it again.
pub struct StreamingReader<R: Read + Seek> {
    source: R,
    config: StreamingConfig,
    header: FileHeader,
    handle: StreamHandle,
    pos: u64,
    end: u64,
    buffer: Vec<u8>,
    staging: Vec<u8>,
    cursor: usize,
    chunk_objects_left: u32,
    chunks_read: u64,
    objects_read: u64,
    exhausted: bool,
    failed: Option<Error>,
    progress: ProgressTracker,
    on_object: Option<ObjectCallback>,
    on_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
}

impl StreamingReader<BufReader<File>> {
    /// Open `path` for streaming.
    pub fn open(path: impl AsRef<Path>, config: StreamingConfig) -> Result<Self> {
        config.validate()?;
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::with_capacity(config.io_buffer_capacity(), file), config)
    }
}

impl<R: Read + Seek> StreamingReader<R> {
    /// Validate the header at the source's current position and prepare to read.
    ///
    /// Fails with `InvalidMagic` or `UnsupportedVersion` for unreadable
    /// headers, and with `InvalidData` for flat compressed files, which are
    /// read whole with [`DocumentReader`](crate::document::DocumentReader).
    pub fn new(mut source: R, config: StreamingConfig) -> Result<Self> {
        config.validate()?;
        let base = source.stream_position()?;
        let len = source.seek(SeekFrom::End(0))?;
        let available = len.saturating_sub(base);
        if available < FILE_HEADER_SIZE as u64 {
            return Err(Error::underflow(FILE_HEADER_SIZE, available as usize));
        }

        source.seek(SeekFrom::Start(base))?;
        let mut raw = [0u8; FILE_HEADER_SIZE];
        source.read_exact(&mut raw)?;
        let header = FileHeader::from_bytes(&raw)?;
        header.validate()?;

        if header.is_compressed() && !header.is_streaming() {
            return Err(Error::InvalidData(
                "flat compressed files cannot be streamed".into(),
            ));
        }
        if header.is_aligned() {
            return Err(Error::InvalidData(
                "aligned zero-copy files cannot be streamed".into(),
            ));
        }

        let start = base + header.data_offset.max(FILE_HEADER_SIZE as u64);
        let end = base + header.total_size;
        if end < start {
            return Err(Error::structure(format!(
                "total_size {} ends before data offset {}",
                header.total_size, header.data_offset
            )));
        }
        if end > len {
            return Err(Error::structure(format!(
                "total_size {} exceeds stream length {}",
                header.total_size, available
            )));
        }
        source.seek(SeekFrom::Start(start))?;

        let progress = ProgressTracker::new(config.enable_progress, config.progress_interval)
            .with_totals(end - start, header.object_count as u64);
        debug!(
            objects = header.object_count,
            bytes = header.total_size,
            streaming = header.is_streaming(),
            "Opened stream"
        );
        Ok(StreamingReader {
            source,
            config,
            header,
            handle: StreamHandle::new(),
            pos: start,
            end,
            buffer: Vec::new(),
            staging: Vec::new(),
            cursor: 0,
            chunk_objects_left: 0,
            chunks_read: 0,
            objects_read: 0,
            exhausted: false,
            failed: None,
            progress,
            on_object: None,
            on_progress: None,
            on_error: None,
        })
    }

    /// Install the callback invoked by [`read_next_object`](Self::read_next_object).
    pub fn set_object_callback(&mut self, callback: ObjectCallback) {
        self.on_object = Some(callback);
    }

    /// Install a progress callback.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.on_progress = Some(callback);
    }

    /// Install an error callback.
    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    /// Validated file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
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

    /// Resume a paused reader.
    pub fn resume(&self) {
        self.handle.resume();
    }

    /// Interrupt; every later read fails with [`Error::Interrupted`].
    pub fn interrupt(&self) {
        self.handle.interrupt();
    }

    /// Objects delivered so far.
    pub fn objects_read(&self) -> u64 {
        self.objects_read
    }

    /// Chunks loaded so far.
    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }

    /// Whether a read error has stopped the reader.
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> StreamingProgress {
        self.progress.snapshot()
    }

    /// Next object, or `None` at the end of the data section.
    pub fn next_object(&mut self) -> Result<Option<StreamObject<'_>>> {
        let next = self.advance();
        match self.notify(next)? {
            Some((header, range)) => Ok(Some(StreamObject {
                header,
                payload: &self.buffer[range],
            })),
            None => Ok(None),
        }
    }

    /// Deliver the next object to the object callback.
    ///
    /// Returns `false` at the end of the data section.
    pub fn read_next_object(&mut self) -> Result<bool> {
        let next = self.advance();
        match self.notify(next)? {
            Some((header, range)) => {
                if let Some(callback) = self.on_object.as_mut() {
                    callback(header.type_id, header.object_id, &self.buffer[range]);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read every remaining object through the callback.
    ///
    /// Returns `true` when the number of objects read matches the header.
    pub fn read_all(&mut self) -> Result<bool> {
        while self.read_next_object()? {}
        let complete = self.objects_read == self.header.object_count as u64;
        if complete {
            info!(objects = self.objects_read, chunks = self.chunks_read, "Stream read");
        } else {
            warn!(
                read = self.objects_read,
                expected = self.header.object_count,
                "Stream ended with an object count mismatch"
            );
        }
        Ok(complete)
    }

    fn advance(&mut self) -> Result<Option<(ObjectHeader, Range<usize>)>> {
        if let Some(e) = &self.failed {
            return Err(e.clone());
        }
        if self.exhausted {
            return Ok(None);
        }
        self.handle.checkpoint()?;

        let step = if self.header.is_streaming() {
            self.next_in_chunk()
        } else {
            self.next_flat()
        };
        let next = match step {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, objects = self.objects_read, "Stream read failed");
                self.failed = Some(e.clone());
                return Err(e);
            }
        };
        match next {
            Some(item) => {
                self.objects_read += 1;
                self.progress.record(0, 1);
                self.progress.report(self.on_progress.as_mut(), false);
                Ok(Some(item))
            }
            None => {
                self.exhausted = true;
                self.handle.mark_finalized();
                self.progress.report(self.on_progress.as_mut(), true);
                Ok(None)
            }
        }
    }

    fn next_in_chunk(&mut self) -> Result<Option<(ObjectHeader, Range<usize>)>> {
        while self.cursor >= self.buffer.len() {
            if self.chunk_objects_left != 0 {
                return Err(Error::structure(format!(
                    "chunk {} ended {} objects short",
                    self.chunks_read, self.chunk_objects_left
                )));
            }
            if !self.load_chunk()? {
                return Ok(None);
            }
        }

        let rest = &self.buffer[self.cursor..];
        if rest.len() < OBJECT_HEADER_SIZE {
            return Err(Error::structure(format!(
                "chunk {} has {} trailing bytes",
                self.chunks_read,
                rest.len()
            )));
        }
        if self.chunk_objects_left == 0 {
            return Err(Error::structure(format!(
                "chunk {} holds more objects than declared",
                self.chunks_read
            )));
        }
        let header = ObjectHeader::from_bytes(rest)?;
        let start = self.cursor + OBJECT_HEADER_SIZE;
        let end = start + header.data_size as usize;
        if end > self.buffer.len() {
            return Err(Error::structure(format!(
                "object {} declares {} bytes but chunk has {}",
                header.object_id,
                header.data_size,
                self.buffer.len() - start
            )));
        }
        self.cursor = end;
        self.chunk_objects_left -= 1;
        Ok(Some((header, start..end)))
    }

    fn load_chunk(&mut self) -> Result<bool> {
        let left = self.end - self.pos;
        if left == 0 {
            return Ok(false);
        }
        if left < CHUNK_HEADER_SIZE as u64 {
            return Err(Error::structure(format!(
                "{} trailing bytes after last chunk",
                left
            )));
        }

        let mut raw = [0u8; CHUNK_HEADER_SIZE];
        self.source.read_exact(&mut raw)?;
        let chunk = ChunkHeader::from_bytes(&raw)?;
        let body_len = chunk.chunk_size as usize;
        if body_len > self.config.max_memory_usage {
            return Err(Error::InvalidData(format!(
                "chunk of {} bytes exceeds memory limit of {}",
                body_len, self.config.max_memory_usage
            )));
        }
        if (body_len as u64) > left - CHUNK_HEADER_SIZE as u64 {
            return Err(Error::structure(format!(
                "chunk {} declares {} bytes but only {} remain",
                self.chunks_read,
                body_len,
                left - CHUNK_HEADER_SIZE as u64
            )));
        }

        let body = if chunk.is_compressed() {
            &mut self.staging
        } else {
            &mut self.buffer
        };
        body.clear();
        body.resize(body_len, 0);
        self.source.read_exact(body.as_mut_slice())?;

        if self.config.enable_checksums && chunk.checksum != 0 {
            let actual = checksum(body.as_slice());
            if actual != chunk.checksum {
                return Err(Error::ChecksumMismatch {
                    expected: chunk.checksum,
                    actual,
                });
            }
        }
        if chunk.is_compressed() {
            self.buffer = decode_block(&self.staging, self.config.max_memory_usage)?;
        }

        self.pos += (CHUNK_HEADER_SIZE + body_len) as u64;
        self.cursor = 0;
        self.chunk_objects_left = chunk.object_count;
        self.chunks_read += 1;
        self.progress.record((CHUNK_HEADER_SIZE + body_len) as u64, 0);
        debug!(
            chunk = self.chunks_read,
            objects = chunk.object_count,
            stored = body_len,
            "Loaded chunk"
        );
        Ok(true)
    }

    fn next_flat(&mut self) -> Result<Option<(ObjectHeader, Range<usize>)>> {
        let left = self.end - self.pos;
        if left == 0 {
            return Ok(None);
        }
        if left < OBJECT_HEADER_SIZE as u64 {
            return Err(Error::structure(format!(
                "{} trailing bytes after last object",
                left
            )));
        }

        let mut raw = [0u8; OBJECT_HEADER_SIZE];
        self.source.read_exact(&mut raw)?;
        let header = ObjectHeader::from_bytes(&raw)?;
        let size = header.data_size as usize;
        if size > self.config.max_memory_usage {
            return Err(Error::InvalidData(format!(
                "object of {} bytes exceeds memory limit of {}",
                size, self.config.max_memory_usage
            )));
        }
        if size as u64 > left - OBJECT_HEADER_SIZE as u64 {
            return Err(Error::structure(format!(
                "object {} declares {} bytes but only {} remain",
                header.object_id,
                size,
                left - OBJECT_HEADER_SIZE as u64
            )));
        }

        self.buffer.clear();
        self.buffer.resize(size, 0);
        self.source.read_exact(&mut self.buffer)?;
        self.pos += (OBJECT_HEADER_SIZE + size) as u64;
        self.progress.record((OBJECT_HEADER_SIZE + size) as u64, 0);
        Ok(Some((header, 0..size)))
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

impl<R: Read + Seek> fmt::Debug for StreamingReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingReader")
            .field("header", &self.header)
            .field("state", &self.handle.state())
            .field("objects_read", &self.objects_read)
            .field("chunks_read", &self.chunks_read)
            .field("failed", &self.failed.is_some())
            .finish_non_exhaustive()
    }
}
