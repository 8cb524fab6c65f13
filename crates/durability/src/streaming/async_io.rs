//! Background-thread wrappers for the streaming writer and reader.
//!
//! Each wrapper owns its stream on a dedicated named thread. Writer calls are
//! queued and applied strictly in submission order; every call returns a
//! [`Pending`] handle that resolves once the worker has applied it.

use super::control::StreamHandle;
use super::reader::StreamingReader;
use super::writer::StreamingWriter;
use crate::format::FileHeader;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{Read, Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};
use vellum_core::{Error, Result, TypeId};

struct Slot<T> {
    value: Mutex<Option<Result<T>>>,
    ready: Condvar,
}

/// Result of an operation running on a background thread.
pub struct Pending<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Pending<T> {
    /// Whether the result is available.
    pub fn is_ready(&self) -> bool {
        self.slot.value.lock().is_some()
    }

    /// Block until the operation completes.
    pub fn wait(self) -> Result<T> {
        let mut value = self.slot.value.lock();
        loop {
            if let Some(result) = value.take() {
                return result;
            }
            self.slot.ready.wait(&mut value);
        }
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Worker side of a [`Pending`]. Resolves to an error if dropped unfulfilled.
struct Completer<T> {
    slot: Option<Arc<Slot<T>>>,
}

impl<T> Completer<T> {
    fn complete(mut self, result: Result<T>) {
        if let Some(slot) = self.slot.take() {
            *slot.value.lock() = Some(result);
            slot.ready.notify_all();
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            *slot.value.lock() = Some(Err(Error::InvalidState("operation abandoned".into())));
            slot.ready.notify_all();
        }
    }
}

fn pending<T>() -> (Pending<T>, Completer<T>) {
    let slot = Arc::new(Slot {
        value: Mutex::new(None),
        ready: Condvar::new(),
    });
    (
        Pending {
            slot: Arc::clone(&slot),
        },
        Completer { slot: Some(slot) },
    )
}

enum Command {
    Write {
        type_id: TypeId,
        object_id: u32,
        payload: Vec<u8>,
        done: Completer<()>,
    },
    Flush {
        done: Completer<()>,
    },
    Finalize {
        done: Completer<FileHeader>,
    },
}

struct CommandQueue {
    commands: Mutex<VecDeque<Command>>,
    work_ready: Condvar,
    shutdown: AtomicBool,
}

/// A [`StreamingWriter`] driven from a background thread.
pub struct AsyncStreamingWriter {
    queue: Arc<CommandQueue>,
    handle: StreamHandle,
    worker: Option<JoinHandle<()>>,
}

impl AsyncStreamingWriter {
    /// Move `writer` onto a worker thread named `vellum-stream-writer`.
    pub fn spawn<W>(writer: StreamingWriter<W>) -> Result<Self>
    where
        W: Write + Seek + Send + 'static,
    {
        let queue = Arc::new(CommandQueue {
            commands: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let handle = writer.handle();
        let worker_queue = Arc::clone(&queue);
        let worker = std::thread::Builder::new()
            .name("vellum-stream-writer".into())
            .spawn(move || writer_loop(writer, &worker_queue))?;

        Ok(AsyncStreamingWriter {
            queue,
            handle,
            worker: Some(worker),
        })
    }

    /// Control handle of the underlying writer.
    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Pause the writer at its next object.
    pub fn pause(&self) {
        self.handle.pause();
    }

    /// Resume a paused writer.
    pub fn resume(&self) {
        self.handle.resume();
    }

    /// Interrupt the writer; queued and later writes fail.
    pub fn interrupt(&self) {
        self.handle.interrupt();
    }

    /// Queue one object.
    pub fn write_object(
        &self,
        type_id: TypeId,
        object_id: u32,
        payload: impl Into<Vec<u8>>,
    ) -> Pending<()> {
        let (result, done) = pending();
        self.submit(Command::Write {
            type_id,
            object_id,
            payload: payload.into(),
            done,
        });
        result
    }

    /// Queue a chunk flush.
    pub fn flush_chunk(&self) -> Pending<()> {
        let (result, done) = pending();
        self.submit(Command::Flush { done });
        result
    }

    /// Queue finalization.
    pub fn finalize(&self) -> Pending<FileHeader> {
        let (result, done) = pending();
        self.submit(Command::Finalize { done });
        result
    }

    /// Drain queued commands and join the worker.
    ///
    /// A paused writer is resumed so the queue can drain. The writer is
    /// dropped on the worker, which finalizes it unless it was interrupted.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.handle.resume();
        self.queue.shutdown.store(true, Ordering::Release);
        {
            let _commands = self.queue.commands.lock();
            self.queue.work_ready.notify_all();
        }
        if worker.join().is_err() {
            warn!("Stream writer thread panicked");
        }
    }

    // Commands submitted after shutdown are dropped, resolving their
    // `Pending` to an error.
    fn submit(&self, command: Command) {
        if self.queue.shutdown.load(Ordering::Acquire) {
            return;
        }
        self.queue.commands.lock().push_back(command);
        self.queue.work_ready.notify_one();
    }
}

impl Drop for AsyncStreamingWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AsyncStreamingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncStreamingWriter")
            .field("state", &self.handle.state())
            .field("queued", &self.queue.commands.lock().len())
            .finish()
    }
}

fn writer_loop<W: Write + Seek>(mut writer: StreamingWriter<W>, queue: &CommandQueue) {
    loop {
        let command = {
            let mut commands = queue.commands.lock();
            loop {
                if let Some(command) = commands.pop_front() {
                    break Some(command);
                }
                if queue.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                queue.work_ready.wait(&mut commands);
            }
        };
        let Some(command) = command else {
            break;
        };

        match command {
            Command::Write {
                type_id,
                object_id,
                payload,
                done,
            } => done.complete(writer.write_object(type_id, object_id, &payload)),
            Command::Flush { done } => done.complete(writer.flush_chunk()),
            Command::Finalize { done } => done.complete(writer.finalize()),
        }
    }
    debug!(objects = writer.object_count(), "Stream writer thread exiting");
}

/// A [`StreamingReader::read_all`] running on a background thread.
pub struct AsyncStreamingReader {
    handle: StreamHandle,
    result: Option<Pending<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncStreamingReader {
    /// Start reading every object of `reader` on a thread named
    /// `vellum-stream-reader`. Objects go to the reader's object callback.
    pub fn read_all_async<R>(mut reader: StreamingReader<R>) -> Result<Self>
    where
        R: Read + Seek + Send + 'static,
    {
        let handle = reader.handle();
        let (result, done) = pending();
        let worker = std::thread::Builder::new()
            .name("vellum-stream-reader".into())
            .spawn(move || done.complete(reader.read_all()))?;
        Ok(AsyncStreamingReader {
            handle,
            result: Some(result),
            worker: Some(worker),
        })
    }

    /// Control handle of the underlying reader.
    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Pause the reader at its next object.
    pub fn pause(&self) {
        self.handle.pause();
    }

    /// Resume a paused reader.
    pub fn resume(&self) {
        self.handle.resume();
    }

    /// Interrupt the reader.
    pub fn interrupt(&self) {
        self.handle.interrupt();
    }

    /// Whether `read_all` has returned.
    pub fn is_done(&self) -> bool {
        self.result.as_ref().map_or(true, Pending::is_ready)
    }

    /// Block until `read_all` returns and yield its result.
    pub fn wait(mut self) -> Result<bool> {
        let result = match self.result.take() {
            Some(pending) => pending.wait(),
            None => Err(Error::InvalidState("result already taken".into())),
        };
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Stream reader thread panicked");
            }
        }
        result
    }
}

impl Drop for AsyncStreamingReader {
    // An abandoned read is interrupted so the worker can exit.
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.handle.interrupt();
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for AsyncStreamingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncStreamingReader")
            .field("state", &self.handle.state())
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{StreamState, StreamingConfig};
    use std::io::Cursor;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_async_writer_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("async.vgb");
        let writer = StreamingWriter::create(&path, StreamingConfig::for_testing()).unwrap();
        let async_writer = AsyncStreamingWriter::spawn(writer).unwrap();

        let pending: Vec<_> = (0..100)
            .map(|i| async_writer.write_object(TypeId::CIRCLE, i, vec![i as u8; 12]))
            .collect();
        let header = async_writer.finalize().wait().unwrap();
        for p in pending {
            p.wait().unwrap();
        }
        assert_eq!(header.object_count, 100);
        drop(async_writer);

        let mut reader = StreamingReader::open(&path, StreamingConfig::for_testing()).unwrap();
        let mut expected = 0;
        while let Some(object) = reader.next_object().unwrap() {
            assert_eq!(object.object_id(), expected);
            expected += 1;
        }
        assert_eq!(expected, 100);
    }

    #[test]
    fn test_async_writer_interrupt_fails_queued_writes() {
        let writer =
            StreamingWriter::new(Cursor::new(Vec::new()), StreamingConfig::for_testing()).unwrap();
        let async_writer = AsyncStreamingWriter::spawn(writer).unwrap();
        async_writer.interrupt();
        let result = async_writer.write_object(TypeId::POINT2D, 1, vec![0u8; 8]).wait();
        assert!(matches!(result, Err(Error::Interrupted)));
        assert_eq!(async_writer.handle().state(), StreamState::Interrupted);
    }

    #[test]
    fn test_async_writer_drop_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drop.vgb");
        {
            let writer = StreamingWriter::create(&path, StreamingConfig::for_testing()).unwrap();
            let async_writer = AsyncStreamingWriter::spawn(writer).unwrap();
            async_writer.write_object(TypeId::LINE, 1, vec![1u8; 16]);
        }
        let bytes = std::fs::read(&path).unwrap();
        let header = FileHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.object_count, 1);
    }

    #[test]
    fn test_async_reader() {
        let mut writer =
            StreamingWriter::new(Cursor::new(Vec::new()), StreamingConfig::for_testing()).unwrap();
        for i in 0..25 {
            writer.write_object(TypeId::ELLIPSE, i, &[0u8; 20]).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();

        let seen = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&seen);
        let mut reader =
            StreamingReader::new(Cursor::new(bytes), StreamingConfig::for_testing()).unwrap();
        reader.set_object_callback(Box::new(move |_, _, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        let task = AsyncStreamingReader::read_all_async(reader).unwrap();
        assert!(task.wait().unwrap());
        assert_eq!(seen.load(Ordering::Relaxed), 25);
    }

    #[test]
    fn test_abandoned_completer_resolves_error() {
        let (result, done) = pending::<u32>();
        drop(done);
        assert!(result.is_ready());
        assert!(matches!(result.wait(), Err(Error::InvalidState(_))));
    }
}
