//! Pause/resume/interrupt gate shared between a stream and its controllers.
//!
//! The stream calls `checkpoint()` before every object and chunk. A paused
//! stream blocks there on a condvar until it is resumed or interrupted; an
//! interrupted stream fails every subsequent checkpoint.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vellum_core::{Error, Result};

/// Lifecycle state of a streaming writer or reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Created, nothing processed yet
    Open,
    /// Processing objects
    Active,
    /// Blocked at the next checkpoint until resumed
    Paused,
    /// Header finalized or all input consumed
    Finalized,
    /// Cancelled; absorbing
    Interrupted,
}

#[derive(Debug)]
struct StreamControl {
    state: Mutex<StreamState>,
    changed: Condvar,
    paused: AtomicBool,
    interrupted: AtomicBool,
}

/// Cloneable, thread-safe control handle for a stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    inner: Arc<StreamControl>,
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHandle {
    /// Create a handle in the `Open` state.
    pub fn new() -> Self {
        StreamHandle {
            inner: Arc::new(StreamControl {
                state: Mutex::new(StreamState::Open),
                changed: Condvar::new(),
                paused: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        *self.inner.state.lock()
    }

    /// Request a pause. Takes effect at the stream's next checkpoint.
    ///
    /// No-op once the stream is finalized or interrupted.
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        if matches!(*state, StreamState::Open | StreamState::Active) {
            self.inner.paused.store(true, Ordering::Release);
            *state = StreamState::Paused;
        }
    }

    /// Resume a paused stream.
    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        if *state == StreamState::Paused {
            self.inner.paused.store(false, Ordering::Release);
            *state = StreamState::Active;
            self.inner.changed.notify_all();
        }
    }

    /// Interrupt the stream. Wakes a paused stream so it can fail promptly.
    pub fn interrupt(&self) {
        let mut state = self.inner.state.lock();
        if *state != StreamState::Finalized {
            self.inner.interrupted.store(true, Ordering::Release);
            self.inner.paused.store(false, Ordering::Release);
            *state = StreamState::Interrupted;
            self.inner.changed.notify_all();
        }
    }

    /// Whether a pause is in effect.
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Whether the stream has been interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::Acquire)
    }

    /// Block while paused, then fail if interrupted or finalized.
    ///
    /// Moves an `Open` stream to `Active`.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        if !self.is_paused() && !self.is_interrupted() {
            let mut state = self.inner.state.lock();
            return match *state {
                StreamState::Open => {
                    *state = StreamState::Active;
                    Ok(())
                }
                StreamState::Finalized => {
                    Err(Error::InvalidState("stream already finalized".into()))
                }
                StreamState::Interrupted => Err(Error::Interrupted),
                StreamState::Active | StreamState::Paused => Ok(()),
            };
        }

        let mut state = self.inner.state.lock();
        while *state == StreamState::Paused {
            self.inner.changed.wait(&mut state);
        }
        match *state {
            StreamState::Interrupted => Err(Error::Interrupted),
            StreamState::Finalized => Err(Error::InvalidState("stream already finalized".into())),
            _ => Ok(()),
        }
    }

    /// Mark the stream finalized. Interrupted streams keep their state.
    pub(crate) fn mark_finalized(&self) {
        let mut state = self.inner.state.lock();
        if *state != StreamState::Interrupted {
            *state = StreamState::Finalized;
            self.inner.paused.store(false, Ordering::Release);
            self.inner.changed.notify_all();
        }
    }
}
