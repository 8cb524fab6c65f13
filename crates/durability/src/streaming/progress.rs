//! Progress reporting and callback types.

use std::time::{Duration, Instant};
use vellum_core::{Error, TypeId};

/// Snapshot of a stream's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingProgress {
    /// Bytes written or read so far
    pub bytes_processed: u64,
    /// Objects written or read so far
    pub objects_processed: u64,
    /// Total bytes, when known (readers only)
    pub total_bytes: Option<u64>,
    /// Total objects, when known (readers only)
    pub total_objects: Option<u64>,
    /// Time since the stream started
    pub elapsed: Duration,
    /// Linear estimate of the time left, when totals are known
    pub estimated_remaining: Option<Duration>,
}

impl StreamingProgress {
    /// Completion percentage in `0.0..=100.0`, or `None` without a byte total.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.bytes_processed as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

/// Progress callback.
pub type ProgressCallback = Box<dyn FnMut(&StreamingProgress) + Send>;

/// Error callback; receives every error a stream operation returns.
pub type ErrorCallback = Box<dyn FnMut(&Error) + Send>;

/// Object callback: `(type, object id, payload)`.
pub type ObjectCallback = Box<dyn FnMut(TypeId, u32, &[u8]) + Send>;

/// Counts progress and throttles callback delivery.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    started: Instant,
    last_report: Option<Instant>,
    interval: Duration,
    enabled: bool,
    bytes: u64,
    objects: u64,
    total_bytes: Option<u64>,
    total_objects: Option<u64>,
}

impl ProgressTracker {
    pub(crate) fn new(enabled: bool, interval: Duration) -> Self {
        ProgressTracker {
            started: Instant::now(),
            last_report: None,
            interval,
            enabled,
            bytes: 0,
            objects: 0,
            total_bytes: None,
            total_objects: None,
        }
    }

    pub(crate) fn with_totals(mut self, bytes: u64, objects: u64) -> Self {
        self.total_bytes = Some(bytes);
        self.total_objects = Some(objects);
        self
    }

    pub(crate) fn record(&mut self, bytes: u64, objects: u64) {
        self.bytes += bytes;
        self.objects += objects;
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn objects(&self) -> u64 {
        self.objects
    }

    pub(crate) fn snapshot(&self) -> StreamingProgress {
        let elapsed = self.started.elapsed();
        let estimated_remaining = match self.total_bytes {
            Some(total) if self.bytes > 0 && total > self.bytes => {
                let rate = elapsed.as_secs_f64() / self.bytes as f64;
                Some(Duration::from_secs_f64(rate * (total - self.bytes) as f64))
            }
            Some(_) if self.bytes > 0 => Some(Duration::ZERO),
            _ => None,
        };
        StreamingProgress {
            bytes_processed: self.bytes,
            objects_processed: self.objects,
            total_bytes: self.total_bytes,
            total_objects: self.total_objects,
            elapsed,
            estimated_remaining,
        }
    }

    /// Deliver a snapshot if enabled and the interval has elapsed (or `force`).
    pub(crate) fn report(&mut self, callback: Option<&mut ProgressCallback>, force: bool) {
        let Some(callback) = callback else {
            return;
        };
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let due = match self.last_report {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if due || force {
            self.last_report = Some(now);
            callback(&self.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_percentage_without_totals() {
        let tracker = ProgressTracker::new(true, Duration::ZERO);
        assert_eq!(tracker.snapshot().percentage(), None);
    }

    #[test]
    fn test_percentage_with_totals() {
        let mut tracker = ProgressTracker::new(true, Duration::ZERO).with_totals(200, 4);
        tracker.record(50, 1);
        let snap = tracker.snapshot();
        assert_eq!(snap.percentage(), Some(25.0));
        assert_eq!(snap.total_objects, Some(4));
        assert!(snap.estimated_remaining.is_some());
    }

    #[test]
    fn test_report_throttled() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut callback: ProgressCallback = Box::new(move |_| *counter.lock().unwrap() += 1);

        let mut tracker = ProgressTracker::new(true, Duration::from_secs(3600));
        for _ in 0..10 {
            tracker.record(1, 1);
            tracker.report(Some(&mut callback), false);
        }
        assert_eq!(*calls.lock().unwrap(), 1);

        tracker.report(Some(&mut callback), true);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_report_disabled() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut callback: ProgressCallback = Box::new(move |_| *counter.lock().unwrap() += 1);

        let mut tracker = ProgressTracker::new(false, Duration::ZERO);
        tracker.report(Some(&mut callback), true);
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
