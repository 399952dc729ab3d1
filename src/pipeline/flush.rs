//! Background flush worker.
//!
//! The worker cycles `WAIT(interval) -> DRAIN -> WRITE`. A batch that fails
//! to write is kept in memory and retried, ahead of newer events, on the next
//! cycle. A zero interval runs exactly one cycle and returns, which makes the
//! worker easy to drive from tests.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::collector::types::RawEvent;
use crate::error::PersistenceError;
use crate::pipeline::queue::IngestionQueue;
use crate::pipeline::stats::FlushStats;
use crate::store::EventStore;

/// Running total of persisted movement distance, in inches.
///
/// Only advanced after a batch is durably appended, so at any observation
/// point it equals the sum of the persisted `distance_in_inches` values.
#[derive(Debug, Default)]
pub struct CumulativeDistance {
    total: Mutex<f64>,
}

impl CumulativeDistance {
    pub fn new(initial: f64) -> Self {
        Self {
            total: Mutex::new(initial),
        }
    }

    /// Rebuild the total by summing every movement in the store.
    pub fn recover(store: &dyn EventStore) -> Result<Self, PersistenceError> {
        let total: f64 = store.scan(None)?.filter_map(|e| e.distance()).sum();
        Ok(Self::new(total))
    }

    pub fn get(&self) -> f64 {
        *self.total.lock()
    }

    fn add(&self, inches: f64) {
        *self.total.lock() += inches;
    }
}

pub struct FlushWorker {
    queue: Arc<IngestionQueue>,
    store: Arc<dyn EventStore>,
    cumulative: Arc<CumulativeDistance>,
    stats: Arc<FlushStats>,
    /// Events from failed writes, oldest first
    retained: Vec<RawEvent>,
}

impl FlushWorker {
    pub fn new(
        queue: Arc<IngestionQueue>,
        store: Arc<dyn EventStore>,
        cumulative: Arc<CumulativeDistance>,
        stats: Arc<FlushStats>,
    ) -> Self {
        Self {
            queue,
            store,
            cumulative,
            stats,
            retained: Vec::new(),
        }
    }

    /// Run one DRAIN -> WRITE cycle. Returns how many events were written.
    pub fn flush_once(&mut self) -> Result<usize, PersistenceError> {
        self.retained.extend(self.queue.drain());
        if self.retained.is_empty() {
            return Ok(0);
        }

        match self.store.append(&self.retained) {
            Ok(()) => {
                let batch = std::mem::take(&mut self.retained);
                let moved: f64 = batch.iter().filter_map(RawEvent::distance).sum();
                self.cumulative.add(moved);
                self.stats.record_batch(batch.len() as u64);
                info!("Events written: {}", batch.len());
                Ok(batch.len())
            }
            Err(e) => {
                self.stats.record_failure(self.retained.len() as u64);
                warn!(
                    "Flush failed, keeping {} events for the next cycle: {}",
                    self.retained.len(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Number of events held back by failed writes.
    pub fn retained(&self) -> usize {
        self.retained.len()
    }

    /// Run cycles until `shutdown` fires or its sender is dropped, then
    /// flush one last time.
    pub fn run(mut self, interval: Duration, shutdown: crossbeam_channel::Receiver<()>) -> Self {
        if interval.is_zero() {
            let _ = self.flush_once();
            return self;
        }

        loop {
            match shutdown.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let _ = self.flush_once();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!("Flush worker stopping, running final flush");
        if self.flush_once().is_err() {
            error!(
                "Final flush failed, {} events will be lost at exit",
                self.retained.len()
            );
        }
        self
    }

    /// Move the worker onto its own thread.
    pub fn spawn(self, interval: Duration) -> FlushHandle {
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let thread = thread::Builder::new()
            .name("flush-worker".into())
            .spawn(move || self.run(interval, shutdown_rx));

        match thread {
            Ok(handle) => FlushHandle {
                shutdown: shutdown_tx,
                thread: Some(handle),
            },
            Err(e) => {
                error!("Could not spawn flush worker thread: {}", e);
                FlushHandle {
                    shutdown: shutdown_tx,
                    thread: None,
                }
            }
        }
    }
}

/// Handle to a flush worker running on its own thread.
pub struct FlushHandle {
    shutdown: Sender<()>,
    thread: Option<JoinHandle<FlushWorker>>,
}

impl FlushHandle {
    /// Signal the worker, wait for its final flush, and return it.
    pub fn shutdown(mut self) -> Option<FlushWorker> {
        let _ = self.shutdown.try_send(());
        self.thread.take().and_then(|handle| handle.join().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{PointerButton, Position};
    use crate::store::CsvStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    /// Wraps a real store and fails appends while `failing` is set.
    struct FlakyStore {
        inner: CsvStore,
        failing: AtomicBool,
    }

    impl EventStore for FlakyStore {
        fn append(&self, batch: &[RawEvent]) -> Result<(), PersistenceError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PersistenceError::Io(std::io::Error::other("disk full")));
            }
            self.inner.append(batch)
        }

        fn scan(
            &self,
            since: Option<f64>,
        ) -> Result<crate::store::EventIter<'_>, PersistenceError> {
            self.inner.scan(since)
        }

        fn size_bytes(&self) -> Result<u64, PersistenceError> {
            self.inner.size_bytes()
        }

        fn created_at(&self) -> Result<chrono::DateTime<chrono::Local>, PersistenceError> {
            self.inner.created_at()
        }
    }

    fn worker_for(
        store: Arc<dyn EventStore>,
    ) -> (FlushWorker, Arc<IngestionQueue>, Arc<CumulativeDistance>) {
        let queue = Arc::new(IngestionQueue::new());
        let cumulative = Arc::new(CumulativeDistance::recover(store.as_ref()).unwrap());
        let worker = FlushWorker::new(
            queue.clone(),
            store,
            cumulative.clone(),
            Arc::new(FlushStats::new()),
        );
        (worker, queue, cumulative)
    }

    #[test]
    fn test_one_shot_cycle_with_zero_interval() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn EventStore> =
            Arc::new(CsvStore::open(dir.path().join("log.csv")).unwrap());
        let (worker, queue, cumulative) = worker_for(store.clone());

        queue.enqueue(RawEvent::moved(1.0, Position::new(10.0, 0.0), 0.5));
        queue.enqueue(RawEvent::key(2.0, true));

        let (_tx, rx) = bounded(1);
        let worker = worker.run(Duration::ZERO, rx);

        assert_eq!(worker.retained(), 0);
        assert!(queue.is_empty());
        assert_eq!(store.scan(None).unwrap().count(), 2);
        assert!((cumulative.get() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_failed_batch_is_retained_and_retried_in_order() {
        let dir = tempdir().unwrap();
        let flaky = Arc::new(FlakyStore {
            inner: CsvStore::open(dir.path().join("log.csv")).unwrap(),
            failing: AtomicBool::new(true),
        });
        let (mut worker, queue, cumulative) = worker_for(flaky.clone());

        queue.enqueue(RawEvent::moved(1.0, Position::new(1.0, 0.0), 0.25));
        assert!(worker.flush_once().is_err());
        assert_eq!(worker.retained(), 1);
        assert_eq!(cumulative.get(), 0.0);

        queue.enqueue(RawEvent::key(2.0, true));
        assert!(worker.flush_once().is_err());
        assert_eq!(worker.retained(), 2);

        flaky.failing.store(false, Ordering::SeqCst);
        assert_eq!(worker.flush_once().unwrap(), 2);
        assert_eq!(worker.retained(), 0);

        let timestamps: Vec<f64> = flaky.scan(None).unwrap().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![1.0, 2.0]);
        assert!((cumulative.get() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_shutdown_runs_final_flush() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn EventStore> =
            Arc::new(CsvStore::open(dir.path().join("log.csv")).unwrap());
        let (worker, queue, _) = worker_for(store.clone());

        // Long interval: only the shutdown flush can write these.
        let handle = worker.spawn(Duration::from_secs(3600));
        queue.enqueue(RawEvent::click(1.0, PointerButton::Left, Position::new(0.0, 0.0), true));
        queue.enqueue(RawEvent::click(1.1, PointerButton::Left, Position::new(0.0, 0.0), false));

        let worker = handle.shutdown().unwrap();
        assert_eq!(worker.retained(), 0);
        assert_eq!(store.scan(None).unwrap().count(), 2);
    }

    #[test]
    fn test_restart_recovers_cumulative_distance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let persisted_total = {
            let store: Arc<dyn EventStore> = Arc::new(CsvStore::open(&path).unwrap());
            let (mut worker, queue, cumulative) = worker_for(store);
            queue.enqueue(RawEvent::moved(1.0, Position::new(100.0, 0.0), 1.227));
            queue.enqueue(RawEvent::moved(2.0, Position::new(200.0, 0.0), 0.3));
            worker.flush_once().unwrap();
            queue.enqueue(RawEvent::moved(3.0, Position::new(250.0, 0.0), 0.125));
            worker.flush_once().unwrap();
            cumulative.get()
        };

        let reopened = CsvStore::open(&path).unwrap();
        let recovered = CumulativeDistance::recover(&reopened).unwrap();
        assert_eq!(recovered.get(), persisted_total);
        assert!((persisted_total - 1.652).abs() < 1e-9);
    }
}
