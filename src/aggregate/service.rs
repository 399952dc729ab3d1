//! Cached, single-flight aggregation over the event store.
//!
//! Snapshots are cached per window and served while fresh. On a miss the
//! first caller takes the recompute lock and scans the store on the blocking
//! pool. Callers that queue up behind it re-check after acquiring the lock:
//! they get the snapshot it installed, or the fallback if it failed, and
//! never start a scan of their own. A scan that fails or runs past
//! `recompute_timeout` leaves the previous snapshot in place, and no new scan
//! starts until a timed-out one has returned.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::aggregate::snapshot::AggregateSnapshot;
use crate::collector::types::now_secs;
use crate::config::Config;
use crate::error::PersistenceError;
use crate::store::EventStore;

struct CachedSnapshot {
    snapshot: Arc<AggregateSnapshot>,
    computed_at: Instant,
}

/// Clears the in-flight flag when the blocking scan returns, even after its
/// caller stopped waiting.
struct ScanGuard(Arc<AtomicBool>);

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AggregationService {
    store: Arc<dyn EventStore>,
    freshness: Duration,
    recompute_timeout: Duration,
    cache: Mutex<HashMap<Option<Duration>, CachedSnapshot>>,
    /// When the last recompute for each window failed
    failures: Mutex<HashMap<Option<Duration>, Instant>>,
    recompute_lock: tokio::sync::Mutex<()>,
    scanning: Arc<AtomicBool>,
    last_generated: Mutex<Option<DateTime<Local>>>,
}

impl AggregationService {
    pub fn new(
        store: Arc<dyn EventStore>,
        freshness: Duration,
        recompute_timeout: Duration,
    ) -> Self {
        Self {
            store,
            freshness,
            recompute_timeout,
            cache: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            recompute_lock: tokio::sync::Mutex::new(()),
            scanning: Arc::new(AtomicBool::new(false)),
            last_generated: Mutex::new(None),
        }
    }

    pub fn from_config(store: Arc<dyn EventStore>, config: &Config) -> Self {
        Self::new(store, config.cache_freshness, config.recompute_timeout)
    }

    /// Statistics over the last `window` (all time when `None`).
    pub async fn snapshot(&self, window: Option<Duration>) -> Arc<AggregateSnapshot> {
        if let Some(snapshot) = self.fresh(window) {
            return snapshot;
        }

        let arrived = Instant::now();
        let _guard = self.recompute_lock.lock().await;
        if let Some(snapshot) = self.fresh(window) {
            return snapshot;
        }
        if self.failed_since(window, arrived) {
            debug!("Recompute failed while waiting, serving fallback");
            return self.fallback(window);
        }

        match self.recompute(window).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.failures.lock().remove(&window);
                self.cache.lock().insert(
                    window,
                    CachedSnapshot {
                        snapshot: snapshot.clone(),
                        computed_at: Instant::now(),
                    },
                );
                snapshot
            }
            Err(e) => {
                self.failures.lock().insert(window, Instant::now());
                let had_previous = self.cache.lock().contains_key(&window);
                warn!(
                    "Aggregate recompute failed ({}), serving {} snapshot",
                    e,
                    if had_previous { "previous" } else { "empty" }
                );
                self.fallback(window)
            }
        }
    }

    fn fresh(&self, window: Option<Duration>) -> Option<Arc<AggregateSnapshot>> {
        let cache = self.cache.lock();
        cache
            .get(&window)
            .filter(|cached| cached.computed_at.elapsed() < self.freshness)
            .map(|cached| cached.snapshot.clone())
    }

    fn failed_since(&self, window: Option<Duration>, since: Instant) -> bool {
        self.failures
            .lock()
            .get(&window)
            .is_some_and(|failed_at| *failed_at >= since)
    }

    /// The last good snapshot for `window`, stale or not, else an empty one.
    fn fallback(&self, window: Option<Duration>) -> Arc<AggregateSnapshot> {
        if let Some(cached) = self.cache.lock().get(&window) {
            return cached.snapshot.clone();
        }
        let window_start = window.map(|w| now_secs() - w.as_secs_f64());
        Arc::new(AggregateSnapshot::empty(window_start, Local::now()))
    }

    async fn recompute(
        &self,
        window: Option<Duration>,
    ) -> Result<AggregateSnapshot, PersistenceError> {
        if self.scanning.swap(true, Ordering::AcqRel) {
            return Err(PersistenceError::Busy);
        }
        let guard = ScanGuard(self.scanning.clone());

        let cutoff = window.map(|w| now_secs() - w.as_secs_f64());
        let store = self.store.clone();
        let started = Instant::now();

        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            compute(store.as_ref(), cutoff)
        });
        let mut snapshot = match tokio::time::timeout(self.recompute_timeout, task).await {
            Err(_) => return Err(PersistenceError::Timeout),
            Ok(Err(join_error)) => return Err(PersistenceError::Task(join_error.to_string())),
            Ok(Ok(result)) => result?,
        };

        snapshot.generated_at = self.next_generation_time();
        debug!("Aggregate recomputed in {:?}", started.elapsed());
        Ok(snapshot)
    }

    /// Wall-clock time, nudged forward so it never repeats or goes back.
    fn next_generation_time(&self) -> DateTime<Local> {
        let mut last = self.last_generated.lock();
        let now = Local::now();
        let next = match *last {
            Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }
}

fn compute(
    store: &dyn EventStore,
    cutoff: Option<f64>,
) -> Result<AggregateSnapshot, PersistenceError> {
    let mut snapshot = AggregateSnapshot::from_events(store.scan(cutoff)?, cutoff, Local::now());
    snapshot.store_size_bytes = store.size_bytes()?;
    snapshot.logging_since = store.created_at().ok();
    Ok(snapshot)
}
