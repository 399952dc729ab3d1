//! Flush statistics.
//!
//! Lock-free counters updated by the flush worker and read by the health
//! endpoint and the shutdown summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct FlushStats {
    /// Batches appended to the store
    batches_written: AtomicU64,
    /// Events appended to the store
    events_written: AtomicU64,
    /// Append attempts that failed
    failed_writes: AtomicU64,
    /// Events held in memory after a failed append
    events_retained: AtomicU64,
    /// Worker start time
    started_at: DateTime<Utc>,
}

impl FlushStats {
    pub fn new() -> Self {
        Self {
            batches_written: AtomicU64::new(0),
            events_written: AtomicU64::new(0),
            failed_writes: AtomicU64::new(0),
            events_retained: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Record a successful append of `events` events.
    pub fn record_batch(&self, events: u64) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.events_written.fetch_add(events, Ordering::Relaxed);
        self.events_retained.store(0, Ordering::Relaxed);
    }

    /// Record a failed append that left `retained` events in memory.
    pub fn record_failure(&self, retained: u64) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
        self.events_retained.store(retained, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            batches_written: self.batches_written.load(Ordering::Relaxed),
            events_written: self.events_written.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            events_retained: self.events_retained.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Flush Statistics:\n\
             - Batches written: {}\n\
             - Events written: {}\n\
             - Failed writes: {}\n\
             - Events still in memory: {}\n\
             - Uptime: {} seconds",
            stats.batches_written,
            stats.events_written,
            stats.failed_writes,
            stats.events_retained,
            stats.uptime_secs
        )
    }
}

impl Default for FlushStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`FlushStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushStatsSnapshot {
    pub batches_written: u64,
    pub events_written: u64,
    pub failed_writes: u64,
    pub events_retained: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = FlushStats::new();
        stats.record_batch(10);
        stats.record_failure(4);
        stats.record_batch(6);

        let snap = stats.snapshot();
        assert_eq!(snap.batches_written, 2);
        assert_eq!(snap.events_written, 16);
        assert_eq!(snap.failed_writes, 1);
        assert_eq!(snap.events_retained, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = FlushStats::new();
        stats.record_failure(3);
        let summary = stats.summary();
        assert!(summary.contains("Failed writes: 1"));
        assert!(summary.contains("Events still in memory: 3"));
    }
}
