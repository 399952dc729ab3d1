//! Capture -> buffer -> flush pipeline.
//!
//! [`Pipeline`] owns the shared state that producers and the flush worker
//! communicate through. It is created once at startup and handed to the
//! components that need it.

pub mod flush;
pub mod queue;
pub mod stats;

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::PersistenceError;
use crate::store::{CsvStore, EventStore};

pub use flush::{CumulativeDistance, FlushHandle, FlushWorker};
pub use queue::IngestionQueue;
pub use stats::{FlushStats, FlushStatsSnapshot};

/// Shared pipeline state.
#[derive(Clone)]
pub struct Pipeline {
    pub queue: Arc<IngestionQueue>,
    pub store: Arc<dyn EventStore>,
    pub cumulative: Arc<CumulativeDistance>,
    pub stats: Arc<FlushStats>,
}

impl Pipeline {
    /// Open the configured log file and recover the cumulative distance.
    pub fn open(config: &Config) -> Result<Self, PersistenceError> {
        let store = CsvStore::open(config.log_path())?;
        Self::with_store(Arc::new(store))
    }

    /// Build a pipeline around an existing store.
    pub fn with_store(store: Arc<dyn EventStore>) -> Result<Self, PersistenceError> {
        let cumulative = CumulativeDistance::recover(store.as_ref())?;
        info!("Recovered cumulative distance: {:.3} in", cumulative.get());

        Ok(Self {
            queue: Arc::new(IngestionQueue::new()),
            store,
            cumulative: Arc::new(cumulative),
            stats: Arc::new(FlushStats::new()),
        })
    }

    /// A flush worker draining this pipeline's queue into its store.
    pub fn flush_worker(&self) -> FlushWorker {
        FlushWorker::new(
            self.queue.clone(),
            self.store.clone(),
            self.cumulative.clone(),
            self.stats.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{Position, RawEvent};
    use tempfile::tempdir;

    #[test]
    fn test_open_with_config_paths() {
        let dir = tempdir().unwrap();
        let config = Config {
            data_path: dir.path().to_path_buf(),
            ..Config::default()
        };

        let pipeline = Pipeline::open(&config).unwrap();
        pipeline.queue.enqueue(RawEvent::moved(1.0, Position::new(5.0, 5.0), 2.0));
        pipeline.flush_worker().flush_once().unwrap();

        assert!(config.log_path().exists());
        assert_eq!(pipeline.cumulative.get(), 2.0);
        assert_eq!(pipeline.stats.snapshot().events_written, 1);

        let reopened = Pipeline::open(&config).unwrap();
        assert_eq!(reopened.cumulative.get(), 2.0);
    }
}
