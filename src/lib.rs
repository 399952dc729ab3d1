//! Activity Logger - records pointer, keyboard and controller activity and
//! serves windowed statistics to a local dashboard.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌─────────────┐   ┌────────────┐
//! │  Collector   │──▶│ Ingestion  │──▶│    Flush    │──▶│  CsvStore  │
//! │ (sources +   │   │   Queue    │   │   Worker    │   │  (log.csv) │
//! │  producers)  │   └────────────┘   └─────────────┘   └─────┬──────┘
//! └──────────────┘                                            │ scan
//!                                                             ▼
//!        ┌──────────────┐    ┌────────────┐          ┌─────────────────┐
//!        │   Session    │◀───│   Server   │─────────▶│   Aggregation   │
//!        │   Tracker    │    │  (axum)    │ snapshot │ (cached, single │
//!        └──────────────┘    └────────────┘          │     flight)     │
//!                                                    └─────────────────┘
//! ```
//!
//! Capture callbacks only append to the queue. The flush worker is the only
//! writer of the log, and the log is the only source the statistics are
//! computed from.
//!
//! # Example
//!
//! ```no_run
//! use activity_logger::{collector, Config, Pipeline};
//!
//! let config = Config::load().expect("config");
//! let pipeline = Pipeline::open(&config).expect("open log");
//! let flush = pipeline.flush_worker().spawn(config.flush_interval);
//!
//! let collector_config = collector::CollectorConfig::from_config(&config);
//! let mut collector = collector::Collector::new(collector_config.clone(), pipeline.queue.clone());
//! collector.add_source(collector::platform_source(&collector_config));
//! collector.start().expect("start capture");
//!
//! // ... later
//! collector.stop();
//! flush.shutdown();
//! ```

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod distance;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod store;

// Re-export key types at crate root for convenience
pub use aggregate::{AggregateSnapshot, AggregationService, TimeWindow};
pub use collector::{Collector, CollectorConfig, RawEvent, RawInput};
pub use config::{Config, SourceConfig};
pub use error::{CaptureError, ConfigError, ParseError, PersistenceError};
pub use pipeline::{FlushStats, IngestionQueue, Pipeline};
pub use session::SessionTracker;
pub use store::{CsvStore, EventStore};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Timestamp layout used by the dashboard, e.g. `2024-03-01 09:15:02 PM`.
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";
