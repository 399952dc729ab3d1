//! Input capture.
//!
//! A [`CaptureSource`] delivers [`RawInput`]s on its own thread; the
//! [`Producer`]s attached to that thread turn them into [`RawEvent`]s on the
//! shared [`IngestionQueue`]. The [`Collector`] owns the threads and restarts
//! sources that fail with a retryable error.
//!
//! [`RawEvent`]: types::RawEvent

pub mod controller;
pub mod producer;
pub mod source;
pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod noop;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::{Config, SourceConfig};
use crate::error::CaptureError;
use crate::pipeline::IngestionQueue;

pub use controller::{AxisLatch, ControllerConfig, ControllerProducer, LatchState};
pub use producer::{KeyboardProducer, PointerProducer, Producer};
pub use source::{Backoff, CaptureSource, ChannelSource};
pub use types::{
    Capability, EventKind, EventTag, GamepadButton, PointerButton, Position, RawEvent, RawInput,
};

#[cfg(target_os = "macos")]
pub use macos::{check_permission, MacOSSource};

#[cfg(not(target_os = "macos"))]
pub use noop::{check_permission, NoopSource};

/// What producers need to know, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub sources: SourceConfig,
    /// Pixels per inch of the display
    pub density: f64,
    pub debounce_secs: f64,
    pub controller: ControllerConfig,
}

impl CollectorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sources: config.sources.clone(),
            density: config.display.density(),
            debounce_secs: config.debounce_threshold.as_secs_f64(),
            controller: config.controller.clone(),
        }
    }

    fn enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::Pointer => self.sources.pointer,
            Capability::Keyboard => self.sources.keyboard,
            Capability::Controller => self.sources.controller,
        }
    }

    /// Enabled capabilities, in a fixed order.
    pub fn capabilities(&self) -> Vec<Capability> {
        [Capability::Pointer, Capability::Keyboard, Capability::Controller]
            .into_iter()
            .filter(|c| self.enabled(*c))
            .collect()
    }

    /// Enabled capabilities the platform source cannot deliver. Only a
    /// source added with [`Collector::add_source`] can feed these.
    pub fn without_native_source(&self) -> Vec<Capability> {
        self.capabilities()
            .into_iter()
            .filter(|c| !native_capabilities().contains(c))
            .collect()
    }

    fn producer(&self, capability: Capability, queue: &Arc<IngestionQueue>) -> Box<dyn Producer> {
        match capability {
            Capability::Pointer => Box::new(PointerProducer::new(
                queue.clone(),
                self.density,
                self.debounce_secs,
            )),
            Capability::Keyboard => Box::new(KeyboardProducer::new(queue.clone())),
            Capability::Controller => {
                Box::new(ControllerProducer::new(queue.clone(), &self.controller))
            }
        }
    }
}

/// Capabilities [`platform_source`] actually captures on this platform.
pub fn native_capabilities() -> &'static [Capability] {
    #[cfg(target_os = "macos")]
    {
        &[Capability::Pointer, Capability::Keyboard]
    }

    #[cfg(not(target_os = "macos"))]
    {
        &[]
    }
}

/// The native pointer/keyboard source for this platform.
pub fn platform_source(config: &CollectorConfig) -> Box<dyn CaptureSource> {
    #[cfg(target_os = "macos")]
    {
        Box::new(MacOSSource::new(config.capabilities()))
    }

    #[cfg(not(target_os = "macos"))]
    {
        info!(
            "No native capture backend on this platform; \
             pointer and keyboard input will not be recorded"
        );
        Box::new(NoopSource::new(config.capabilities()))
    }
}

/// Runs capture sources on background threads.
pub struct Collector {
    config: CollectorConfig,
    queue: Arc<IngestionQueue>,
    pending: Vec<Box<dyn CaptureSource>>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Collector {
    pub fn new(config: CollectorConfig, queue: Arc<IngestionQueue>) -> Self {
        Self {
            config,
            queue,
            pending: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        }
    }

    /// Register a source to be started by [`Collector::start`].
    pub fn add_source(&mut self, source: Box<dyn CaptureSource>) {
        self.pending.push(source);
    }

    /// Start every registered source on its own thread.
    ///
    /// Sources whose capabilities are all disabled are skipped.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        for source in std::mem::take(&mut self.pending) {
            let producers: Vec<Box<dyn Producer>> = source
                .capabilities()
                .into_iter()
                .filter(|c| self.config.enabled(*c))
                .map(|c| self.config.producer(c, &self.queue))
                .collect();

            if producers.is_empty() {
                debug!("Skipping source {}: no enabled capabilities", source.name());
                continue;
            }

            let name = source.name().to_string();
            let running = self.running.clone();
            let spawned = thread::Builder::new()
                .name(format!("capture-{name}"))
                .spawn(move || supervise(source, producers, &running));

            match spawned {
                Ok(handle) => {
                    info!("Started capture source {}", name);
                    self.threads.push(handle);
                }
                Err(e) => error!("Could not spawn thread for source {}: {}", name, e),
            }
        }

        Ok(())
    }

    /// Stop capturing and wait for the source threads to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of source threads started.
    pub fn active_sources(&self) -> usize {
        self.threads.len()
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run a source until stopped, reconnecting with backoff on retryable errors.
fn supervise(
    mut source: Box<dyn CaptureSource>,
    mut producers: Vec<Box<dyn Producer>>,
    running: &AtomicBool,
) {
    let mut backoff = Backoff::default();

    while running.load(Ordering::SeqCst) {
        let mut delivered = false;
        let result = source.run(running, &mut |input: RawInput| {
            delivered = true;
            let timestamp = types::now_secs();
            let capability = input.capability();
            if let Some(producer) = producers.iter_mut().find(|p| p.capability() == capability) {
                producer.handle(input, timestamp);
            }
        });

        match result {
            Ok(()) => break,
            Err(e) if e.is_retryable() => {
                if delivered {
                    backoff.reset();
                }
                warn!("Capture source {} failed: {}; reconnecting", source.name(), e);
                if !backoff.wait(running) {
                    break;
                }
            }
            Err(e) => {
                error!("Capture source {} stopped: {}", source.name(), e);
                break;
            }
        }
    }

    debug!("Capture source {} exited", source.name());
}
