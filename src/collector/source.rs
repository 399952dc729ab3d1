//! Capture sources and reconnect backoff.
//!
//! A [`CaptureSource`] owns the OS hook or device handle and calls `emit` for
//! every raw input. It blocks until `running` is cleared (clean exit) or the
//! underlying hook/device fails (error). The collector restarts failed
//! sources with [`Backoff`].

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::collector::types::{Capability, RawInput};
use crate::error::CaptureError;

/// How often blocking sources check the `running` flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub trait CaptureSource: Send {
    /// Name used in logs and thread names.
    fn name(&self) -> &str;

    /// Input classes this source can deliver.
    fn capabilities(&self) -> Vec<Capability>;

    /// Deliver inputs until `running` is cleared or the source fails.
    fn run(
        &mut self,
        running: &AtomicBool,
        emit: &mut dyn FnMut(RawInput),
    ) -> Result<(), CaptureError>;
}

type Connector = Box<dyn FnMut() -> Result<Receiver<RawInput>, CaptureError> + Send>;

/// A source fed by a channel.
///
/// Controller libraries and tests push [`RawInput`]s into a crossbeam
/// channel. The connector is called on every (re)start; a dropped sender
/// ends the run with [`CaptureError::Disconnected`] so the collector can
/// reconnect.
pub struct ChannelSource {
    name: String,
    capabilities: Vec<Capability>,
    connect: Connector,
}

impl ChannelSource {
    pub fn new<F>(name: impl Into<String>, capabilities: Vec<Capability>, connect: F) -> Self
    where
        F: FnMut() -> Result<Receiver<RawInput>, CaptureError> + Send + 'static,
    {
        Self {
            name: name.into(),
            capabilities,
            connect: Box::new(connect),
        }
    }

    /// A source over a single receiver. Once it disconnects the source
    /// reports itself unavailable.
    pub fn from_receiver(
        name: impl Into<String>,
        capabilities: Vec<Capability>,
        receiver: Receiver<RawInput>,
    ) -> Self {
        let name = name.into();
        let label = name.clone();
        let mut receiver = Some(receiver);
        Self::new(name, capabilities, move || {
            receiver
                .take()
                .ok_or_else(|| CaptureError::Unavailable(format!("{label}: channel closed")))
        })
    }
}

impl CaptureSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.clone()
    }

    fn run(
        &mut self,
        running: &AtomicBool,
        emit: &mut dyn FnMut(RawInput),
    ) -> Result<(), CaptureError> {
        let receiver = (self.connect)()?;

        while running.load(Ordering::SeqCst) {
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(input) => emit(input),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::Disconnected(self.name.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Exponential reconnect delay: 500 ms doubling up to 30 s.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// The delay to wait now; the following one doubles.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Sleep for the next delay, waking early if `running` is cleared.
    /// Returns `false` if the wait was cut short.
    pub fn wait(&mut self, running: &AtomicBool) -> bool {
        let deadline = Instant::now() + self.next_delay();
        while running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
        false
    }
}
