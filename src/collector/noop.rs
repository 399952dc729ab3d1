//! Placeholder source for platforms without a native capture backend.
//!
//! It keeps the collector, flush worker and dashboard runnable everywhere;
//! inputs can still be fed through a [`ChannelSource`](super::source::ChannelSource).

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::collector::source::{CaptureSource, POLL_INTERVAL};
use crate::collector::types::{Capability, RawInput};
use crate::error::CaptureError;

/// A source that never emits.
pub struct NoopSource {
    capabilities: Vec<Capability>,
}

impl NoopSource {
    pub fn new(capabilities: Vec<Capability>) -> Self {
        Self { capabilities }
    }
}

impl CaptureSource for NoopSource {
    fn name(&self) -> &str {
        "noop"
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.clone()
    }

    fn run(
        &mut self,
        running: &AtomicBool,
        _emit: &mut dyn FnMut(RawInput),
    ) -> Result<(), CaptureError> {
        while running.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

/// There is no Input Monitoring permission gate off macOS.
pub fn check_permission() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_source_returns_when_stopped() {
        let mut source = NoopSource::new(vec![Capability::Pointer, Capability::Keyboard]);
        let running = AtomicBool::new(false);
        let mut emitted = 0;
        assert!(source.run(&running, &mut |_| emitted += 1).is_ok());
        assert_eq!(emitted, 0);
        assert_eq!(source.capabilities().len(), 2);
    }
}
