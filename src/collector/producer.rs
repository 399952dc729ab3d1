//! Producers turn raw source callbacks into [`RawEvent`]s on the ingestion queue.
//!
//! A producer is owned by exactly one capture thread, so it can keep mutable
//! state (the last pointer sample, latched axes) without locking. The only
//! shared thing it touches is the queue.

use std::sync::Arc;
use tracing::trace;

use crate::collector::types::{Capability, RawEvent, RawInput};
use crate::distance::MovementTracker;
use crate::pipeline::IngestionQueue;

pub trait Producer: Send {
    /// The input class this producer consumes.
    fn capability(&self) -> Capability;

    /// Handle one input captured at `timestamp` (seconds since the epoch).
    fn handle(&mut self, input: RawInput, timestamp: f64);
}

/// Pointer movement and button events.
///
/// Movement samples closer together than the debounce threshold are not
/// logged; their distance is carried into the next logged movement.
pub struct PointerProducer {
    queue: Arc<IngestionQueue>,
    tracker: MovementTracker,
}

impl PointerProducer {
    pub fn new(queue: Arc<IngestionQueue>, density: f64, debounce_secs: f64) -> Self {
        Self {
            queue,
            tracker: MovementTracker::new(density, debounce_secs),
        }
    }
}

impl Producer for PointerProducer {
    fn capability(&self) -> Capability {
        Capability::Pointer
    }

    fn handle(&mut self, input: RawInput, timestamp: f64) {
        match input {
            RawInput::PointerMoved(position) => {
                if let Some(distance) = self.tracker.observe(position, timestamp) {
                    self.queue.enqueue(RawEvent::moved(timestamp, position, distance));
                }
            }
            RawInput::PointerButton {
                button,
                position,
                pressed,
            } => {
                self.queue
                    .enqueue(RawEvent::click(timestamp, button, position, pressed));
            }
            other => trace!("Pointer producer ignoring {:?}", other),
        }
    }
}

/// Key press and release events. Key identity is never recorded.
pub struct KeyboardProducer {
    queue: Arc<IngestionQueue>,
}

impl KeyboardProducer {
    pub fn new(queue: Arc<IngestionQueue>) -> Self {
        Self { queue }
    }
}

impl Producer for KeyboardProducer {
    fn capability(&self) -> Capability {
        Capability::Keyboard
    }

    fn handle(&mut self, input: RawInput, timestamp: f64) {
        match input {
            RawInput::Key { pressed } => self.queue.enqueue(RawEvent::key(timestamp, pressed)),
            other => trace!("Keyboard producer ignoring {:?}", other),
        }
    }
}
