//! Shared append buffer between producers and the flush worker.
//!
//! Producers call [`IngestionQueue::enqueue`] from their capture threads; the
//! flush worker calls [`IngestionQueue::drain`], which swaps the buffer for an
//! empty one. Neither side does I/O while holding the lock.
//!
//! The queue is unbounded. If the store keeps failing, events accumulate here
//! (and in the flush worker's retained batch) until memory runs out; that is
//! the accepted backpressure failure mode, in exchange for never blocking or
//! dropping input on the capture path.

use parking_lot::Mutex;

use crate::collector::types::RawEvent;

#[derive(Debug, Default)]
pub struct IngestionQueue {
    events: Mutex<Vec<RawEvent>>,
}

impl IngestionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event.
    pub fn enqueue(&self, event: RawEvent) {
        self.events.lock().push(event);
    }

    /// Take everything enqueued so far.
    ///
    /// Events enqueued after the swap are left for the next drain.
    pub fn drain(&self) -> Vec<RawEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
