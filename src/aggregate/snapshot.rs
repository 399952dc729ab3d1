//! Immutable aggregate statistics over a time window.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;

use crate::collector::types::{EventKind, EventTag, PointerButton, RawEvent};

/// Counts and sums computed from one pass over the store.
///
/// A snapshot is never mutated after it is published; a recompute builds a
/// new one and replaces the cached `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSnapshot {
    /// Events per kind
    pub counts: BTreeMap<EventTag, u64>,
    /// `Pressed` events per pointer button
    pub clicks: BTreeMap<PointerButton, u64>,
    /// Sum of `Moved` distances, in inches
    pub total_distance: f64,
    /// Earliest timestamp included, `None` for all time
    pub window_start: Option<f64>,
    pub store_size_bytes: u64,
    /// Creation time of the store, if known
    pub logging_since: Option<DateTime<Local>>,
    pub generated_at: DateTime<Local>,
}

impl AggregateSnapshot {
    /// A zeroed snapshot, served when nothing could be computed.
    pub fn empty(window_start: Option<f64>, generated_at: DateTime<Local>) -> Self {
        Self {
            counts: BTreeMap::new(),
            clicks: BTreeMap::new(),
            total_distance: 0.0,
            window_start,
            store_size_bytes: 0,
            logging_since: None,
            generated_at,
        }
    }

    /// Fold events into a new snapshot.
    pub fn from_events<I>(
        events: I,
        window_start: Option<f64>,
        generated_at: DateTime<Local>,
    ) -> Self
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let mut snapshot = Self::empty(window_start, generated_at);
        for event in events {
            snapshot.add(&event);
        }
        snapshot
    }

    fn add(&mut self, event: &RawEvent) {
        *self.counts.entry(event.tag()).or_insert(0) += 1;
        match event.kind {
            EventKind::Moved { distance, .. } => self.total_distance += distance,
            EventKind::Pressed { button, .. } => *self.clicks.entry(button).or_insert(0) += 1,
            _ => {}
        }
    }

    pub fn count(&self, tag: EventTag) -> u64 {
        self.counts.get(&tag).copied().unwrap_or(0)
    }

    pub fn clicks(&self, button: PointerButton) -> u64 {
        self.clicks.get(&button).copied().unwrap_or(0)
    }

    pub fn key_presses(&self) -> u64 {
        self.count(EventTag::KeyPressed)
    }

    pub fn gamepad_actions(&self) -> u64 {
        self.count(EventTag::GamepadPressed)
    }
}
