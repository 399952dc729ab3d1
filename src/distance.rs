//! Pixel to physical distance conversion.
//!
//! The density constant is the diagonal pixel count divided by the diagonal
//! size in inches. A 27" 1920x1080 display gives roughly 81.6 px/in.

use serde::{Deserialize, Serialize};

use crate::collector::types::Position;

/// Display dimensions used to derive the density constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub width_px: u32,
    pub height_px: u32,
    pub diagonal_in: f64,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            width_px: 1920,
            height_px: 1080,
            diagonal_in: 27.0,
        }
    }
}

impl DisplayGeometry {
    /// Diagonal length in pixels.
    pub fn diagonal_px(&self) -> f64 {
        f64::from(self.width_px).hypot(f64::from(self.height_px))
    }

    /// Pixels per inch along the diagonal.
    pub fn density(&self) -> f64 {
        self.diagonal_px() / self.diagonal_in
    }
}

/// Euclidean distance between two positions, in inches.
pub fn distance(prev: Position, cur: Position, density: f64) -> f64 {
    (cur.x - prev.x).hypot(cur.y - prev.y) / density
}

/// Returns `true` when a sample at `cur` arrived too soon after `prev` and
/// should be suppressed.
pub fn debounce(prev_timestamp: f64, cur_timestamp: f64, threshold_secs: f64) -> bool {
    cur_timestamp - prev_timestamp <= threshold_secs
}

/// Turns a stream of pointer positions into debounced movement distances.
///
/// Suppressed samples still add their path length, which is carried into the
/// next emitted movement so totals match the real path.
#[derive(Debug, Clone)]
pub struct MovementTracker {
    density: f64,
    debounce_secs: f64,
    prev_position: Option<Position>,
    last_emitted: f64,
    pending: f64,
}

impl MovementTracker {
    pub fn new(density: f64, debounce_secs: f64) -> Self {
        Self {
            density,
            debounce_secs,
            prev_position: None,
            last_emitted: 0.0,
            pending: 0.0,
        }
    }

    /// Feed one pointer sample. Returns the distance to log, if any.
    ///
    /// The first sample only establishes the starting point.
    pub fn observe(&mut self, position: Position, timestamp: f64) -> Option<f64> {
        let prev = self.prev_position.replace(position)?;
        self.pending += distance(prev, position, self.density);

        if debounce(self.last_emitted, timestamp, self.debounce_secs) {
            return None;
        }

        self.last_emitted = timestamp;
        Some(std::mem::take(&mut self.pending))
    }

    pub fn density(&self) -> f64 {
        self.density
    }
}
