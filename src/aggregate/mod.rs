//! Windowed statistics over the event log.

pub mod service;
pub mod snapshot;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub use service::AggregationService;
pub use snapshot::AggregateSnapshot;

/// A reporting window: everything, or the most recent span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    All,
    Last(Duration),
}

impl TimeWindow {
    /// Parse `all`, a number of seconds, or `<n>s|m|h|d`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        let invalid = || ConfigError::InvalidWindow(s.to_string());

        if s.eq_ignore_ascii_case("all") {
            return Ok(TimeWindow::All);
        }

        let (number, unit_secs) = match s.char_indices().last() {
            Some((i, 's')) => (&s[..i], 1.0),
            Some((i, 'm')) => (&s[..i], 60.0),
            Some((i, 'h')) => (&s[..i], 3_600.0),
            Some((i, 'd')) => (&s[..i], 86_400.0),
            Some(_) => (s, 1.0),
            None => return Err(invalid()),
        };

        let value: f64 = number.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid());
        }
        Duration::try_from_secs_f64(value * unit_secs)
            .map(TimeWindow::Last)
            .map_err(|_| invalid())
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            TimeWindow::All => None,
            TimeWindow::Last(d) => Some(*d),
        }
    }
}

impl From<Option<Duration>> for TimeWindow {
    fn from(window: Option<Duration>) -> Self {
        window.map_or(TimeWindow::All, TimeWindow::Last)
    }
}

/// Formats in the largest whole unit that [`TimeWindow::parse`] accepts back.
impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = match self {
            TimeWindow::All => return f.write_str("all"),
            TimeWindow::Last(d) => *d,
        };
        if d.subsec_nanos() != 0 {
            return write!(f, "{}s", d.as_secs_f64());
        }
        match d.as_secs() {
            s if s % 86_400 == 0 => write!(f, "{}d", s / 86_400),
            s if s % 3_600 == 0 => write!(f, "{}h", s / 3_600),
            s if s % 60 == 0 => write!(f, "{}m", s / 60),
            s => write!(f, "{s}s"),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
