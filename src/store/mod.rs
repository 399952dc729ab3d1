//! Persistent event store.
//!
//! The store is append-only and is the system of record for every aggregate.
//! [`CsvStore`] is the flat-file implementation; anything that can append a
//! batch atomically and scan it back can stand in for it.

pub mod csv_file;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::collector::types::{
    EventKind, EventTag, GamepadButton, PointerButton, Position, RawEvent,
};
use crate::error::{ParseError, PersistenceError};

pub use csv_file::CsvStore;

/// Iterator over stored events. Undecodable records are skipped.
pub type EventIter<'a> = Box<dyn Iterator<Item = RawEvent> + Send + 'a>;

/// An append-only event log.
pub trait EventStore: Send + Sync {
    /// Append the whole batch, or nothing.
    fn append(&self, batch: &[RawEvent]) -> Result<(), PersistenceError>;

    /// Iterate over stored events with `timestamp >= since`.
    fn scan(&self, since: Option<f64>) -> Result<EventIter<'_>, PersistenceError>;

    /// Size of the backing storage in bytes.
    fn size_bytes(&self) -> Result<u64, PersistenceError>;

    /// When the store was created.
    fn created_at(&self) -> Result<DateTime<Local>, PersistenceError>;
}

/// Column names, in order.
pub const HEADER: [&str; 5] = ["timestamp", "event", "button", "position", "distance_in_inches"];

/// One row of the event table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub timestamp: f64,
    pub event: String,
    pub button: Option<String>,
    pub position: Option<String>,
    pub distance_in_inches: Option<f64>,
}

impl From<&RawEvent> for StoredRecord {
    fn from(event: &RawEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            event: event.tag().as_str().to_string(),
            button: event.button_label().map(str::to_string),
            position: event.position().map(|p| p.to_string()),
            distance_in_inches: event.distance(),
        }
    }
}

impl TryFrom<StoredRecord> for RawEvent {
    type Error = ParseError;

    fn try_from(record: StoredRecord) -> Result<Self, Self::Error> {
        let tag: EventTag = record.event.parse()?;
        let name = tag.as_str();
        let missing = |field| ParseError::MissingField { event: name, field };

        let button = || record.button.as_deref().filter(|b| !b.is_empty()).ok_or(missing("button"));
        let position = || -> Result<Position, ParseError> {
            record
                .position
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or(missing("position"))?
                .parse()
        };

        let kind = match tag {
            EventTag::Moved => EventKind::Moved {
                position: position()?,
                distance: record.distance_in_inches.ok_or(missing("distance_in_inches"))?,
            },
            EventTag::Pressed => EventKind::Pressed {
                button: pointer_button(button()?),
                position: position()?,
            },
            EventTag::Released => EventKind::Released {
                button: pointer_button(button()?),
                position: position()?,
            },
            EventTag::KeyPressed => EventKind::KeyPressed,
            EventTag::KeyReleased => EventKind::KeyReleased,
            EventTag::GamepadPressed => EventKind::GamepadPressed {
                button: gamepad_button(button()?),
            },
            EventTag::GamepadReleased => EventKind::GamepadReleased {
                button: gamepad_button(button()?),
            },
        };

        Ok(RawEvent::new(record.timestamp, kind))
    }
}

// Logs written by other capture backends use their own button names. The
// event still counts; only the button is lost.
fn pointer_button(name: &str) -> PointerButton {
    name.parse().unwrap_or(PointerButton::Unknown)
}

fn gamepad_button(name: &str) -> GamepadButton {
    name.parse().unwrap_or(GamepadButton::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        event: &str,
        button: Option<&str>,
        position: Option<&str>,
        distance: Option<f64>,
    ) -> StoredRecord {
        StoredRecord {
            timestamp: 1.5,
            event: event.to_string(),
            button: button.map(str::to_string),
            position: position.map(str::to_string),
            distance_in_inches: distance,
        }
    }

    #[test]
    fn test_record_columns_for_each_kind() {
        let moved = StoredRecord::from(&RawEvent::moved(1.0, Position::new(3.0, 4.0), 0.25));
        assert_eq!(moved.event, "Moved");
        assert_eq!(moved.button, None);
        assert_eq!(moved.position.as_deref(), Some("(3, 4)"));
        assert_eq!(moved.distance_in_inches, Some(0.25));

        let pad = StoredRecord::from(&RawEvent::gamepad(1.0, GamepadButton::South, true));
        assert_eq!(pad.event, "Gamepad Pressed");
        assert_eq!(pad.button.as_deref(), Some("south"));
        assert_eq!(pad.position, None);
    }

    #[test]
    fn test_legacy_click_record_decodes() {
        let event =
            RawEvent::try_from(record("Pressed", Some("Button.left"), Some("(10, 20)"), None))
                .unwrap();
        assert_eq!(
            event.kind,
            EventKind::Pressed {
                button: PointerButton::Left,
                position: Position::new(10.0, 20.0)
            }
        );
    }

    #[test]
    fn test_incomplete_records_are_rejected() {
        assert!(matches!(
            RawEvent::try_from(record("Moved", None, Some("(1, 1)"), None)),
            Err(ParseError::MissingField { field: "distance_in_inches", .. })
        ));
        assert!(matches!(
            RawEvent::try_from(record("Pressed", Some(""), Some("(1, 1)"), None)),
            Err(ParseError::MissingField { field: "button", .. })
        ));
        assert!(matches!(
            RawEvent::try_from(record("Mov", None, None, None)),
            Err(ParseError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_foreign_button_names_still_decode() {
        for name in ["BTN_SOUTH", "A", "south"] {
            let event =
                RawEvent::try_from(record("Gamepad Pressed", Some(name), None, None)).unwrap();
            assert_eq!(event.tag(), EventTag::GamepadPressed);
        }
        let event =
            RawEvent::try_from(record("Gamepad Released", Some("BTN_SOUTH"), None, None))
                .unwrap();
        assert_eq!(
            event.kind,
            EventKind::GamepadReleased {
                button: GamepadButton::Unknown
            }
        );

        let click =
            RawEvent::try_from(record("Pressed", Some("Button.unknown"), Some("(1, 2)"), None))
                .unwrap();
        assert_eq!(
            click.kind,
            EventKind::Pressed {
                button: PointerButton::Unknown,
                position: Position::new(1.0, 2.0)
            }
        );
    }
}
