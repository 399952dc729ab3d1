//! Event types for the activity logger.
//!
//! [`RawInput`] is what a capture source hands to a producer. [`RawEvent`] is
//! what a producer enqueues and what the store persists. Button identifiers
//! are canonical enums so the on-disk format does not depend on how any
//! particular capture library spells them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ParseError;

/// Current wall-clock time in fractional seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// Screen position in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Formats as `(x, y)`, the layout of the `position` column.
impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Position {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidPosition(s.to_string());
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let (x, y) = inner.split_once(',').ok_or_else(invalid)?;
        let x = x.trim().parse::<f64>().map_err(|_| invalid())?;
        let y = y.trim().parse::<f64>().map_err(|_| invalid())?;
        Ok(Self { x, y })
    }
}

/// Pointer buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    /// A button name this build does not recognise, read back from a log
    Unknown,
}

impl PointerButton {
    pub const ALL: [PointerButton; 5] = [
        PointerButton::Left,
        PointerButton::Right,
        PointerButton::Middle,
        PointerButton::Back,
        PointerButton::Forward,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PointerButton::Left => "left",
            PointerButton::Right => "right",
            PointerButton::Middle => "middle",
            PointerButton::Back => "back",
            PointerButton::Forward => "forward",
            PointerButton::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PointerButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts canonical names and the `Button.<name>` spelling found in older logs.
impl FromStr for PointerButton {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let name = name.strip_prefix("Button.").unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "left" => Ok(PointerButton::Left),
            "right" => Ok(PointerButton::Right),
            "middle" => Ok(PointerButton::Middle),
            "back" | "x1" | "button8" => Ok(PointerButton::Back),
            "forward" | "x2" | "button9" => Ok(PointerButton::Forward),
            _ => Err(ParseError::InvalidButton(s.to_string())),
        }
    }
}

/// Controller inputs, named by position rather than by vendor label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamepadButton {
    South,
    East,
    North,
    West,
    LeftBumper,
    RightBumper,
    LeftTrigger,
    RightTrigger,
    Select,
    Start,
    Mode,
    /// Left stick clicked in
    LeftThumb,
    /// Right stick clicked in
    RightThumb,
    /// Left stick deflected past its deadzone
    LeftStick,
    /// Right stick deflected past its deadzone
    RightStick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    /// A button name this build does not recognise, read back from a log
    Unknown,
}

impl GamepadButton {
    pub const ALL: [GamepadButton; 19] = [
        GamepadButton::South,
        GamepadButton::East,
        GamepadButton::North,
        GamepadButton::West,
        GamepadButton::LeftBumper,
        GamepadButton::RightBumper,
        GamepadButton::LeftTrigger,
        GamepadButton::RightTrigger,
        GamepadButton::Select,
        GamepadButton::Start,
        GamepadButton::Mode,
        GamepadButton::LeftThumb,
        GamepadButton::RightThumb,
        GamepadButton::LeftStick,
        GamepadButton::RightStick,
        GamepadButton::DPadUp,
        GamepadButton::DPadDown,
        GamepadButton::DPadLeft,
        GamepadButton::DPadRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GamepadButton::South => "south",
            GamepadButton::East => "east",
            GamepadButton::North => "north",
            GamepadButton::West => "west",
            GamepadButton::LeftBumper => "left_bumper",
            GamepadButton::RightBumper => "right_bumper",
            GamepadButton::LeftTrigger => "left_trigger",
            GamepadButton::RightTrigger => "right_trigger",
            GamepadButton::Select => "select",
            GamepadButton::Start => "start",
            GamepadButton::Mode => "mode",
            GamepadButton::LeftThumb => "left_thumb",
            GamepadButton::RightThumb => "right_thumb",
            GamepadButton::LeftStick => "left_stick",
            GamepadButton::RightStick => "right_stick",
            GamepadButton::DPadUp => "dpad_up",
            GamepadButton::DPadDown => "dpad_down",
            GamepadButton::DPadLeft => "dpad_left",
            GamepadButton::DPadRight => "dpad_right",
            GamepadButton::Unknown => "unknown",
        }
    }
}

impl fmt::Display for GamepadButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GamepadButton {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        GamepadButton::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ParseError::InvalidButton(s.to_string()))
    }
}

/// The kind of a persisted event, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventTag {
    Moved,
    Pressed,
    Released,
    KeyPressed,
    KeyReleased,
    GamepadPressed,
    GamepadReleased,
}

impl EventTag {
    pub const ALL: [EventTag; 7] = [
        EventTag::Moved,
        EventTag::Pressed,
        EventTag::Released,
        EventTag::KeyPressed,
        EventTag::KeyReleased,
        EventTag::GamepadPressed,
        EventTag::GamepadReleased,
    ];

    /// Name written to the `event` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::Moved => "Moved",
            EventTag::Pressed => "Pressed",
            EventTag::Released => "Released",
            EventTag::KeyPressed => "Key Pressed",
            EventTag::KeyReleased => "Key Released",
            EventTag::GamepadPressed => "Gamepad Pressed",
            EventTag::GamepadReleased => "Gamepad Released",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventTag {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        EventTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == name)
            .ok_or_else(|| ParseError::UnknownEvent(s.to_string()))
    }
}

/// Event payload. Each variant carries only the fields its kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Moved { position: Position, distance: f64 },
    Pressed { button: PointerButton, position: Position },
    Released { button: PointerButton, position: Position },
    KeyPressed,
    KeyReleased,
    GamepadPressed { button: GamepadButton },
    GamepadReleased { button: GamepadButton },
}

/// A captured input event. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Wall-clock seconds since the Unix epoch
    pub timestamp: f64,
    pub kind: EventKind,
}

impl RawEvent {
    pub fn new(timestamp: f64, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn moved(timestamp: f64, position: Position, distance: f64) -> Self {
        Self::new(timestamp, EventKind::Moved { position, distance })
    }

    pub fn click(timestamp: f64, button: PointerButton, position: Position, pressed: bool) -> Self {
        let kind = if pressed {
            EventKind::Pressed { button, position }
        } else {
            EventKind::Released { button, position }
        };
        Self::new(timestamp, kind)
    }

    pub fn key(timestamp: f64, pressed: bool) -> Self {
        let kind = if pressed {
            EventKind::KeyPressed
        } else {
            EventKind::KeyReleased
        };
        Self::new(timestamp, kind)
    }

    pub fn gamepad(timestamp: f64, button: GamepadButton, pressed: bool) -> Self {
        let kind = if pressed {
            EventKind::GamepadPressed { button }
        } else {
            EventKind::GamepadReleased { button }
        };
        Self::new(timestamp, kind)
    }

    pub fn tag(&self) -> EventTag {
        match self.kind {
            EventKind::Moved { .. } => EventTag::Moved,
            EventKind::Pressed { .. } => EventTag::Pressed,
            EventKind::Released { .. } => EventTag::Released,
            EventKind::KeyPressed => EventTag::KeyPressed,
            EventKind::KeyReleased => EventTag::KeyReleased,
            EventKind::GamepadPressed { .. } => EventTag::GamepadPressed,
            EventKind::GamepadReleased { .. } => EventTag::GamepadReleased,
        }
    }

    /// Movement distance in inches; only `Moved` events carry one.
    pub fn distance(&self) -> Option<f64> {
        match self.kind {
            EventKind::Moved { distance, .. } => Some(distance),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self.kind {
            EventKind::Moved { position, .. }
            | EventKind::Pressed { position, .. }
            | EventKind::Released { position, .. } => Some(position),
            _ => None,
        }
    }

    /// Canonical button identifier, if the kind has one.
    pub fn button_label(&self) -> Option<&'static str> {
        match self.kind {
            EventKind::Pressed { button, .. } | EventKind::Released { button, .. } => {
                Some(button.as_str())
            }
            EventKind::GamepadPressed { button } | EventKind::GamepadReleased { button } => {
                Some(button.as_str())
            }
            _ => None,
        }
    }
}

/// The input classes a capture source can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Pointer,
    Keyboard,
    Controller,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Pointer => "pointer",
            Capability::Keyboard => "keyboard",
            Capability::Controller => "controller",
        })
    }
}

/// Analog controller axes. Sticks report -1.0..=1.0, triggers 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
    LeftTrigger,
    RightTrigger,
}

/// A sample delivered by a controller source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControllerInput {
    Button { button: GamepadButton, pressed: bool },
    Axis { axis: Axis, value: f32 },
}

/// A raw callback from a capture source, before any producer logic runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RawInput {
    PointerMoved(Position),
    PointerButton {
        button: PointerButton,
        position: Position,
        pressed: bool,
    },
    Key {
        pressed: bool,
    },
    Controller(ControllerInput),
}

impl RawInput {
    pub fn capability(&self) -> Capability {
        match self {
            RawInput::PointerMoved(_) | RawInput::PointerButton { .. } => Capability::Pointer,
            RawInput::Key { .. } => Capability::Keyboard,
            RawInput::Controller(_) => Capability::Controller,
        }
    }
}
