//! macOS capture source using a CGEvent tap.
//!
//! Captures pointer position, pointer buttons and key up/down at the session
//! level. Requires the Input Monitoring permission. Key codes are never read.

use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    CallbackResult, EventField,
};
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::collector::source::{CaptureSource, POLL_INTERVAL};
use crate::collector::types::{Capability, PointerButton, Position, RawInput};
use crate::error::CaptureError;

/// Pointer and keyboard source backed by the Core Graphics event tap.
pub struct MacOSSource {
    capabilities: Vec<Capability>,
}

impl MacOSSource {
    pub fn new(capabilities: Vec<Capability>) -> Self {
        Self {
            capabilities: capabilities
                .into_iter()
                .filter(|c| matches!(c, Capability::Pointer | Capability::Keyboard))
                .collect(),
        }
    }

    fn event_types(&self) -> Vec<CGEventType> {
        let mut types = Vec::new();

        if self.capabilities.contains(&Capability::Keyboard) {
            types.push(CGEventType::KeyDown);
            types.push(CGEventType::KeyUp);
        }

        if self.capabilities.contains(&Capability::Pointer) {
            types.push(CGEventType::MouseMoved);
            types.push(CGEventType::LeftMouseDown);
            types.push(CGEventType::LeftMouseUp);
            types.push(CGEventType::RightMouseDown);
            types.push(CGEventType::RightMouseUp);
            types.push(CGEventType::OtherMouseDown);
            types.push(CGEventType::OtherMouseUp);
            types.push(CGEventType::LeftMouseDragged);
            types.push(CGEventType::RightMouseDragged);
            types.push(CGEventType::OtherMouseDragged);
        }

        types
    }
}

impl CaptureSource for MacOSSource {
    fn name(&self) -> &str {
        "macos-event-tap"
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.clone()
    }

    fn run(
        &mut self,
        running: &AtomicBool,
        emit: &mut dyn FnMut(RawInput),
    ) -> Result<(), CaptureError> {
        let emit = RefCell::new(emit);
        let disabled = Cell::new(false);

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            self.event_types(),
            |_proxy, event_type, event| {
                match event_type {
                    CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                        disabled.set(true);
                    }
                    _ => {
                        if let Some(input) = to_raw_input(event_type, event) {
                            let mut emit = emit.borrow_mut();
                            (&mut **emit)(input);
                        }
                    }
                }
                CallbackResult::Keep
            },
        )
        .map_err(|_| {
            CaptureError::Unavailable(
                "failed to create CGEvent tap (is Input Monitoring granted?)".to_string(),
            )
        })?;

        let source = tap.mach_port().create_runloop_source(0).map_err(|_| {
            CaptureError::Unavailable("failed to create run loop source".to_string())
        })?;

        let run_loop = CFRunLoop::get_current();
        unsafe {
            run_loop.add_source(&source, kCFRunLoopCommonModes);
        }
        tap.enable();
        debug!("CGEvent tap enabled");

        while running.load(Ordering::SeqCst) {
            CFRunLoop::run_in_mode(unsafe { kCFRunLoopCommonModes }, POLL_INTERVAL, false);

            if disabled.get() {
                warn!("CGEvent tap was disabled by the system");
                return Err(CaptureError::Disconnected("macos-event-tap".to_string()));
            }
        }

        Ok(())
    }
}

fn to_raw_input(event_type: CGEventType, event: &CGEvent) -> Option<RawInput> {
    use core_graphics::event::CGEventType::*;

    let position = || {
        let point = event.location();
        Position::new(point.x, point.y)
    };
    let button = |button: PointerButton, pressed: bool| RawInput::PointerButton {
        button,
        position: position(),
        pressed,
    };

    match event_type {
        KeyDown => Some(RawInput::Key { pressed: true }),
        KeyUp => Some(RawInput::Key { pressed: false }),

        MouseMoved | LeftMouseDragged | RightMouseDragged | OtherMouseDragged => {
            Some(RawInput::PointerMoved(position()))
        }

        LeftMouseDown => Some(button(PointerButton::Left, true)),
        LeftMouseUp => Some(button(PointerButton::Left, false)),
        RightMouseDown => Some(button(PointerButton::Right, true)),
        RightMouseUp => Some(button(PointerButton::Right, false)),
        OtherMouseDown | OtherMouseUp => {
            let pressed = matches!(event_type, OtherMouseDown);
            let number = event.get_integer_value_field(EventField::MOUSE_EVENT_BUTTON_NUMBER);
            other_button(number).map(|b| button(b, pressed))
        }

        _ => None,
    }
}

/// Map a Core Graphics button number (0 = left) to a canonical button.
fn other_button(number: i64) -> Option<PointerButton> {
    match number {
        2 => Some(PointerButton::Middle),
        3 => Some(PointerButton::Back),
        4 => Some(PointerButton::Forward),
        _ => None,
    }
}

/// Check whether an event tap can be created.
///
/// macOS has no direct query for Input Monitoring; creating a passive tap
/// fails when it is not granted.
pub fn check_permission() -> bool {
    CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        |_proxy, _type, _event| CallbackResult::Keep,
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types_follow_capabilities() {
        let keyboard_only = MacOSSource::new(vec![Capability::Keyboard, Capability::Controller]);
        assert_eq!(keyboard_only.capabilities(), vec![Capability::Keyboard]);
        assert_eq!(keyboard_only.event_types().len(), 2);

        let both = MacOSSource::new(vec![Capability::Pointer, Capability::Keyboard]);
        assert_eq!(both.event_types().len(), 12);
    }

    #[test]
    fn test_other_button_numbers() {
        assert_eq!(other_button(2), Some(PointerButton::Middle));
        assert_eq!(other_button(4), Some(PointerButton::Forward));
        assert_eq!(other_button(7), None);
    }
}
