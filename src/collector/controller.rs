//! Controller producer.
//!
//! Digital buttons pass straight through as `Gamepad Pressed` / `Gamepad
//! Released`. Analog axes go through an [`AxisLatch`] each, so a stick
//! resting near its deadzone or a half-pulled trigger produces one
//! press/release pair instead of a stream of samples.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

use crate::collector::producer::Producer;
use crate::collector::types::{Axis, Capability, ControllerInput, GamepadButton, RawEvent, RawInput};
use crate::pipeline::IngestionQueue;

/// Analog thresholds for controller axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Trigger travel (0..=1) that counts as a press
    pub trigger_threshold: f32,
    /// Stick deflection (0..=1) that counts as a press
    pub stick_deadzone: f32,
    /// How far below the press point an axis must fall to release
    pub hysteresis: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 0.5,
            stick_deadzone: 0.25,
            hysteresis: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    Released,
    Pressed,
}

/// Two-state threshold detector with hysteresis.
///
/// Presses at `press_at`, releases below `press_at - hysteresis`. Values in
/// between keep the current state.
#[derive(Debug, Clone)]
pub struct AxisLatch {
    state: LatchState,
    press_at: f32,
    release_at: f32,
}

impl AxisLatch {
    pub fn new(press_at: f32, hysteresis: f32) -> Self {
        Self {
            state: LatchState::Released,
            press_at,
            release_at: press_at - hysteresis,
        }
    }

    pub fn state(&self) -> LatchState {
        self.state
    }

    /// Feed one magnitude sample; returns the new state on a transition.
    pub fn update(&mut self, magnitude: f32) -> Option<LatchState> {
        match self.state {
            LatchState::Released if magnitude >= self.press_at => {
                self.state = LatchState::Pressed;
                Some(LatchState::Pressed)
            }
            LatchState::Pressed if magnitude < self.release_at => {
                self.state = LatchState::Released;
                Some(LatchState::Released)
            }
            _ => None,
        }
    }
}

/// Stick position, kept so each axis sample can be turned into a magnitude.
#[derive(Debug, Default, Clone, Copy)]
struct Stick {
    x: f32,
    y: f32,
}

impl Stick {
    fn magnitude(&self) -> f32 {
        self.x.hypot(self.y)
    }
}

pub struct ControllerProducer {
    queue: Arc<IngestionQueue>,
    left_stick: Stick,
    right_stick: Stick,
    left_stick_latch: AxisLatch,
    right_stick_latch: AxisLatch,
    left_trigger_latch: AxisLatch,
    right_trigger_latch: AxisLatch,
}

impl ControllerProducer {
    pub fn new(queue: Arc<IngestionQueue>, config: &ControllerConfig) -> Self {
        let stick = AxisLatch::new(config.stick_deadzone, config.hysteresis);
        let trigger = AxisLatch::new(config.trigger_threshold, config.hysteresis);
        Self {
            queue,
            left_stick: Stick::default(),
            right_stick: Stick::default(),
            left_stick_latch: stick.clone(),
            right_stick_latch: stick,
            left_trigger_latch: trigger.clone(),
            right_trigger_latch: trigger,
        }
    }

    fn handle_axis(&mut self, axis: Axis, value: f32, timestamp: f64) {
        let (button, latch, magnitude) = match axis {
            Axis::LeftStickX | Axis::LeftStickY => {
                if axis == Axis::LeftStickX {
                    self.left_stick.x = value;
                } else {
                    self.left_stick.y = value;
                }
                (
                    GamepadButton::LeftStick,
                    &mut self.left_stick_latch,
                    self.left_stick.magnitude(),
                )
            }
            Axis::RightStickX | Axis::RightStickY => {
                if axis == Axis::RightStickX {
                    self.right_stick.x = value;
                } else {
                    self.right_stick.y = value;
                }
                (
                    GamepadButton::RightStick,
                    &mut self.right_stick_latch,
                    self.right_stick.magnitude(),
                )
            }
            Axis::LeftTrigger => (
                GamepadButton::LeftTrigger,
                &mut self.left_trigger_latch,
                value.abs(),
            ),
            Axis::RightTrigger => (
                GamepadButton::RightTrigger,
                &mut self.right_trigger_latch,
                value.abs(),
            ),
        };

        if let Some(state) = latch.update(magnitude) {
            let pressed = state == LatchState::Pressed;
            self.queue.enqueue(RawEvent::gamepad(timestamp, button, pressed));
        }
    }
}

impl Producer for ControllerProducer {
    fn capability(&self) -> Capability {
        Capability::Controller
    }

    fn handle(&mut self, input: RawInput, timestamp: f64) {
        match input {
            RawInput::Controller(ControllerInput::Button { button, pressed }) => {
                self.queue.enqueue(RawEvent::gamepad(timestamp, button, pressed));
            }
            RawInput::Controller(ControllerInput::Axis { axis, value }) => {
                self.handle_axis(axis, value, timestamp);
            }
            other => trace!("Controller producer ignoring {:?}", other),
        }
    }
}
