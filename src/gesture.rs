//! Pointer gesture recognition for the floating bubble.
//!
//! Released → Armed (pointer down, stationary) → Moved | LongPressed → Released.
//!
//! The recognizer is a pure function of the event stream plus a little memory
//! (press origin, last tap time, pointer generation). The long-press timer lives with the
//! caller: it is armed on PointerDown and reported back through
//! `long_press_elapsed` with the generation it was armed for.

use serde::Deserialize;

use crate::config::GestureConfig;

/// Movement (device-independent px) that turns a press into a drag.
pub const TAP_SLOP_PX: f32 = 10.0;
/// Maximum gap between two taps to count as a double tap.
pub const DOUBLE_TAP_WINDOW_MS: u64 = 300;
/// How long a stationary pointer must stay down to count as a long press.
pub const LONG_PRESS_TIMEOUT_MS: u64 = 500;

/// Raw pointer input. `t` is milliseconds on the input source's clock.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GestureEvent {
    #[serde(rename = "down")]
    PointerDown { x: f32, y: f32, t: u64 },
    #[serde(rename = "move")]
    PointerMove { x: f32, y: f32, t: u64 },
    #[serde(rename = "up")]
    PointerUp { x: f32, y: f32, t: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    SingleTap,
    DoubleTap,
    LongPress,
    /// Offset since the previous drag signal.
    Drag { dx: f32, dy: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureThresholds {
    pub tap_slop_px: f32,
    pub double_tap_window_ms: u64,
    pub long_press_timeout_ms: u64,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            tap_slop_px: TAP_SLOP_PX,
            double_tap_window_ms: DOUBLE_TAP_WINDOW_MS,
            long_press_timeout_ms: LONG_PRESS_TIMEOUT_MS,
        }
    }
}

impl From<&GestureConfig> for GestureThresholds {
    fn from(config: &GestureConfig) -> Self {
        Self {
            tap_slop_px: config.tap_slop_px,
            double_tap_window_ms: config.double_tap_ms,
            long_press_timeout_ms: config.long_press_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Released,
    /// Down and still within the tap slop.
    Armed,
    /// Moved beyond the tap slop; taps are off for this pointer.
    Moved,
    /// Long press already reported; the rest of this pointer is swallowed.
    LongPressed,
}

#[derive(Debug)]
pub struct GestureRecognizer {
    thresholds: GestureThresholds,
    phase: Phase,
    origin: (f32, f32),
    /// Position of the last drag signal (origin until the first one).
    anchor: (f32, f32),
    last_tap_time: Option<u64>,
    generation: u64,
}

impl GestureRecognizer {
    pub fn new(thresholds: GestureThresholds) -> Self {
        Self {
            thresholds,
            phase: Phase::Released,
            origin: (0.0, 0.0),
            anchor: (0.0, 0.0),
            last_tap_time: None,
            generation: 0,
        }
    }

    pub fn thresholds(&self) -> GestureThresholds {
        self.thresholds
    }

    /// Identifies the current pointer lifecycle; bumps on every PointerDown.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while a stationary pointer is down and a long press may still fire.
    pub fn long_press_pending(&self) -> bool {
        self.phase == Phase::Armed
    }

    pub fn on_event(&mut self, event: GestureEvent) -> Option<Gesture> {
        match event {
            GestureEvent::PointerDown { x, y, .. } => {
                self.generation += 1;
                self.phase = Phase::Armed;
                self.origin = (x, y);
                self.anchor = (x, y);
                None
            }
            GestureEvent::PointerMove { x, y, .. } => match self.phase {
                Phase::Armed if self.exceeds_slop(x, y) => {
                    self.phase = Phase::Moved;
                    Some(self.drag_to(x, y))
                }
                Phase::Moved => Some(self.drag_to(x, y)),
                _ => None,
            },
            GestureEvent::PointerUp { t, .. } => {
                let phase = std::mem::replace(&mut self.phase, Phase::Released);
                if phase != Phase::Armed {
                    return None;
                }
                Some(self.classify_tap(t))
            }
        }
    }

    /// The long-press timer armed for `generation` fired.
    pub fn long_press_elapsed(&mut self, generation: u64) -> Option<Gesture> {
        if generation != self.generation || self.phase != Phase::Armed {
            return None;
        }
        self.phase = Phase::LongPressed;
        Some(Gesture::LongPress)
    }

    /// Forget any in-progress pointer and the pending double-tap window.
    pub fn reset(&mut self) {
        self.phase = Phase::Released;
        self.last_tap_time = None;
    }

    fn exceeds_slop(&self, x: f32, y: f32) -> bool {
        let dx = x - self.origin.0;
        let dy = y - self.origin.1;
        dx.hypot(dy) > self.thresholds.tap_slop_px
    }

    fn drag_to(&mut self, x: f32, y: f32) -> Gesture {
        let (ax, ay) = self.anchor;
        self.anchor = (x, y);
        Gesture::Drag {
            dx: x - ax,
            dy: y - ay,
        }
    }

    fn classify_tap(&mut self, t: u64) -> Gesture {
        match self.last_tap_time {
            Some(last) if t.saturating_sub(last) < self.thresholds.double_tap_window_ms => {
                // Consume the pair so a third quick tap opens a fresh window.
                self.last_tap_time = None;
                Gesture::DoubleTap
            }
            _ => {
                self.last_tap_time = Some(t);
                Gesture::SingleTap
            }
        }
    }
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        Self::new(GestureThresholds::default())
    }
}
