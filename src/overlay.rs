//! Floating bubble control.
//!
//! The bubble is shown only while the host app is in the background and the
//! overlay capability is granted. Taps, double taps and long presses become
//! playback commands; drags move the bubble without touching playback.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandSender, PlaybackCommand};
use crate::config::OverlayConfig;
use crate::foreground::ForegroundEdge;
use crate::gesture::{Gesture, GestureEvent, GestureRecognizer, GestureThresholds};
use crate::playback::{PlaybackSnapshot, PlaybackState};

/// Permission to draw over other applications.
pub trait OverlayCapability: Send + Sync {
    fn has_capability(&self) -> bool;

    /// Ask for the capability. Fire-and-forget; observe the outcome by
    /// calling `has_capability` again later.
    fn request_capability(&self);
}

/// Granted when enabled in config and a display server is reachable.
pub struct DisplayCapability {
    enabled: bool,
}

impl DisplayCapability {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn display_available() -> bool {
        ["WAYLAND_DISPLAY", "DISPLAY"]
            .iter()
            .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
    }
}

impl OverlayCapability for DisplayCapability {
    fn has_capability(&self) -> bool {
        self.enabled && Self::display_available()
    }

    fn request_capability(&self) {
        if !self.enabled {
            info!("Floating bubble is disabled; set `overlay.enabled: true` in config.yaml");
        } else if !Self::display_available() {
            warn!("No display server reachable (DISPLAY / WAYLAND_DISPLAY unset), staying in notification mode");
        } else {
            debug!("Overlay capability already granted");
        }
    }
}

/// Screen offset of the bubble's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BubbleGeometry {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleIcon {
    Play,
    Pause,
}

impl BubbleIcon {
    pub fn for_state(state: PlaybackState) -> Self {
        match state {
            PlaybackState::Speaking => Self::Pause,
            _ => Self::Play,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BubbleStatus {
    Visible,
    HiddenInForeground,
    NotificationOnly,
}

/// Draws the bubble. Raw pointer input comes back as `Command::Pointer`.
pub trait BubbleSurface: Send {
    fn show(&mut self, geometry: BubbleGeometry, icon: BubbleIcon);
    fn move_to(&mut self, geometry: BubbleGeometry);
    fn set_icon(&mut self, icon: BubbleIcon);
    fn hide(&mut self);
}

/// Bubble surface that only logs draw calls.
pub struct LogBubbleSurface;

impl BubbleSurface for LogBubbleSurface {
    fn show(&mut self, geometry: BubbleGeometry, icon: BubbleIcon) {
        info!("Bubble: show {icon:?} at ({:.0}, {:.0})", geometry.x, geometry.y);
    }

    fn move_to(&mut self, geometry: BubbleGeometry) {
        debug!("Bubble: move to ({:.0}, {:.0})", geometry.x, geometry.y);
    }

    fn set_icon(&mut self, icon: BubbleIcon) {
        debug!("Bubble: icon {icon:?}");
    }

    fn hide(&mut self) {
        info!("Bubble: hide");
    }
}

pub struct OverlayController {
    capability: Arc<dyn OverlayCapability>,
    surface: Box<dyn BubbleSurface>,
    layout: OverlayConfig,
    recognizer: GestureRecognizer,
    commands: CommandSender,
    /// Some while the bubble is on screen.
    geometry: Option<BubbleGeometry>,
    host_foreground: bool,
    icon: BubbleIcon,
    long_press: Option<JoinHandle<()>>,
    released: bool,
}

impl OverlayController {
    pub fn new(
        capability: Arc<dyn OverlayCapability>,
        surface: Box<dyn BubbleSurface>,
        layout: OverlayConfig,
        thresholds: GestureThresholds,
        commands: CommandSender,
    ) -> Self {
        Self {
            capability,
            surface,
            layout,
            recognizer: GestureRecognizer::new(thresholds),
            commands,
            geometry: None,
            host_foreground: false,
            icon: BubbleIcon::Play,
            long_press: None,
            released: false,
        }
    }

    pub fn is_shown(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn geometry(&self) -> Option<BubbleGeometry> {
        self.geometry
    }

    pub fn status(&self) -> BubbleStatus {
        if self.geometry.is_some() {
            BubbleStatus::Visible
        } else if !self.released && self.capability.has_capability() {
            BubbleStatus::HiddenInForeground
        } else {
            BubbleStatus::NotificationOnly
        }
    }

    /// Right edge minus the inset, fixed distance from the top.
    pub fn default_position(&self) -> BubbleGeometry {
        BubbleGeometry {
            x: self.layout.screen_width - self.layout.edge_inset,
            y: self.layout.top_offset,
        }
    }

    /// Initial visibility decision at startup.
    pub fn evaluate(&mut self, host_foreground: bool) -> bool {
        self.host_foreground = host_foreground;
        self.reconcile()
    }

    pub fn on_foreground(&mut self, edge: ForegroundEdge) -> bool {
        self.host_foreground = edge == ForegroundEdge::WentForeground;
        self.reconcile()
    }

    /// Apply the visibility decision table. Returns true if visibility changed.
    pub fn reconcile(&mut self) -> bool {
        let wanted = !self.released && !self.host_foreground && self.capability.has_capability();
        match (wanted, self.is_shown()) {
            (true, false) => {
                self.show();
                true
            }
            (false, true) => {
                self.hide();
                true
            }
            _ => false,
        }
    }

    /// Refresh the icon for the latest playback snapshot.
    pub fn render(&mut self, snapshot: &PlaybackSnapshot) {
        self.icon = BubbleIcon::for_state(snapshot.state);
        if self.is_shown() {
            self.surface.set_icon(self.icon);
        }
    }

    pub fn on_pointer(&mut self, event: GestureEvent) -> Option<PlaybackCommand> {
        if !self.is_shown() {
            debug!("Ignoring pointer event while bubble hidden");
            return None;
        }
        let gesture = self.recognizer.on_event(event);
        if let GestureEvent::PointerDown { .. } = event {
            self.arm_long_press();
        } else if !self.recognizer.long_press_pending() {
            self.cancel_long_press();
        }
        gesture.and_then(|gesture| self.apply(gesture))
    }

    pub fn long_press_elapsed(&mut self, generation: u64) -> Option<PlaybackCommand> {
        if !self.is_shown() {
            return None;
        }
        let gesture = self.recognizer.long_press_elapsed(generation)?;
        self.long_press = None;
        self.apply(gesture)
    }

    /// Remove the bubble for good.
    pub fn release(&mut self) {
        self.released = true;
        if self.is_shown() {
            self.hide();
        }
        self.cancel_long_press();
    }

    fn apply(&mut self, gesture: Gesture) -> Option<PlaybackCommand> {
        debug!("Gesture: {gesture:?}");
        match gesture {
            Gesture::SingleTap => Some(PlaybackCommand::Toggle),
            Gesture::DoubleTap => Some(PlaybackCommand::Next),
            Gesture::LongPress => Some(PlaybackCommand::Stop),
            Gesture::Drag { dx, dy } => {
                if let Some(geometry) = self.geometry.as_mut() {
                    geometry.x += dx;
                    geometry.y += dy;
                    self.surface.move_to(*geometry);
                }
                None
            }
        }
    }

    fn show(&mut self) {
        let geometry = self.default_position();
        self.geometry = Some(geometry);
        self.surface.show(geometry, self.icon);
        info!("Bubble shown (host app in background)");
    }

    fn hide(&mut self) {
        self.cancel_long_press();
        self.recognizer.reset();
        self.geometry = None;
        self.surface.hide();
        info!("Bubble hidden");
    }

    fn arm_long_press(&mut self) {
        self.cancel_long_press();
        let generation = self.recognizer.generation();
        let delay = Duration::from_millis(self.recognizer.thresholds().long_press_timeout_ms);
        let commands = self.commands.clone();
        self.long_press = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            commands.post(Command::LongPressElapsed { generation });
        }));
    }

    fn cancel_long_press(&mut self) {
        if let Some(timer) = self.long_press.take() {
            timer.abort();
        }
    }
}
