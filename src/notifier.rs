//! Persistent status notification via notify-rust (D-Bus).
//!
//! `render_content` turns a snapshot into what the notification shows; the
//! `StatusSurface` puts it on screen and routes the action buttons back into
//! the command queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify_rust::{Hint, Notification, NotificationHandle, Timeout, Urgency};
use tracing::{debug, info, warn};

use crate::command::{CommandSender, PlaybackCommand};
use crate::config::NotificationConfig;
use crate::overlay::BubbleStatus;
use crate::playback::{PlaybackSnapshot, PlaybackState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationAction {
    /// Also the `PlaybackCommand` name it triggers.
    pub id: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub detail: String,
    pub actions: Vec<NotificationAction>,
    pub persistent: bool,
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

fn bubble_line(bubble: BubbleStatus) -> &'static str {
    match bubble {
        BubbleStatus::Visible => "• Bubble visible",
        BubbleStatus::HiddenInForeground => "• Bubble hidden (app in foreground)",
        BubbleStatus::NotificationOnly => "• Notification mode",
    }
}

pub fn render_content(
    snapshot: &PlaybackSnapshot,
    bubble: BubbleStatus,
    title: &str,
    preview_chars: usize,
) -> NotificationContent {
    let current = snapshot.current_text.as_deref();

    let body = match (snapshot.state, current) {
        (PlaybackState::Stopped, _) => "Playback stopped".to_string(),
        (_, None) => "No headlines available".to_string(),
        (PlaybackState::Speaking, Some(text)) => format!("Reading: {}", preview(text, preview_chars)),
        (PlaybackState::Paused, Some(text)) => format!("Paused: {}", preview(text, preview_chars)),
        (PlaybackState::Idle, Some(text)) => format!("Ready: {}", preview(text, preview_chars)),
    };

    if snapshot.state == PlaybackState::Stopped {
        return NotificationContent {
            title: title.to_string(),
            body,
            detail: String::new(),
            actions: Vec::new(),
            persistent: false,
        };
    }

    let toggle_label = if snapshot.state == PlaybackState::Speaking {
        "Pause"
    } else {
        "Play"
    };

    NotificationContent {
        title: title.to_string(),
        body,
        detail: format!(
            "{}\n\n{}",
            current.unwrap_or("No headlines available"),
            bubble_line(bubble)
        ),
        actions: vec![
            NotificationAction {
                id: PlaybackCommand::Toggle.name(),
                label: toggle_label,
            },
            NotificationAction {
                id: PlaybackCommand::Next.name(),
                label: "Next",
            },
            NotificationAction {
                id: PlaybackCommand::Stop.name(),
                label: "Stop",
            },
        ],
        persistent: true,
    }
}

/// The OS-level status area.
pub trait StatusSurface: Send {
    /// Route action buttons into the command queue.
    fn attach(&mut self, commands: CommandSender);
    fn publish(&mut self, content: &NotificationContent);
}

/// Renders every snapshot into the status surface, never leaving it stale.
pub struct NotificationSynchronizer {
    title: String,
    preview_chars: usize,
    surface: Box<dyn StatusSurface>,
}

impl NotificationSynchronizer {
    pub fn new(config: &NotificationConfig, surface: Box<dyn StatusSurface>) -> Self {
        Self {
            title: config.title.clone(),
            preview_chars: config.preview_chars,
            surface,
        }
    }

    pub fn sync(&mut self, snapshot: &PlaybackSnapshot, bubble: BubbleStatus) {
        let content = render_content(snapshot, bubble, &self.title, self.preview_chars);
        self.surface.publish(&content);
    }
}

/// Desktop notification that replaces itself in place on every publish.
pub struct DesktopStatusSurface {
    appname: String,
    id: Option<u32>,
    commands: Option<CommandSender>,
    /// A thread is blocked waiting for an action on our notification.
    listening: Arc<AtomicBool>,
}

impl DesktopStatusSurface {
    pub fn new(appname: &str) -> Self {
        Self {
            appname: appname.to_string(),
            id: None,
            commands: None,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One listener per notification id; the id is reused across publishes.
    fn listen(&self, handle: NotificationHandle) {
        let Some(commands) = self.commands.clone() else {
            return;
        };
        if self.listening.swap(true, Ordering::AcqRel) {
            return;
        }
        let listening = Arc::clone(&self.listening);

        std::thread::spawn(move || {
            handle.wait_for_action(|action| match PlaybackCommand::from_name(action) {
                Some(command) => {
                    info!("Notification action: {command}");
                    commands.post(command);
                }
                None => debug!("Notification closed ({action})"),
            });
            listening.store(false, Ordering::Release);
        });
    }
}

impl StatusSurface for DesktopStatusSurface {
    fn attach(&mut self, commands: CommandSender) {
        self.commands = Some(commands);
    }

    fn publish(&mut self, content: &NotificationContent) {
        let body = if content.detail.is_empty() {
            content.body.clone()
        } else {
            format!("{}\n{}", content.body, content.detail)
        };

        let mut notification = Notification::new();
        notification
            .appname(&self.appname)
            .summary(&content.title)
            .body(&body)
            .icon("audio-speakers");
        if let Some(id) = self.id {
            notification.id(id);
        }
        for action in &content.actions {
            notification.action(action.id, action.label);
        }
        if content.persistent {
            notification
                .urgency(Urgency::Low)
                .hint(Hint::Resident(true))
                .timeout(Timeout::Never);
        } else {
            notification.timeout(3000);
        }

        match notification.show() {
            Ok(handle) => {
                self.id = Some(handle.id());
                if content.persistent {
                    self.listen(handle);
                }
            }
            Err(e) => warn!("Failed to show notification: {e}"),
        }
    }
}

/// Used when desktop notifications are disabled.
pub struct LogStatusSurface;

impl StatusSurface for LogStatusSurface {
    fn attach(&mut self, _commands: CommandSender) {}

    fn publish(&mut self, content: &NotificationContent) {
        debug!("Status: {} | {}", content.title, content.body);
    }
}
