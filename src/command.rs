//! The serialized command entry point.
//!
//! Every producer (speech completion, bubble gestures, notification actions,
//! the foreground poll loop and the HTTP surface) posts into one unbounded
//! channel drained by the service task, so playback state has exactly one
//! writer.

use tokio::sync::mpsc;
use tracing::debug;

use crate::foreground::ForegroundEdge;
use crate::gesture::GestureEvent;
use crate::speech::UtteranceId;

/// User-facing playback commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Start,
    Toggle,
    Next,
    Previous,
    Stop,
}

impl PlaybackCommand {
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Toggle => "toggle",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Stop => "stop",
        }
    }

    /// Resolve a notification action identifier or API path segment.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Self::Start),
            "toggle" => Some(Self::Toggle),
            "next" => Some(Self::Next),
            "previous" => Some(Self::Previous),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlaybackCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the service task can be asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Playback(PlaybackCommand),
    UtteranceFinished(UtteranceId),
    Foreground(ForegroundEdge),
    Pointer(GestureEvent),
    LongPressElapsed { generation: u64 },
    AppendHeadlines(Vec<String>),
    ClearHeadlines,
    RequestOverlay,
}

impl From<PlaybackCommand> for Command {
    fn from(command: PlaybackCommand) -> Self {
        Self::Playback(command)
    }
}

/// Cloneable, non-blocking handle onto the command queue.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    /// Post a command. Once the service has stopped the command is dropped.
    pub fn post(&self, command: impl Into<Command>) {
        let command = command.into();
        if let Err(e) = self.tx.send(command) {
            debug!("Service stopped, dropping {:?}", e.0);
        }
    }
}

pub fn channel() -> (CommandSender, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, rx)
}
