//! Host application foreground detection.
//!
//! Polls the active window once per interval and reports edges only
//! (background → foreground and back), posted into the command queue.

use std::process::Command as Process;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandSender};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForegroundEdge {
    WentForeground,
    WentBackground,
}

/// Answers "which application is active right now".
pub trait ActiveAppProbe: Send + Sync {
    fn active_app(&self) -> Option<String>;
}

/// Active window title via `xdotool`.
pub struct XdotoolProbe;

impl ActiveAppProbe for XdotoolProbe {
    fn active_app(&self) -> Option<String> {
        let output = Process::new("xdotool")
            .args(["getactivewindow", "getwindowname"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!title.is_empty()).then_some(title)
    }
}

pub struct ForegroundMonitor {
    probe: Arc<dyn ActiveAppProbe>,
    host_app: String,
    foreground: bool,
}

impl ForegroundMonitor {
    pub fn new(probe: Arc<dyn ActiveAppProbe>, host_app: &str) -> Self {
        Self {
            probe,
            host_app: host_app.to_lowercase(),
            foreground: false,
        }
    }

    fn is_host(&self, active: Option<&str>) -> bool {
        match active {
            Some(title) if !self.host_app.is_empty() => title.to_lowercase().contains(&self.host_app),
            _ => false,
        }
    }

    /// Fold one probe result into the known state, returning an edge on change.
    pub fn observe(&mut self, active: Option<&str>) -> Option<ForegroundEdge> {
        let now = self.is_host(active);
        if now == self.foreground {
            return None;
        }
        self.foreground = now;
        Some(if now {
            ForegroundEdge::WentForeground
        } else {
            ForegroundEdge::WentBackground
        })
    }

    /// Probe once without reporting an edge, so the initial overlay decision
    /// starts from the real state.
    pub async fn baseline(&mut self) -> bool {
        let active = self.probe_blocking().await;
        self.foreground = self.is_host(active.as_deref());
        info!(
            "Host app initially {}",
            if self.foreground { "in foreground" } else { "in background" }
        );
        self.foreground
    }

    async fn probe_blocking(&self) -> Option<String> {
        let probe = Arc::clone(&self.probe);
        match tokio::task::spawn_blocking(move || probe.active_app()).await {
            Ok(active) => active,
            Err(e) => {
                warn!("Foreground probe panicked: {e}");
                None
            }
        }
    }

    /// Run the poll loop until `cancel` fires.
    pub fn spawn(
        mut self,
        interval: Duration,
        commands: CommandSender,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let active = self.probe_blocking().await;
                        if let Some(edge) = self.observe(active.as_deref()) {
                            debug!("Foreground edge: {edge:?} ({active:?})");
                            commands.post(Command::Foreground(edge));
                        }
                    }
                }
            }
            debug!("Foreground monitor stopped");
        })
    }
}
