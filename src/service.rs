//! Service orchestration.
//!
//! One task owns playback, the bubble and the notification, and drains the
//! command queue in arrival order. Speech completions, notification actions,
//! bubble gestures, foreground edges and HTTP requests all arrive as posts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{self, Command, CommandSender, PlaybackCommand};
use crate::config::Config;
use crate::foreground::{ActiveAppProbe, ForegroundMonitor};
use crate::gesture::GestureThresholds;
use crate::notifier::{NotificationSynchronizer, StatusSurface};
use crate::overlay::{
    BubbleGeometry, BubbleStatus, BubbleSurface, OverlayCapability, OverlayController,
};
use crate::playback::{PlaybackController, PlaybackSnapshot, PlaybackState};
use crate::queue::HeadlineQueue;
use crate::speech::SpeechEngine;

/// The platform pieces the service drives.
pub struct Collaborators {
    pub speech: Box<dyn SpeechEngine>,
    pub probe: Arc<dyn ActiveAppProbe>,
    pub capability: Arc<dyn OverlayCapability>,
    pub bubble: Box<dyn BubbleSurface>,
    pub status: Box<dyn StatusSurface>,
}

/// Latest externally visible state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub snapshot: PlaybackSnapshot,
    pub bubble: BubbleStatus,
    /// Where the bubble is drawn, while visible.
    pub position: Option<BubbleGeometry>,
}

/// Cheap handle for code outside the service task.
#[derive(Clone)]
pub struct ServiceHandle {
    commands: CommandSender,
    status: watch::Receiver<StatusReport>,
}

impl ServiceHandle {
    pub fn post(&self, command: impl Into<Command>) {
        self.commands.post(command);
    }

    pub fn status(&self) -> StatusReport {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.status.clone()
    }
}

pub struct ServiceSupervisor {
    commands: CommandSender,
    queue: mpsc::UnboundedReceiver<Command>,
    playback: PlaybackController,
    overlay: OverlayController,
    notifier: NotificationSynchronizer,
    capability: Arc<dyn OverlayCapability>,
    status: watch::Sender<StatusReport>,
    monitor: Option<ForegroundMonitor>,
    poll_interval: Duration,
    cancel: CancellationToken,
    monitor_task: Option<JoinHandle<()>>,
}

impl ServiceSupervisor {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            mut speech,
            probe,
            capability,
            bubble,
            status: mut status_surface,
        } = collaborators;

        let (commands, queue) = command::channel();
        speech.attach(commands.clone());
        status_surface.attach(commands.clone());

        let notifier = NotificationSynchronizer::new(&config.notification, status_surface);
        let playback = PlaybackController::new(HeadlineQueue::new(config.headlines), speech);
        let overlay = OverlayController::new(
            Arc::clone(&capability),
            bubble,
            config.overlay,
            GestureThresholds::from(&config.gesture),
            commands.clone(),
        );
        let (status, _) = watch::channel(StatusReport {
            snapshot: playback.snapshot(),
            bubble: overlay.status(),
            position: overlay.geometry(),
        });

        Self {
            commands,
            queue,
            playback,
            overlay,
            notifier,
            capability,
            status,
            monitor: Some(ForegroundMonitor::new(probe, &config.foreground.host_app)),
            poll_interval: Duration::from_millis(config.foreground.poll_interval_ms),
            cancel: CancellationToken::new(),
            monitor_task: None,
        }
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            commands: self.commands.clone(),
            status: self.status.subscribe(),
        }
    }

    /// Run until playback stops or `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        self.startup().await;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                command = self.queue.recv() => {
                    let Some(command) = command else { break };
                    self.dispatch(command);
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    self.apply(PlaybackCommand::Stop);
                }
            }
            if self.playback.state() == PlaybackState::Stopped {
                break;
            }
        }

        self.teardown().await;
    }

    async fn startup(&mut self) {
        let snapshot = self.playback.snapshot();
        self.refresh(&snapshot);
        self.apply(PlaybackCommand::Start);

        let host_foreground = match self.monitor.take() {
            Some(mut monitor) => {
                let foreground = monitor.baseline().await;
                self.monitor_task = Some(monitor.spawn(
                    self.poll_interval,
                    self.commands.clone(),
                    self.cancel.clone(),
                ));
                foreground
            }
            None => false,
        };

        if self.overlay.evaluate(host_foreground) {
            self.sync_status();
        }
        info!("Service ready ({})", self.playback.state());
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::Playback(command) => self.apply(command),
            Command::UtteranceFinished(utterance) => {
                if let Some(snapshot) = self.playback.utterance_finished(utterance) {
                    self.refresh(&snapshot);
                }
            }
            Command::Foreground(edge) => {
                if self.overlay.on_foreground(edge) {
                    self.sync_status();
                }
            }
            Command::Pointer(event) => {
                let before = self.overlay.geometry();
                if let Some(command) = self.overlay.on_pointer(event) {
                    self.apply(command);
                } else if self.overlay.geometry() != before {
                    self.publish(self.playback.snapshot());
                }
            }
            Command::LongPressElapsed { generation } => {
                if let Some(command) = self.overlay.long_press_elapsed(generation) {
                    self.apply(command);
                }
            }
            Command::AppendHeadlines(items) => {
                if let Some(snapshot) = self.playback.append(items) {
                    self.refresh(&snapshot);
                }
            }
            Command::ClearHeadlines => {
                if let Some(snapshot) = self.playback.clear() {
                    self.refresh(&snapshot);
                }
            }
            Command::RequestOverlay => {
                self.capability.request_capability();
                if self.overlay.reconcile() {
                    self.sync_status();
                }
            }
        }
    }

    fn apply(&mut self, command: PlaybackCommand) {
        debug!("Command: {command}");
        if let Some(snapshot) = self.playback.handle(command) {
            self.refresh(&snapshot);
        }
    }

    /// Push a new snapshot to every surface.
    fn refresh(&mut self, snapshot: &PlaybackSnapshot) {
        self.overlay.render(snapshot);
        let bubble = self.overlay.status();
        self.notifier.sync(snapshot, bubble);
        self.publish(snapshot.clone());
    }

    fn publish(&self, snapshot: PlaybackSnapshot) {
        self.status.send_replace(StatusReport {
            snapshot,
            bubble: self.overlay.status(),
            position: self.overlay.geometry(),
        });
    }

    /// Bubble visibility changed; the notification mentions it.
    fn sync_status(&mut self) {
        let snapshot = self.playback.snapshot();
        self.notifier.sync(&snapshot, self.overlay.status());
        self.publish(snapshot);
    }

    async fn teardown(&mut self) {
        self.overlay.release();
        self.cancel.cancel();
        if let Some(task) = self.monitor_task.take() {
            if let Err(e) = task.await {
                warn!("Foreground monitor task failed: {e}");
            }
        }
        self.playback.shutdown();
        self.queue.close();

        self.publish(self.playback.snapshot());
        info!("Service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::GestureEvent;
    use crate::notifier::tests::FakeStatus;
    use crate::overlay::tests::{FakeCapability, FakeSurface, SurfaceCall};
    use crate::playback::tests::FakeSpeech;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    struct FakeProbe {
        active: Mutex<Option<String>>,
    }

    impl FakeProbe {
        fn new(active: &str) -> Arc<Self> {
            Arc::new(Self {
                active: Mutex::new(Some(active.to_string())),
            })
        }

        fn set(&self, active: &str) {
            *self.active.lock().unwrap() = Some(active.to_string());
        }
    }

    impl ActiveAppProbe for FakeProbe {
        fn active_app(&self) -> Option<String> {
            self.active.lock().unwrap().clone()
        }
    }

    struct Harness {
        handle: ServiceHandle,
        speech: FakeSpeech,
        bubble: FakeSurface,
        status: FakeStatus,
        capability: Arc<FakeCapability>,
        probe: Arc<FakeProbe>,
        shutdown: Option<oneshot::Sender<()>>,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn start(headlines: &[&str], granted: bool, active: &str) -> Self {
            Self::start_polling(headlines, granted, active, 20)
        }

        fn start_polling(headlines: &[&str], granted: bool, active: &str, poll_ms: u64) -> Self {
            let mut config = Config::default();
            config.headlines = headlines.iter().map(|s| s.to_string()).collect();
            config.foreground.poll_interval_ms = poll_ms;

            let speech = FakeSpeech::default();
            let bubble = FakeSurface::default();
            let status = FakeStatus::default();
            let capability = FakeCapability::new(granted);
            let probe = FakeProbe::new(active);

            let supervisor = ServiceSupervisor::new(
                config,
                Collaborators {
                    speech: Box::new(speech.clone()),
                    probe: probe.clone(),
                    capability: capability.clone(),
                    bubble: Box::new(bubble.clone()),
                    status: Box::new(status.clone()),
                },
            );
            let handle = supervisor.handle();
            let (shutdown, shutdown_rx) = oneshot::channel::<()>();
            let task = tokio::spawn(supervisor.run(async move {
                let _ = shutdown_rx.await;
            }));

            Self {
                handle,
                speech,
                bubble,
                status,
                capability,
                probe,
                shutdown: Some(shutdown),
                task,
            }
        }

        async fn wait_for(&self, check: impl FnMut(&StatusReport) -> bool) -> StatusReport {
            let mut rx = self.handle.subscribe();
            let report = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(check))
                .await
                .expect("timed out waiting for status")
                .expect("service dropped its status channel")
                .clone();
            report
        }

        async fn shut_down(mut self) -> Self {
            if let Some(shutdown) = self.shutdown.take() {
                let _ = shutdown.send(());
            }
            (&mut self.task).await.unwrap();
            self
        }
    }

    fn speaking(text: &str) -> impl FnMut(&StatusReport) -> bool + '_ {
        move |report| {
            report.snapshot.state == PlaybackState::Speaking
                && report.snapshot.current_text.as_deref() == Some(text)
        }
    }

    #[tokio::test]
    async fn startup_reads_the_first_headline_and_shows_the_bubble() {
        let service = Harness::start(&["A", "B"], true, "Terminal");

        let report = service
            .wait_for(|r| {
                r.snapshot.state == PlaybackState::Speaking && r.bubble == BubbleStatus::Visible
            })
            .await;
        assert_eq!(report.snapshot.current_text.as_deref(), Some("A"));
        assert_eq!(service.speech.spoken(), vec!["A".to_string()]);
        assert_eq!(service.bubble.shows(), 1);
        assert_eq!(
            service.status.last().unwrap().detail,
            "A\n\n• Bubble visible"
        );

        let service = service.shut_down().await;
        assert_eq!(service.handle.status().snapshot.state, PlaybackState::Stopped);
        assert_eq!(service.handle.status().bubble, BubbleStatus::NotificationOnly);
        assert!(service.speech.stops() >= 1);
        assert_eq!(
            service.bubble.calls.lock().unwrap().last(),
            Some(&SurfaceCall::Hide)
        );
        assert_eq!(service.status.last().unwrap().body, "Playback stopped");
    }

    #[tokio::test]
    async fn completions_advance_through_the_queue_and_wrap() {
        let service = Harness::start(&["A", "B"], false, "Terminal");
        service.wait_for(speaking("A")).await;

        service
            .handle
            .post(Command::UtteranceFinished(service.speech.last_utterance()));
        service.wait_for(speaking("B")).await;

        service
            .handle
            .post(Command::UtteranceFinished(service.speech.last_utterance()));
        service.wait_for(speaking("A")).await;

        assert_eq!(service.speech.spoken(), vec!["A", "B", "A"]);
        service.shut_down().await;
    }

    #[tokio::test]
    async fn stop_action_ends_the_service_and_later_commands_are_dropped() {
        let mut service = Harness::start(&["A"], true, "Terminal");
        service.wait_for(speaking("A")).await;

        service.handle.post(PlaybackCommand::Stop);
        (&mut service.task).await.unwrap();

        let report = service.handle.status();
        assert_eq!(report.snapshot.state, PlaybackState::Stopped);
        assert_eq!(report.bubble, BubbleStatus::NotificationOnly);

        service.handle.post(PlaybackCommand::Start);
        assert_eq!(service.speech.spoken(), vec!["A".to_string()]);
        assert_eq!(service.handle.status().snapshot.state, PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn foreground_edges_hide_and_show_the_bubble() {
        let service = Harness::start(&["A"], true, "Headline Reader");
        let report = service.wait_for(speaking("A")).await;
        assert_eq!(report.bubble, BubbleStatus::HiddenInForeground);
        assert_eq!(service.bubble.shows(), 0);

        service.probe.set("Terminal");
        service.wait_for(|r| r.bubble == BubbleStatus::Visible).await;

        service.probe.set("Headline Reader — home");
        service
            .wait_for(|r| r.bubble == BubbleStatus::HiddenInForeground)
            .await;
        assert_eq!(service.bubble.shows(), 1);
        service.shut_down().await;
    }

    #[tokio::test]
    async fn zero_poll_interval_keeps_tracking_the_foreground() {
        let service = Harness::start_polling(&["A"], true, "Headline Reader", 0);
        service.wait_for(speaking("A")).await;

        service.probe.set("Terminal");
        service.wait_for(|r| r.bubble == BubbleStatus::Visible).await;
        assert!(!service.task.is_finished());
        service.shut_down().await;
    }

    #[tokio::test]
    async fn bubble_gestures_route_through_the_queue() {
        let mut service = Harness::start(&["A", "B"], true, "Terminal");
        service
            .wait_for(|r| r.bubble == BubbleStatus::Visible && r.snapshot.state == PlaybackState::Speaking)
            .await;

        service.handle.post(Command::Pointer(GestureEvent::PointerDown { x: 900.0, y: 320.0, t: 0 }));
        service.handle.post(Command::Pointer(GestureEvent::PointerUp { x: 900.0, y: 320.0, t: 40 }));
        service
            .wait_for(|r| r.snapshot.state == PlaybackState::Paused)
            .await;

        service.handle.post(Command::Pointer(GestureEvent::PointerDown { x: 900.0, y: 320.0, t: 1_000 }));
        (&mut service.task).await.unwrap();
        assert_eq!(service.handle.status().snapshot.state, PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn dragging_the_bubble_updates_the_reported_position() {
        let service = Harness::start(&["A"], true, "Terminal");
        let report = service.wait_for(|r| r.bubble == BubbleStatus::Visible).await;
        assert_eq!(report.position, Some(BubbleGeometry { x: 880.0, y: 300.0 }));

        service.handle.post(Command::Pointer(GestureEvent::PointerDown { x: 900.0, y: 320.0, t: 0 }));
        service.handle.post(Command::Pointer(GestureEvent::PointerMove { x: 850.0, y: 340.0, t: 16 }));
        let report = service
            .wait_for(|r| r.position == Some(BubbleGeometry { x: 830.0, y: 320.0 }))
            .await;
        assert_eq!(report.snapshot.state, PlaybackState::Speaking);

        service.handle.post(Command::Pointer(GestureEvent::PointerUp { x: 850.0, y: 340.0, t: 30 }));
        service.shut_down().await;
    }

    #[tokio::test]
    async fn overlay_request_picks_up_a_late_grant() {
        let service = Harness::start(&["A"], false, "Terminal");
        let report = service.wait_for(speaking("A")).await;
        assert_eq!(report.bubble, BubbleStatus::NotificationOnly);

        service.capability.grant();
        service.handle.post(Command::RequestOverlay);
        service.wait_for(|r| r.bubble == BubbleStatus::Visible).await;
        assert_eq!(*service.capability.requests.lock().unwrap(), 1);
        service.shut_down().await;
    }

    #[tokio::test]
    async fn headlines_can_be_cleared_and_refilled() {
        let service = Harness::start(&["A", "B"], false, "Terminal");
        service.wait_for(speaking("A")).await;

        service.handle.post(Command::ClearHeadlines);
        let report = service
            .wait_for(|r| r.snapshot.queue_size == 0)
            .await;
        assert_eq!(report.snapshot.state, PlaybackState::Idle);
        assert_eq!(service.status.last().unwrap().body, "No headlines available");

        service.handle.post(Command::AppendHeadlines(vec!["X".into()]));
        service.handle.post(PlaybackCommand::Start);
        service.wait_for(speaking("X")).await;
        service.shut_down().await;
    }
}
