//! Playback state machine.
//!
//! IDLE → SPEAKING ⇄ PAUSED, any → STOPPED (terminal)
//!
//! `PlaybackController` is the only writer of playback state. It is driven
//! one command at a time by the service task and answers every transition
//! with a fresh `PlaybackSnapshot`; `None` means nothing observable changed.

use serde::Serialize;
use tracing::{debug, info};

use crate::command::PlaybackCommand;
use crate::queue::HeadlineQueue;
use crate::speech::{SpeechEngine, UtteranceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Never started, or ran out of content.
    Idle,
    /// An utterance is in flight.
    Speaking,
    /// Halted by the user; resuming restarts the current headline.
    Paused,
    /// Terminal.
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Speaking => write!(f, "SPEAKING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Read-only view handed to the notification and overlay after each transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackSnapshot {
    pub current_text: Option<String>,
    pub state: PlaybackState,
    pub queue_size: usize,
    pub cursor: usize,
}

pub struct PlaybackController {
    queue: HeadlineQueue,
    state: PlaybackState,
    speech: Box<dyn SpeechEngine>,
    last_utterance: u64,
    in_flight: Option<UtteranceId>,
}

impl PlaybackController {
    pub fn new(queue: HeadlineQueue, speech: Box<dyn SpeechEngine>) -> Self {
        Self {
            queue,
            state: PlaybackState::Idle,
            speech,
            last_utterance: 0,
            in_flight: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            current_text: self.queue.current().map(String::from),
            state: self.state,
            queue_size: self.queue.len(),
            cursor: self.queue.cursor(),
        }
    }

    pub fn handle(&mut self, command: PlaybackCommand) -> Option<PlaybackSnapshot> {
        if self.state == PlaybackState::Stopped {
            debug!("Ignoring {command} after stop");
            return None;
        }

        let changed = match command {
            PlaybackCommand::Start => match self.state {
                PlaybackState::Speaking => false,
                _ => self.speak_current(),
            },
            PlaybackCommand::Toggle => match self.state {
                PlaybackState::Speaking => self.pause(),
                _ => self.speak_current(),
            },
            PlaybackCommand::Next => self.skip(HeadlineQueue::advance),
            PlaybackCommand::Previous => self.skip(HeadlineQueue::retreat),
            PlaybackCommand::Stop => {
                self.silence();
                self.transition(PlaybackState::Stopped);
                true
            }
        };

        changed.then(|| self.snapshot())
    }

    /// Completion callback from the speech engine. Auto-advances when the
    /// utterance in flight finishes; stale completions are ignored.
    pub fn utterance_finished(&mut self, utterance: UtteranceId) -> Option<PlaybackSnapshot> {
        if self.state != PlaybackState::Speaking || self.in_flight != Some(utterance) {
            debug!("Ignoring stale completion {utterance}");
            return None;
        }
        self.in_flight = None;

        if self.queue.advance().is_none() || !self.speak_current() {
            self.transition(PlaybackState::Idle);
        }
        Some(self.snapshot())
    }

    pub fn append(&mut self, items: Vec<String>) -> Option<PlaybackSnapshot> {
        if self.state == PlaybackState::Stopped || items.is_empty() {
            return None;
        }
        info!("Queued {} headline(s)", items.len());
        self.queue.append(items);
        Some(self.snapshot())
    }

    /// Empty the queue. Anything speaking or paused falls back to Idle.
    pub fn clear(&mut self) -> Option<PlaybackSnapshot> {
        if self.state == PlaybackState::Stopped {
            return None;
        }
        self.silence();
        self.queue.clear();
        self.transition(PlaybackState::Idle);
        info!("Headline queue cleared");
        Some(self.snapshot())
    }

    /// Release the speech engine. Called once during teardown.
    pub fn shutdown(&mut self) {
        self.speech.shutdown();
    }

    fn speak_current(&mut self) -> bool {
        let Some(text) = self.queue.current() else {
            debug!("No headline to speak");
            return false;
        };
        self.last_utterance += 1;
        let utterance = UtteranceId(self.last_utterance);
        debug!("Speaking {utterance}: {text}");
        self.speech.speak(utterance, text);
        self.in_flight = Some(utterance);
        self.transition(PlaybackState::Speaking);
        true
    }

    fn pause(&mut self) -> bool {
        self.silence();
        self.transition(PlaybackState::Paused);
        true
    }

    fn skip(&mut self, step: fn(&mut HeadlineQueue) -> Option<&str>) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        step(&mut self.queue);
        self.speak_current()
    }

    fn silence(&mut self) {
        if self.in_flight.take().is_some() || self.speech.is_busy() {
            self.speech.stop();
        }
    }

    fn transition(&mut self, to: PlaybackState) {
        if self.state != to {
            info!("State: {} → {}", self.state, to);
        }
        self.state = to;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::command::CommandSender;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum SpeechCall {
        Speak(UtteranceId, String),
        Stop,
    }

    /// Records calls; "busy" from speak until stop.
    #[derive(Clone, Default)]
    pub(crate) struct FakeSpeech {
        pub calls: Arc<Mutex<Vec<SpeechCall>>>,
        busy: Arc<Mutex<bool>>,
    }

    impl FakeSpeech {
        pub fn spoken(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|call| match call {
                    SpeechCall::Speak(_, text) => Some(text.clone()),
                    SpeechCall::Stop => None,
                })
                .collect()
        }

        pub fn last_utterance(&self) -> UtteranceId {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find_map(|call| match call {
                    SpeechCall::Speak(id, _) => Some(*id),
                    SpeechCall::Stop => None,
                })
                .expect("nothing spoken yet")
        }

        pub fn stops(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| **call == SpeechCall::Stop)
                .count()
        }
    }

    impl SpeechEngine for FakeSpeech {
        fn attach(&mut self, _completions: CommandSender) {}

        fn speak(&mut self, utterance: UtteranceId, text: &str) {
            *self.busy.lock().unwrap() = true;
            self.calls
                .lock()
                .unwrap()
                .push(SpeechCall::Speak(utterance, text.to_string()));
        }

        fn stop(&mut self) {
            *self.busy.lock().unwrap() = false;
            self.calls.lock().unwrap().push(SpeechCall::Stop);
        }

        fn is_busy(&self) -> bool {
            *self.busy.lock().unwrap()
        }
    }

    fn controller(items: &[&str]) -> (PlaybackController, FakeSpeech) {
        let speech = FakeSpeech::default();
        let queue = HeadlineQueue::new(items.iter().map(|s| s.to_string()).collect());
        (PlaybackController::new(queue, Box::new(speech.clone())), speech)
    }

    fn current(snapshot: &Option<PlaybackSnapshot>) -> (Option<&str>, PlaybackState) {
        let snapshot = snapshot.as_ref().expect("expected a transition");
        (snapshot.current_text.as_deref(), snapshot.state)
    }

    #[test]
    fn reads_through_the_queue_and_wraps() {
        let (mut controller, speech) = controller(&["A", "B", "C"]);

        let s = controller.handle(PlaybackCommand::Start);
        assert_eq!(current(&s), (Some("A"), PlaybackState::Speaking));

        let s = controller.utterance_finished(speech.last_utterance());
        assert_eq!(current(&s), (Some("B"), PlaybackState::Speaking));

        let s = controller.handle(PlaybackCommand::Next);
        assert_eq!(current(&s), (Some("C"), PlaybackState::Speaking));

        let s = controller.utterance_finished(speech.last_utterance());
        assert_eq!(current(&s), (Some("A"), PlaybackState::Speaking));
        assert_eq!(s.unwrap().cursor, 0);

        assert_eq!(speech.spoken(), vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn toggle_twice_restarts_the_same_headline() {
        let (mut controller, speech) = controller(&["A", "B"]);
        controller.handle(PlaybackCommand::Start);

        let s = controller.handle(PlaybackCommand::Toggle);
        assert_eq!(current(&s), (Some("A"), PlaybackState::Paused));
        assert_eq!(speech.stops(), 1);

        let s = controller.handle(PlaybackCommand::Toggle);
        assert_eq!(current(&s), (Some("A"), PlaybackState::Speaking));
        assert_eq!(speech.spoken(), vec!["A", "A"]);
    }

    #[test]
    fn start_is_idempotent_while_speaking() {
        let (mut controller, speech) = controller(&["A"]);
        assert!(controller.handle(PlaybackCommand::Start).is_some());
        assert!(controller.handle(PlaybackCommand::Start).is_none());
        assert_eq!(speech.spoken(), vec!["A"]);
    }

    #[test]
    fn start_resumes_when_paused() {
        let (mut controller, speech) = controller(&["A", "B"]);
        controller.handle(PlaybackCommand::Start);
        controller.handle(PlaybackCommand::Toggle);

        let s = controller.handle(PlaybackCommand::Start);
        assert_eq!(current(&s), (Some("A"), PlaybackState::Speaking));
        assert_eq!(speech.spoken(), vec!["A", "A"]);
    }

    #[test]
    fn start_on_empty_queue_stays_idle() {
        let (mut controller, speech) = controller(&[]);
        assert!(controller.handle(PlaybackCommand::Start).is_none());
        assert!(controller.handle(PlaybackCommand::Toggle).is_none());
        assert!(controller.handle(PlaybackCommand::Next).is_none());
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(speech.spoken().is_empty());
    }

    #[test]
    fn next_while_paused_speaks_the_following_headline() {
        let (mut controller, _speech) = controller(&["A", "B", "C"]);
        controller.handle(PlaybackCommand::Start);
        controller.handle(PlaybackCommand::Toggle);

        let s = controller.handle(PlaybackCommand::Next);
        assert_eq!(current(&s), (Some("B"), PlaybackState::Speaking));
    }

    #[test]
    fn previous_wraps_to_the_last_headline() {
        let (mut controller, _speech) = controller(&["A", "B", "C"]);
        controller.handle(PlaybackCommand::Start);

        let s = controller.handle(PlaybackCommand::Previous);
        assert_eq!(current(&s), (Some("C"), PlaybackState::Speaking));
        assert_eq!(s.unwrap().cursor, 2);
    }

    #[test]
    fn interrupted_utterance_completion_does_not_double_advance() {
        let (mut controller, speech) = controller(&["A", "B", "C"]);
        controller.handle(PlaybackCommand::Start);
        let first = speech.last_utterance();

        controller.handle(PlaybackCommand::Next);
        // The engine reports the interrupted "A" as finished after the skip.
        assert!(controller.utterance_finished(first).is_none());

        let s = controller.utterance_finished(speech.last_utterance());
        assert_eq!(current(&s), (Some("C"), PlaybackState::Speaking));
    }

    #[test]
    fn completion_while_paused_is_ignored() {
        let (mut controller, speech) = controller(&["A", "B"]);
        controller.handle(PlaybackCommand::Start);
        let utterance = speech.last_utterance();
        controller.handle(PlaybackCommand::Toggle);

        assert!(controller.utterance_finished(utterance).is_none());
        assert_eq!(controller.snapshot().current_text.as_deref(), Some("A"));
    }

    #[test]
    fn nothing_changes_after_stop() {
        let (mut controller, speech) = controller(&["A", "B"]);
        controller.handle(PlaybackCommand::Start);
        let utterance = speech.last_utterance();

        let stopped = controller.handle(PlaybackCommand::Stop);
        assert_eq!(current(&stopped), (Some("A"), PlaybackState::Stopped));
        let before = controller.snapshot();

        for command in [
            PlaybackCommand::Start,
            PlaybackCommand::Toggle,
            PlaybackCommand::Next,
            PlaybackCommand::Previous,
            PlaybackCommand::Stop,
        ] {
            assert!(controller.handle(command).is_none());
        }
        assert!(controller.utterance_finished(utterance).is_none());
        assert!(controller.append(vec!["C".into()]).is_none());
        assert!(controller.clear().is_none());

        assert_eq!(controller.snapshot(), before);
        assert_eq!(speech.spoken(), vec!["A"]);
    }

    #[test]
    fn clear_while_speaking_returns_to_idle() {
        let (mut controller, speech) = controller(&["A", "B"]);
        controller.handle(PlaybackCommand::Start);

        let s = controller.clear().unwrap();
        assert_eq!(s.state, PlaybackState::Idle);
        assert_eq!(s.queue_size, 0);
        assert_eq!(s.current_text, None);
        assert_eq!(speech.stops(), 1);
    }

    #[test]
    fn appended_headlines_are_read_after_the_current_one() {
        let (mut controller, speech) = controller(&["A"]);
        controller.handle(PlaybackCommand::Start);

        let s = controller.append(vec!["B".into()]).unwrap();
        assert_eq!(s.queue_size, 2);
        assert!(controller.append(Vec::new()).is_none());

        let s = controller.utterance_finished(speech.last_utterance());
        assert_eq!(current(&s), (Some("B"), PlaybackState::Speaking));
    }

    #[test]
    fn refilled_queue_can_start_again() {
        let (mut controller, _speech) = controller(&["A"]);
        controller.handle(PlaybackCommand::Start);
        controller.clear();
        assert!(controller.handle(PlaybackCommand::Start).is_none());

        controller.append(vec!["fresh".into()]);
        let s = controller.handle(PlaybackCommand::Start);
        assert_eq!(current(&s), (Some("fresh"), PlaybackState::Speaking));
    }
}
