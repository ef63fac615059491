//! Text-to-speech collaborators.
//!
//! The playback controller drives an engine through `SpeechEngine` and learns
//! about completion only through `Command::UtteranceFinished`, posted into the
//! command queue exactly once per `speak` call (finished, failed or stopped).
//!
//! Engines:
//! - `EspeakEngine`: one `espeak-ng` child process per utterance, killed on stop
//! - `SilentEngine`: fallback when no engine binary is installed; logs the
//!   text and simulates the time it would take to read it

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandSender};
use crate::config::TtsConfig;

/// Delay before reporting a failed utterance as finished, so a broken engine
/// does not spin through the queue.
const FAILURE_BACKOFF: Duration = Duration::from_millis(500);
const MIN_SIMULATED_UTTERANCE: Duration = Duration::from_secs(1);

/// Identity of one `speak` call. Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtteranceId(pub u64);

impl std::fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech engine '{0}' not found on PATH")]
    NotFound(String),
    #[error("speech engine I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub trait SpeechEngine: Send {
    /// Connect the completion callback to the command queue.
    fn attach(&mut self, completions: CommandSender);

    /// Start speaking, interrupting anything in flight.
    fn speak(&mut self, utterance: UtteranceId, text: &str);

    fn stop(&mut self);

    fn is_busy(&self) -> bool;

    fn shutdown(&mut self) {
        self.stop();
    }
}

/// Initialize the configured engine, falling back to `SilentEngine`.
pub fn init(config: &TtsConfig) -> Box<dyn SpeechEngine> {
    match EspeakEngine::locate(config) {
        Ok(engine) => {
            info!("Speech engine: {}", engine.binary.display());
            Box::new(engine)
        }
        Err(e) => {
            warn!("{e}, falling back to silent speech");
            Box::new(SilentEngine::new(config.words_per_minute))
        }
    }
}

struct InFlight {
    utterance: UtteranceId,
    cancel: oneshot::Sender<()>,
}

/// Bookkeeping shared by both engines: the attached queue, the cancel handle
/// of the utterance in flight, and which utterance the engine is busy with.
#[derive(Default)]
struct Utterances {
    completions: Option<CommandSender>,
    current: Option<InFlight>,
    // 0 = idle
    active: Arc<AtomicU64>,
}

struct Begun {
    completions: CommandSender,
    cancelled: oneshot::Receiver<()>,
    active: Arc<AtomicU64>,
}

impl Utterances {
    fn begin(&mut self, utterance: UtteranceId) -> Option<Begun> {
        self.cancel();
        let Some(completions) = self.completions.clone() else {
            warn!("Speech engine not attached, dropping utterance {utterance}");
            return None;
        };
        let (cancel, cancelled) = oneshot::channel();
        self.current = Some(InFlight { utterance, cancel });
        self.active.store(utterance.0, Ordering::Relaxed);
        Some(Begun {
            completions,
            cancelled,
            active: Arc::clone(&self.active),
        })
    }

    fn cancel(&mut self) {
        if let Some(in_flight) = self.current.take() {
            debug!("Interrupting utterance {}", in_flight.utterance);
            let _ = in_flight.cancel.send(());
        }
    }

    fn is_busy(&self) -> bool {
        self.active.load(Ordering::Relaxed) != 0
    }
}

/// Report completion and clear the busy marker unless a newer utterance took over.
fn finish(utterance: UtteranceId, active: &AtomicU64, completions: &CommandSender) {
    let _ = active.compare_exchange(utterance.0, 0, Ordering::Relaxed, Ordering::Relaxed);
    completions.post(Command::UtteranceFinished(utterance));
}

/// Speaks through an external `espeak-ng`-compatible binary.
pub struct EspeakEngine {
    binary: PathBuf,
    voice: Option<String>,
    words_per_minute: u32,
    utterances: Utterances,
}

impl EspeakEngine {
    pub fn locate(config: &TtsConfig) -> Result<Self, SpeechError> {
        // Bare names are searched on PATH; paths must point at an executable.
        let binary = which::which(&config.engine).map_err(|e| {
            debug!("Lookup of {} failed: {e}", config.engine);
            SpeechError::NotFound(config.engine.clone())
        })?;
        Ok(Self {
            binary,
            voice: config.voice.clone(),
            words_per_minute: config.words_per_minute,
            utterances: Utterances::default(),
        })
    }

    fn command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.binary);
        command.arg("-s").arg(self.words_per_minute.to_string());
        if let Some(voice) = &self.voice {
            command.arg("-v").arg(voice);
        }
        command
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

/// Run one utterance to completion. Returns true if it was interrupted.
async fn run_child(
    mut command: tokio::process::Command,
    text: String,
    cancelled: oneshot::Receiver<()>,
) -> Result<bool, SpeechError> {
    let mut child = command.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).await?;
        // Dropping stdin closes the pipe so the engine sees end of input.
    }

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            if !status.success() {
                debug!("Speech engine exited with {status}");
            }
            Ok(false)
        }
        _ = cancelled => {
            child.kill().await?;
            Ok(true)
        }
    }
}

impl SpeechEngine for EspeakEngine {
    fn attach(&mut self, completions: CommandSender) {
        self.utterances.completions = Some(completions);
    }

    fn speak(&mut self, utterance: UtteranceId, text: &str) {
        let Some(begun) = self.utterances.begin(utterance) else {
            return;
        };
        let command = self.command();
        let text = text.to_string();

        tokio::spawn(async move {
            match run_child(command, text, begun.cancelled).await {
                Ok(false) => debug!("Utterance {utterance} finished"),
                Ok(true) => debug!("Utterance {utterance} interrupted"),
                Err(e) => {
                    warn!("Utterance {utterance} failed: {e}");
                    tokio::time::sleep(FAILURE_BACKOFF).await;
                }
            }
            finish(utterance, &begun.active, &begun.completions);
        });
    }

    fn stop(&mut self) {
        self.utterances.cancel();
    }

    fn is_busy(&self) -> bool {
        self.utterances.is_busy()
    }
}

/// Logs instead of speaking, taking roughly as long as reading aloud would.
pub struct SilentEngine {
    words_per_minute: u32,
    utterances: Utterances,
}

impl SilentEngine {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute,
            utterances: Utterances::default(),
        }
    }

    fn duration_for(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as u64;
        let wpm = u64::from(self.words_per_minute.max(1));
        Duration::from_millis(words * 60_000 / wpm).max(MIN_SIMULATED_UTTERANCE)
    }
}

impl SpeechEngine for SilentEngine {
    fn attach(&mut self, completions: CommandSender) {
        self.utterances.completions = Some(completions);
    }

    fn speak(&mut self, utterance: UtteranceId, text: &str) {
        let duration = self.duration_for(text);
        let Some(begun) = self.utterances.begin(utterance) else {
            return;
        };
        info!("(silent) {utterance}: {text}");

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = begun.cancelled => {}
            }
            finish(utterance, &begun.active, &begun.completions);
        });
    }

    fn stop(&mut self) {
        self.utterances.cancel();
    }

    fn is_busy(&self) -> bool {
        self.utterances.is_busy()
    }
}
