use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::time::Instant;

use super::i18n::Locale;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Minimum gap between two announcements unless the later one is forced.
pub const DEFAULT_ANNOUNCEMENT_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    /// Never throttled. Used for safety-relevant and timed cues.
    Force,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementRequest {
    pub text: String,
    pub locale: Locale,
    pub priority: Priority,
}

/// Speech synthesis collaborator. `speak` must not wait for the utterance.
pub trait SpeechSynth: Send {
    fn speak(&mut self, text: &str, locale: Locale, volume: f32) -> Result<()>;

    /// Stop anything currently being spoken.
    fn cancel(&mut self) -> Result<()> {
        Ok(())
    }

    /// Engines that stay mute until an utterance is issued inside a user gesture.
    fn requires_explicit_unlock(&self) -> bool {
        false
    }
}

/// Drops `Normal` requests that arrive too soon after the previous announcement.
/// Suppressed requests are never queued.
#[derive(Debug, Clone)]
pub struct AnnouncementThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl AnnouncementThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Returns whether the request may be spoken, and if so restarts the window.
    pub fn admit(&mut self, priority: Priority, now: Instant) -> bool {
        let allowed = match (priority, self.last) {
            (Priority::Force, _) | (Priority::Normal, None) => true,
            (Priority::Normal, Some(last)) => now.saturating_duration_since(last) >= self.min_interval,
        };
        if allowed {
            self.last = Some(now);
        }
        allowed
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for AnnouncementThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_ANNOUNCEMENT_INTERVAL)
    }
}

/// Builds the process that speaks one utterance.
pub type SpeechCommandBuilder = dyn Fn(&str, Locale, f32) -> Command + Send + Sync;

/// How often the speech thread checks whether the current utterance ended.
const SPEECH_POLL_INTERVAL: Duration = Duration::from_millis(50);
const CANCEL_ACK_TIMEOUT: Duration = Duration::from_secs(1);

enum SpeechCommand {
    Speak {
        text: String,
        locale: Locale,
        volume: f32,
    },
    Cancel(mpsc::Sender<()>),
}

/// Speaks through the platform speech command (`say` on macOS, `spd-say`
/// elsewhere). Utterances queue on a dedicated thread and run one process
/// at a time; every process is waited on.
pub struct SystemSpeech {
    tx: Option<mpsc::Sender<SpeechCommand>>,
    build: Arc<SpeechCommandBuilder>,
}

impl SystemSpeech {
    pub fn new() -> Self {
        Self::with_command(platform_command)
    }

    /// Use a custom speech command instead of the platform default.
    pub fn with_command<F>(build: F) -> Self
    where
        F: Fn(&str, Locale, f32) -> Command + Send + Sync + 'static,
    {
        Self {
            tx: None,
            build: Arc::new(build),
        }
    }

    fn ensure_thread(&mut self) -> Result<mpsc::Sender<SpeechCommand>> {
        if let Some(tx) = self.tx.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<SpeechCommand>();
        let build = Arc::clone(&self.build);
        thread::Builder::new()
            .name("speech-output".to_string())
            .spawn(move || speech_worker(rx, build))
            .context("failed to spawn speech thread")?;

        self.tx = Some(tx.clone());
        Ok(tx)
    }

    fn send(&mut self, cmd: SpeechCommand) -> Result<()> {
        let tx = self.ensure_thread()?;
        if tx.send(cmd).is_err() {
            // The thread is gone; the next utterance starts a new one.
            self.tx = None;
            return Err(anyhow!("speech thread has exited"));
        }
        Ok(())
    }
}

impl Default for SystemSpeech {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSynth for SystemSpeech {
    fn speak(&mut self, text: &str, locale: Locale, volume: f32) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.send(SpeechCommand::Speak {
            text: text.to_string(),
            locale,
            volume,
        })
    }

    /// Kill the running utterance and drop queued ones. Returns once the
    /// process has been reaped.
    fn cancel(&mut self) -> Result<()> {
        if self.tx.is_none() {
            return Ok(());
        }
        let (ack_tx, ack_rx) = mpsc::channel();
        self.send(SpeechCommand::Cancel(ack_tx))?;
        ack_rx
            .recv_timeout(CANCEL_ACK_TIMEOUT)
            .context("speech thread did not acknowledge cancel")
    }
}

struct Utterance {
    text: String,
    locale: Locale,
    volume: f32,
}

fn speech_worker(rx: mpsc::Receiver<SpeechCommand>, build: Arc<SpeechCommandBuilder>) {
    let mut pending: VecDeque<Utterance> = VecDeque::new();
    let mut current: Option<Child> = None;

    loop {
        if let Some(child) = current.as_mut() {
            match child.try_wait() {
                Ok(Some(_)) => current = None,
                Ok(None) => {}
                Err(e) => {
                    log_warn!("Lost track of speech process: {e}");
                    stop(&mut current);
                }
            }
        }

        while current.is_none() {
            let Some(next) = pending.pop_front() else {
                break;
            };
            match spawn_utterance(&*build, &next) {
                Ok(child) => current = Some(child),
                Err(e) => log_warn!("Speech failed: {e:#}"),
            }
        }

        let received = if current.is_some() {
            match rx.recv_timeout(SPEECH_POLL_INTERVAL) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };

        match received {
            Some(SpeechCommand::Speak {
                text,
                locale,
                volume,
            }) => pending.push_back(Utterance {
                text,
                locale,
                volume,
            }),
            Some(SpeechCommand::Cancel(ack)) => {
                if !pending.is_empty() {
                    log_debug!("Dropping {} queued utterances", pending.len());
                }
                pending.clear();
                stop(&mut current);
                let _ = ack.send(());
            }
            None => {}
        }
    }

    stop(&mut current);
}

fn spawn_utterance(build: &SpeechCommandBuilder, utterance: &Utterance) -> Result<Child> {
    build(&utterance.text, utterance.locale, utterance.volume)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to start speech command")
}

fn stop(current: &mut Option<Child>) {
    if let Some(mut child) = current.take() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(target_os = "macos")]
fn platform_command(text: &str, locale: Locale, volume: f32) -> Command {
    let voice = match locale {
        Locale::En => "Samantha",
        Locale::De => "Anna",
        Locale::Fr => "Thomas",
        Locale::Es => "Monica",
    };
    let mut cmd = Command::new("say");
    cmd.arg("-v")
        .arg(voice)
        .arg(format!("[[volm {:.2}]] {}", volume.clamp(0.0, 1.0), text));
    cmd
}

#[cfg(not(target_os = "macos"))]
fn platform_command(text: &str, locale: Locale, volume: f32) -> Command {
    // spd-say takes volume in -100..=100.
    let volume = (volume.clamp(0.0, 1.0) * 200.0 - 100.0).round() as i32;
    let mut cmd = Command::new("spd-say");
    cmd.arg("-l")
        .arg(locale.language())
        .arg("-i")
        .arg(volume.to_string())
        .arg("--")
        .arg(text);
    cmd
}
