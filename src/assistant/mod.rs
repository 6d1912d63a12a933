//! Lifecycle of the scanning assistant: `Disabled -> Enabled -> Disabled`.
//!
//! While disabled the collaborators are parked here. `enable` moves them into
//! a [`GuidanceCore`] owned by the analysis loop task; `disable` cancels the
//! loop, takes the core back and releases audio and camera.

use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::capture::CapturePhase;
use crate::edge::EdgeState;
use crate::feedback::{
    AudioOutput, AudioUnlockState, FeedbackEngine, Locale, MessageKey, Priority, RodioOutput,
    SpeechSynth, SystemSpeech,
};
use crate::pipeline::{CapturePipeline, PageSink, PerspectiveCorrector, ProjectiveCorrector};
use crate::sensing::guidance::{Collaborators, GuidanceCore};
use crate::sensing::loop_worker::analysis_loop;
use crate::sensing::{ContourDetector, FrameSource};
use crate::settings::AssistantSettings;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActivationSource {
    Manual,
    ScreenReader,
}

/// Requests applied by the analysis loop between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssistantCommand {
    CaptureNow,
    SetVolume(f32),
    SetLocale(Locale),
    SetAutoCapture(bool),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnableReport {
    pub already_enabled: bool,
    pub degraded: bool,
    pub capture_available: bool,
    pub audio: AudioUnlockState,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AssistantSnapshot {
    pub enabled: bool,
    pub degraded: bool,
    pub capture_available: bool,
    pub edge_state: EdgeState,
    pub confidence: f32,
    pub phase: CapturePhase,
    pub stability: u32,
    pub captures_taken: u64,
    pub audio: Option<AudioUnlockState>,
}

/// The ports an assistant is assembled from.
pub struct AssistantParts {
    pub frames: Box<dyn FrameSource>,
    /// `None` when the detection library could not be loaded.
    pub detector: Option<Box<dyn ContourDetector>>,
    pub output: Box<dyn AudioOutput>,
    pub speech: Box<dyn SpeechSynth>,
    pub corrector: Box<dyn PerspectiveCorrector>,
    pub sink: Box<dyn PageSink>,
}

impl AssistantParts {
    /// rodio output, the platform speech command and the imageproc corrector.
    pub fn with_defaults(
        frames: Box<dyn FrameSource>,
        detector: Option<Box<dyn ContourDetector>>,
        sink: Box<dyn PageSink>,
    ) -> Self {
        Self {
            frames,
            detector,
            output: Box::new(RodioOutput::new()),
            speech: Box::new(SystemSpeech::new()),
            corrector: Box::new(ProjectiveCorrector::new()),
            sink,
        }
    }
}

/// Run a detector loader, logging a failure and yielding `None` so the
/// assistant starts in degraded mode.
pub fn load_detector<F>(loader: F) -> Option<Box<dyn ContourDetector>>
where
    F: FnOnce() -> Result<Box<dyn ContourDetector>>,
{
    match loader() {
        Ok(detector) => Some(detector),
        Err(e) => {
            log_error!("Contour detector failed to load, guidance disabled: {e:#}");
            None
        }
    }
}

/// Open the camera, prepare the capture surface and unlock audio. The
/// collaborators always come back, so a failed attempt can be retried.
fn acquire_devices(
    mut parts: Collaborators,
) -> (Collaborators, Result<(bool, AudioUnlockState)>) {
    let mut opened = false;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(bool, AudioUnlockState)> {
        parts
            .frames
            .open()
            .context("failed to open camera stream")?;
        opened = true;

        let capture_available = match parts.frames.prepare_capture() {
            Ok(()) => true,
            Err(e) => {
                log_error!("Capture surface unavailable, guidance only: {e:#}");
                false
            }
        };
        Ok((capture_available, parts.feedback.enable()))
    }))
    .unwrap_or_else(|_| Err(anyhow!("device setup panicked")));

    if outcome.is_err() && opened {
        parts.frames.close();
    }
    (parts, outcome)
}

struct Session {
    handle: JoinHandle<GuidanceCore>,
    cancel_token: CancellationToken,
    commands: mpsc::UnboundedSender<AssistantCommand>,
    report: EnableReport,
}

pub struct Assistant {
    settings: AssistantSettings,
    parked: Option<Collaborators>,
    session: Option<Session>,
    status_tx: watch::Sender<AssistantSnapshot>,
    status_rx: watch::Receiver<AssistantSnapshot>,
}

impl Assistant {
    pub fn new(parts: AssistantParts, settings: AssistantSettings) -> Result<Self> {
        settings.validate().context("invalid assistant settings")?;

        let feedback = FeedbackEngine::new(parts.output, parts.speech, settings.feedback());
        let pipeline = CapturePipeline::new(parts.corrector, settings.pipeline());
        let (status_tx, status_rx) = watch::channel(AssistantSnapshot::default());

        Ok(Self {
            settings,
            parked: Some(Collaborators {
                frames: parts.frames,
                detector: parts.detector,
                feedback,
                pipeline,
                sink: parts.sink,
            }),
            session: None,
            status_tx,
            status_rx,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.session.is_some()
    }

    pub fn settings(&self) -> &AssistantSettings {
        &self.settings
    }

    /// Start guidance. Call from the user gesture that activates the
    /// assistant so audio can be unlocked.
    ///
    /// Calling this while enabled changes nothing and reports
    /// `already_enabled`. Only a camera that cannot be opened is an error;
    /// everything else degrades. Device setup runs on the blocking pool.
    pub async fn enable(&mut self, source: ActivationSource) -> Result<EnableReport> {
        if let Some(session) = &self.session {
            return Ok(EnableReport {
                already_enabled: true,
                ..session.report
            });
        }

        let parts = self
            .parked
            .take()
            .ok_or_else(|| anyhow!("assistant collaborators were lost in an earlier session"))?;

        // Opening the camera and the audio device both block on hardware.
        let (mut parts, acquired) = tokio::task::spawn_blocking(move || acquire_devices(parts))
            .await
            .context("device acquisition worker join failed")?;
        let (capture_available, audio) = match acquired {
            Ok(devices) => devices,
            Err(e) => {
                self.parked = Some(parts);
                return Err(e);
            }
        };

        let degraded = parts.detector.is_none();

        match source {
            ActivationSource::ScreenReader => log_info!("Assistant enabled by screen reader"),
            ActivationSource::Manual => log_info!("Assistant enabled"),
        }

        let now = Instant::now();
        parts
            .feedback
            .say(MessageKey::AssistantEnabled, Priority::Force, now);
        if degraded {
            log_warn!("No contour detector; running in degraded mode");
            parts
                .feedback
                .say(MessageKey::GuidanceUnavailable, Priority::Force, now);
        }

        let (countdown_tx, countdown_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let core = GuidanceCore::new(
            parts,
            &self.settings,
            capture_available,
            countdown_tx,
            self.status_tx.clone(),
        );

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(analysis_loop(
            core,
            command_rx,
            countdown_rx,
            cancel_token.clone(),
        ));

        let report = EnableReport {
            already_enabled: false,
            degraded,
            capture_available,
            audio,
        };
        self.session = Some(Session {
            handle,
            cancel_token,
            commands: command_tx,
            report,
        });
        Ok(report)
    }

    /// Stop guidance and release audio and camera. A no-op when disabled.
    ///
    /// The session is always cleared. If the loop task was lost its
    /// collaborators go with it, and the error says so.
    pub async fn disable(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        session.cancel_token.cancel();
        let joined = session.handle.await;
        self.status_tx.send_replace(AssistantSnapshot::default());

        match joined {
            Ok(core) => {
                self.parked = Some(core.teardown());
                log_info!("Assistant disabled");
                Ok(())
            }
            Err(e) => {
                log_error!("Analysis loop task was lost, camera and audio not released: {e}");
                Err(anyhow!(e).context("analysis loop task failed to join"))
            }
        }
    }

    /// Forward a command to the running loop, or apply it to the parked
    /// collaborators while disabled.
    pub fn send(&mut self, command: AssistantCommand) -> Result<()> {
        match command {
            AssistantCommand::SetVolume(volume) if volume.is_finite() => {
                self.settings.volume = volume.clamp(0.0, 1.0);
            }
            AssistantCommand::SetLocale(locale) => self.settings.locale = locale,
            AssistantCommand::SetAutoCapture(enabled) => self.settings.auto_capture = enabled,
            _ => {}
        }

        if let Some(session) = &self.session {
            return session
                .commands
                .send(command)
                .map_err(|_| anyhow!("analysis loop is not running"));
        }

        match command {
            AssistantCommand::CaptureNow => bail!("assistant is not enabled"),
            AssistantCommand::SetVolume(volume) => {
                if let Some(parts) = self.parked.as_mut() {
                    parts.feedback.set_volume(volume);
                }
            }
            AssistantCommand::SetLocale(locale) => {
                if let Some(parts) = self.parked.as_mut() {
                    parts.feedback.set_locale(locale);
                }
            }
            AssistantCommand::SetAutoCapture(_) => {}
        }
        Ok(())
    }

    pub fn capture_now(&mut self) -> Result<()> {
        self.send(AssistantCommand::CaptureNow)
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.send(AssistantCommand::SetVolume(volume))
    }

    pub fn set_locale(&mut self, locale: Locale) -> Result<()> {
        self.send(AssistantCommand::SetLocale(locale))
    }

    pub fn set_auto_capture(&mut self, enabled: bool) -> Result<()> {
        self.send(AssistantCommand::SetAutoCapture(enabled))
    }

    pub fn status(&self) -> AssistantSnapshot {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AssistantSnapshot> {
        self.status_rx.clone()
    }
}

impl Drop for Assistant {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel_token.cancel();
        }
    }
}
