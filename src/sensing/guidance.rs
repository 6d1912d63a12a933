use std::panic::{self, AssertUnwindSafe};

use tokio::sync::{mpsc::UnboundedSender, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::capture::{
    spawn_countdown, AutoCaptureController, ControllerEvent, CountdownStep, CountdownTick,
    COUNTDOWN_PERIOD,
};
use crate::edge::{EdgeState, EdgeStateMachine, EdgeTransition};
use crate::feedback::{Cue, FeedbackEngine, MessageKey, Priority};
use crate::geometry::{evaluate, ContourResult, Corners, Evaluation, EvaluatorConfig};
use crate::assistant::{AssistantCommand, AssistantSnapshot};
use crate::pipeline::{CapturePipeline, PageSink};
use crate::settings::AssistantSettings;

use super::frame::{ContourDetector, FrameSource};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Long-lived collaborators. They outlive a single enable/disable cycle.
pub(crate) struct Collaborators {
    pub frames: Box<dyn FrameSource>,
    pub detector: Option<Box<dyn ContourDetector>>,
    pub feedback: FeedbackEngine,
    pub pipeline: CapturePipeline,
    pub sink: Box<dyn PageSink>,
}

/// Everything one enabled session owns. Built on enable, consumed on disable.
pub(crate) struct GuidanceCore {
    parts: Collaborators,
    evaluator: EvaluatorConfig,
    analysis_size: (u32, u32),
    tick_interval: Duration,
    edge: EdgeStateMachine,
    auto: AutoCaptureController,
    last_corners: Option<Corners>,
    last_confidence: f32,
    auto_capture: bool,
    capture_available: bool,
    captures_taken: u64,
    countdown_tx: UnboundedSender<CountdownTick>,
    countdown_task: Option<JoinHandle<()>>,
    status_tx: watch::Sender<AssistantSnapshot>,
}

impl GuidanceCore {
    pub fn new(
        parts: Collaborators,
        settings: &AssistantSettings,
        capture_available: bool,
        countdown_tx: UnboundedSender<CountdownTick>,
        status_tx: watch::Sender<AssistantSnapshot>,
    ) -> Self {
        let core = Self {
            parts,
            evaluator: settings.evaluator(),
            analysis_size: (settings.analysis_width, settings.analysis_height),
            tick_interval: settings.analysis_interval(),
            edge: EdgeStateMachine::new(settings.hysteresis()),
            auto: AutoCaptureController::new(settings.auto_capture_config()),
            last_corners: None,
            last_confidence: 0.0,
            auto_capture: settings.auto_capture,
            capture_available,
            captures_taken: 0,
            countdown_tx,
            countdown_task: None,
            status_tx,
        };
        core.publish();
        core
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// No detector means no guidance: feedback and manual capture only.
    pub fn is_degraded(&self) -> bool {
        self.parts.detector.is_none()
    }

    /// One analysis step: frame, detection, evaluation, hysteresis, feedback,
    /// auto-capture.
    pub fn tick(&mut self, now: Instant) {
        if self.is_degraded() {
            return;
        }

        let result = self.detect();
        if let Some(corners) = result.corners {
            self.last_corners = Some(corners);
        }

        let (width, height) = self.analysis_size;
        let evaluation = evaluate(&result, width, height, &self.evaluator);
        self.last_confidence = evaluation.confidence;
        log_debug!(
            "tick confidence={:.3} centered={} missing={:?}",
            evaluation.confidence,
            evaluation.centered,
            evaluation.missing_edges
        );

        let transition = self.edge.update(evaluation.confidence);
        self.apply_feedback(transition, &evaluation, now);

        if self.auto_capture && self.capture_available {
            let event = self.auto.observe(self.edge.state(), evaluation.centered);
            if let Some(event) = event {
                self.on_controller_event(event, now);
            }
        }

        self.publish();
    }

    fn detect(&mut self) -> ContourResult {
        let (width, height) = self.analysis_size;
        let Some(detector) = self.parts.detector.as_mut() else {
            return ContourResult::not_found();
        };

        let frame = match self.parts.frames.analysis_frame(width, height) {
            Ok(frame) => frame,
            Err(e) => {
                log_debug!("No analysis frame this tick: {e:#}");
                return ContourResult::not_found();
            }
        };

        // The detector wraps native code; a panic reads as an empty frame.
        match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&frame))) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log_debug!("Contour detection failed this tick: {e:#}");
                ContourResult::not_found()
            }
            Err(_) => {
                log_warn!("Contour detector panicked this tick");
                ContourResult::not_found()
            }
        }
    }

    fn apply_feedback(
        &mut self,
        transition: Option<EdgeTransition>,
        evaluation: &Evaluation,
        now: Instant,
    ) {
        let feedback = &mut self.parts.feedback;
        match transition {
            Some(EdgeTransition::Gained) => {
                log_info!("Document edges detected (confidence {:.2})", evaluation.confidence);
                feedback.play_cue(Cue::Success);
                feedback.say(MessageKey::EdgesDetected, Priority::Normal, now);
            }
            Some(EdgeTransition::Lost) => {
                log_info!("Document edges lost (confidence {:.2})", evaluation.confidence);
                feedback.play_cue(Cue::Warning);
                feedback.say(MessageKey::DocumentLost, Priority::Force, now);
            }
            None => {}
        }

        let state = self.edge.state();
        feedback.update_confidence_tone(state, evaluation.confidence);

        if transition.is_none() && state == EdgeState::Detected && !evaluation.centered {
            if let Some(edge) = evaluation.missing_edges.iter().next() {
                feedback.say(MessageKey::EdgeNotVisible(*edge), Priority::Normal, now);
            }
        }
    }

    fn on_controller_event(&mut self, event: ControllerEvent, now: Instant) {
        match event {
            ControllerEvent::CountdownStarted { handle, seconds } => {
                let feedback = &mut self.parts.feedback;
                feedback.say(MessageKey::HoldSteady, Priority::Force, now);
                feedback.play_cue(Cue::CountdownBeep);
                feedback.say(MessageKey::Countdown(seconds), Priority::Force, now);

                self.abort_countdown_task();
                self.countdown_task = Some(spawn_countdown(
                    &handle,
                    COUNTDOWN_PERIOD,
                    self.countdown_tx.clone(),
                ));
            }
            ControllerEvent::Cancelled => self.abort_countdown_task(),
        }
    }

    /// A countdown second elapsed.
    pub fn on_countdown_tick(&mut self, tick: CountdownTick, now: Instant) {
        match self.auto.on_countdown_tick(tick.countdown_id) {
            Some(CountdownStep::Beep(remaining)) => {
                let feedback = &mut self.parts.feedback;
                feedback.play_cue(Cue::CountdownBeep);
                feedback.say(MessageKey::Countdown(remaining), Priority::Force, now);
            }
            Some(CountdownStep::Capture) => {
                log_info!("Countdown complete, capturing");
                self.abort_countdown_task();
                self.capture(now);
            }
            None => log_debug!("Ignoring stale countdown tick #{}", tick.countdown_id),
        }
        self.publish();
    }

    pub fn handle_command(&mut self, command: AssistantCommand, now: Instant) {
        match command {
            AssistantCommand::CaptureNow => {
                if self.auto.begin_capture() {
                    self.abort_countdown_task();
                    self.capture(now);
                }
            }
            AssistantCommand::SetVolume(volume) => self.parts.feedback.set_volume(volume),
            AssistantCommand::SetLocale(locale) => self.parts.feedback.set_locale(locale),
            AssistantCommand::SetAutoCapture(enabled) => {
                self.auto_capture = enabled;
                if !enabled {
                    self.auto.cancel();
                    self.abort_countdown_task();
                }
            }
        }
        self.publish();
    }

    /// Run the pipeline once and hand the page downstream. Always ends back
    /// in `Idle` with a zero stability counter.
    fn capture(&mut self, now: Instant) {
        if !self.capture_available {
            log_warn!("Capture skipped: capture surface unavailable");
            self.auto.finish_capture();
            return;
        }

        let corners = if self.is_degraded() {
            None
        } else {
            self.last_corners.take()
        };

        match self.parts.frames.full_resolution_frame() {
            Ok(full) => match self.parts.pipeline.run(full, corners.as_ref()) {
                Ok(page) => {
                    log_info!(
                        "Page {} captured ({}x{}, corrected={})",
                        page.id,
                        page.width,
                        page.height,
                        page.corrected
                    );
                    let sink = &mut self.parts.sink;
                    match panic::catch_unwind(AssertUnwindSafe(|| sink.submit(page))) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => log_error!("Failed to hand off captured page: {e:#}"),
                        Err(_) => log_error!("Page sink panicked during hand-off"),
                    }
                    self.captures_taken += 1;
                    let feedback = &mut self.parts.feedback;
                    feedback.play_cue(Cue::Shutter);
                    feedback.say(MessageKey::PhotoCaptured, Priority::Force, now);
                }
                Err(e) => log_error!("Capture failed: {e:#}"),
            },
            Err(e) => log_error!("Failed to read full-resolution frame: {e:#}"),
        }

        self.auto.finish_capture();
    }

    /// Return to a quiet `Idle` after a step unwound part-way, so a half
    /// finished capture cannot leave the controller stuck.
    pub fn recover(&mut self) {
        self.auto.cancel();
        self.abort_countdown_task();
        self.publish();
    }

    fn abort_countdown_task(&mut self) {
        if let Some(task) = self.countdown_task.take() {
            task.abort();
        }
    }

    pub fn snapshot(&self) -> AssistantSnapshot {
        AssistantSnapshot {
            enabled: true,
            degraded: self.is_degraded(),
            capture_available: self.capture_available,
            edge_state: self.edge.state(),
            confidence: self.last_confidence,
            phase: self.auto.state().phase(),
            stability: self.auto.stability(),
            captures_taken: self.captures_taken,
            audio: Some(self.parts.feedback.unlock_state()),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }

    /// Stop timers and release audio and camera. Every step is attempted.
    pub fn teardown(mut self) -> Collaborators {
        self.auto.cancel();
        self.abort_countdown_task();
        self.parts.feedback.disable();
        self.parts.frames.close();
        self.status_tx.send_replace(AssistantSnapshot {
            captures_taken: self.captures_taken,
            ..AssistantSnapshot::default()
        });
        log_info!("Guidance session torn down after {} captures", self.captures_taken);
        self.parts
    }
}
