//! Audio feedback: discrete cues, the continuous confidence tone and
//! throttled speech. All platform calls are best-effort; a failure is
//! logged and dropped so it can never stall the analysis loop.

pub mod i18n;
pub mod output;
pub mod speech;
pub mod tones;

pub use i18n::{localize, Locale, MessageKey};
pub use output::{AudioContextState, AudioOutput, ContinuousSetting, RodioOutput};
pub use speech::{AnnouncementRequest, AnnouncementThrottle, Priority, SpeechSynth, SystemSpeech};
pub use tones::{confidence_to_frequency, Cue, ToneSpec};

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::edge::EdgeState;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Tones never exceed this share of full scale so speech stays on top.
pub const TONE_GAIN_CAP: f32 = 0.3;

/// Gain of the unlock burst; audible pipelines start, ears hear nothing.
const UNLOCK_GAIN: f32 = 0.0001;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AudioUnlockState {
    pub context_state: AudioContextState,
    pub speech_unlocked: bool,
}

#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    pub volume: f32,
    pub locale: Locale,
    pub announcement_interval: Duration,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            locale: Locale::default(),
            announcement_interval: speech::DEFAULT_ANNOUNCEMENT_INTERVAL,
        }
    }
}

pub struct FeedbackEngine {
    output: Box<dyn AudioOutput>,
    speech: Box<dyn SpeechSynth>,
    volume: f32,
    locale: Locale,
    throttle: AnnouncementThrottle,
    speech_unlocked: bool,
    continuous_on: bool,
}

impl FeedbackEngine {
    pub fn new(
        output: Box<dyn AudioOutput>,
        speech: Box<dyn SpeechSynth>,
        config: FeedbackConfig,
    ) -> Self {
        Self {
            output,
            speech,
            volume: config.volume.clamp(0.0, 1.0),
            locale: config.locale,
            throttle: AnnouncementThrottle::new(config.announcement_interval),
            speech_unlocked: false,
            continuous_on: false,
        }
    }

    /// Bring audio up. Must be called from inside a user gesture on platforms
    /// that gate audio behind one.
    ///
    /// A `Closed` context (never opened, or torn down since) is replaced with a
    /// fresh one; a `Suspended` context is resumed in place.
    pub fn enable(&mut self) -> AudioUnlockState {
        match self.output.context_state() {
            AudioContextState::Closed => {
                log_info!("Audio context closed; creating a new one");
                match self.output.create_context() {
                    Ok(()) => self.resume_context(),
                    Err(e) => log_warn!("Audio output unavailable: {e:#}"),
                }
            }
            AudioContextState::Suspended => self.resume_context(),
            AudioContextState::Running => {}
        }

        if !self.speech_unlocked {
            if self.speech.requires_explicit_unlock() {
                match self.speech.speak("", self.locale, 0.0) {
                    Ok(()) => {
                        self.speech_unlocked = true;
                        log_info!("Speech engine unlocked");
                    }
                    Err(e) => log_warn!("Speech unlock failed: {e:#}"),
                }
            } else {
                self.speech_unlocked = true;
            }
        }

        if self.output.requires_explicit_unlock() {
            self.play_tones(Cue::Unlock.tones(), UNLOCK_GAIN);
        }

        self.throttle.reset();
        self.unlock_state()
    }

    fn resume_context(&mut self) {
        if let Err(e) = self.output.resume() {
            log_warn!("Failed to resume audio context: {e:#}");
        }
    }

    /// Best-effort teardown: every step runs even if an earlier one fails.
    pub fn disable(&mut self) {
        self.stop_continuous();
        if let Err(e) = self.speech.cancel() {
            log_warn!("Failed to cancel speech: {e:#}");
        }
        if let Err(e) = self.output.close() {
            log_warn!("Failed to close audio context: {e:#}");
        }
    }

    pub fn unlock_state(&self) -> AudioUnlockState {
        AudioUnlockState {
            context_state: self.output.context_state(),
            speech_unlocked: self.speech_unlocked,
        }
    }

    pub fn play_cue(&mut self, cue: Cue) {
        self.play_tones(cue.tones(), self.tone_gain());
    }

    fn play_tones(&mut self, tones: &[ToneSpec], gain: f32) {
        if let Err(e) = self.output.play_tones(tones, gain) {
            log_warn!("Tone playback failed: {e:#}");
        }
    }

    /// Refresh the continuous tone for this tick: pitch follows confidence
    /// while `Detected`, silent otherwise.
    pub fn update_confidence_tone(&mut self, state: EdgeState, confidence: f32) {
        match state {
            EdgeState::Detected => {
                let setting = ContinuousSetting {
                    frequency_hz: confidence_to_frequency(confidence),
                    gain: self.tone_gain(),
                };
                match self.output.set_continuous_tone(Some(setting)) {
                    Ok(()) => self.continuous_on = true,
                    Err(e) => log_warn!("Continuous tone update failed: {e:#}"),
                }
            }
            EdgeState::Lost => self.stop_continuous(),
        }
    }

    pub fn stop_continuous(&mut self) {
        if !self.continuous_on {
            return;
        }
        self.continuous_on = false;
        if let Err(e) = self.output.set_continuous_tone(None) {
            log_warn!("Failed to silence continuous tone: {e:#}");
        }
    }

    /// Speak unless throttled. Returns whether the request was passed on.
    pub fn announce(&mut self, request: AnnouncementRequest, now: Instant) -> bool {
        if !self.throttle.admit(request.priority, now) {
            log_debug!("Announcement suppressed: {}", request.text);
            return false;
        }
        if let Err(e) = self.speech.speak(&request.text, request.locale, self.volume) {
            log_warn!("Speech failed: {e:#}");
        }
        true
    }

    /// Localize `key` in the current locale and announce it.
    pub fn say(&mut self, key: MessageKey, priority: Priority, now: Instant) -> bool {
        let request = AnnouncementRequest {
            text: localize(self.locale, key),
            locale: self.locale,
            priority,
        };
        self.announce(request, now)
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            self.volume
        };
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    fn tone_gain(&self) -> f32 {
        self.volume * TONE_GAIN_CAP
    }
}
