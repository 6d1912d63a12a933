//! In-memory collaborators for unit and session tests. Every fake is `Clone`
//! and shares its recorded state, so a test keeps one copy for assertions
//! and hands the other to the code under test.

use anyhow::{anyhow, bail, Result};
use image::{Rgb, RgbImage};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::feedback::{AudioContextState, AudioOutput, ContinuousSetting, Locale, SpeechSynth, ToneSpec};
use crate::geometry::{ContourResult, Corners};
use crate::pipeline::{CapturedPage, PageSink, PerspectiveCorrector};
use crate::sensing::frame::{ContourDetector, FrameSample, FrameSource};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Audio output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Created,
    Resumed,
    Closed,
    Tones { tones: Vec<ToneSpec>, gain: f32 },
    Continuous(Option<ContinuousSetting>),
}

#[derive(Default)]
struct OutputLog {
    state: AudioContextState,
    events: Vec<OutputEvent>,
}

#[derive(Clone, Default)]
pub struct RecordingOutput {
    log: Arc<Mutex<OutputLog>>,
    strict: bool,
    failing: bool,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behaves like a platform that only starts audio after a real sound.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// No audio device: opening and playing always fail.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        lock(&self.log).events.clone()
    }

    /// Only the tone bursts, in order.
    pub fn tones(&self) -> Vec<Vec<ToneSpec>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OutputEvent::Tones { tones, .. } => Some(tones),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.log).events.clear();
    }

    pub fn force_state(&self, state: AudioContextState) {
        lock(&self.log).state = state;
    }

    fn record(&self, event: OutputEvent) {
        lock(&self.log).events.push(event);
    }
}

impl AudioOutput for RecordingOutput {
    fn context_state(&self) -> AudioContextState {
        lock(&self.log).state
    }

    fn create_context(&mut self) -> Result<()> {
        if self.failing {
            bail!("no audio device");
        }
        let mut log = lock(&self.log);
        log.state = AudioContextState::Suspended;
        log.events.push(OutputEvent::Created);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let mut log = lock(&self.log);
        if log.state == AudioContextState::Closed {
            bail!("audio context is closed");
        }
        log.state = AudioContextState::Running;
        log.events.push(OutputEvent::Resumed);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut log = lock(&self.log);
        log.state = AudioContextState::Closed;
        log.events.push(OutputEvent::Closed);
        Ok(())
    }

    fn play_tones(&mut self, tones: &[ToneSpec], gain: f32) -> Result<()> {
        if self.failing {
            bail!("no audio device");
        }
        self.record(OutputEvent::Tones {
            tones: tones.to_vec(),
            gain,
        });
        Ok(())
    }

    fn set_continuous_tone(&mut self, setting: Option<ContinuousSetting>) -> Result<()> {
        if self.failing {
            bail!("no audio device");
        }
        self.record(OutputEvent::Continuous(setting));
        Ok(())
    }

    fn requires_explicit_unlock(&self) -> bool {
        self.strict
    }
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub locale: Locale,
    pub volume: f32,
}

#[derive(Clone, Default)]
pub struct RecordingSpeech {
    utterances: Arc<Mutex<Vec<Utterance>>>,
    cancels: Arc<Mutex<u32>>,
    strict: bool,
    failing: bool,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        lock(&self.utterances).clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.utterances().into_iter().map(|u| u.text).collect()
    }

    pub fn cancels(&self) -> u32 {
        *lock(&self.cancels)
    }
}

impl SpeechSynth for RecordingSpeech {
    fn speak(&mut self, text: &str, locale: Locale, volume: f32) -> Result<()> {
        if self.failing {
            bail!("speech engine unavailable");
        }
        lock(&self.utterances).push(Utterance {
            text: text.to_string(),
            locale,
            volume,
        });
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        *lock(&self.cancels) += 1;
        if self.failing {
            bail!("speech engine unavailable");
        }
        Ok(())
    }

    fn requires_explicit_unlock(&self) -> bool {
        self.strict
    }
}

// ---------------------------------------------------------------------------
// Camera and detection
// ---------------------------------------------------------------------------

pub const FULL_WIDTH: u32 = 1920;
pub const FULL_HEIGHT: u32 = 1080;

#[derive(Default)]
struct FrameLog {
    open_panics: u32,
    capture_panics: u32,
    opened: u32,
    closed: u32,
    full_frames: u32,
}

/// Gradient frames at a fixed full resolution.
#[derive(Clone, Default)]
pub struct SyntheticFrames {
    log: Arc<Mutex<FrameLog>>,
    fail_open: bool,
    fail_capture: bool,
}

impl SyntheticFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Camera permission denied.
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// The camera driver panics on the first `open`, then behaves.
    pub fn panicking_once() -> Self {
        let frames = Self::default();
        lock(&frames.log).open_panics = 1;
        frames
    }

    /// Preview works but the capture surface cannot be initialised.
    pub fn without_capture() -> Self {
        Self {
            fail_capture: true,
            ..Self::default()
        }
    }

    /// The next full-resolution read panics.
    pub fn panic_on_next_capture(&self) {
        lock(&self.log).capture_panics = 1;
    }

    pub fn opened(&self) -> u32 {
        lock(&self.log).opened
    }

    pub fn closed(&self) -> u32 {
        lock(&self.log).closed
    }

    pub fn full_frames(&self) -> u32 {
        lock(&self.log).full_frames
    }

    fn frame() -> RgbImage {
        RgbImage::from_fn(FULL_WIDTH, FULL_HEIGHT, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        })
    }
}

impl FrameSource for SyntheticFrames {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            bail!("camera permission denied");
        }
        let mut log = lock(&self.log);
        if log.open_panics > 0 {
            log.open_panics -= 1;
            drop(log);
            panic!("camera driver fault");
        }
        log.opened += 1;
        Ok(())
    }

    fn prepare_capture(&mut self) -> Result<()> {
        if self.fail_capture {
            bail!("capture surface unavailable");
        }
        Ok(())
    }

    fn analysis_frame(&mut self, width: u32, height: u32) -> Result<FrameSample> {
        Ok(FrameSample::new(RgbImage::new(width, height)))
    }

    fn full_resolution_frame(&mut self) -> Result<RgbImage> {
        if self.fail_capture {
            bail!("capture surface unavailable");
        }
        let mut log = lock(&self.log);
        if log.capture_panics > 0 {
            log.capture_panics -= 1;
            drop(log);
            panic!("capture surface fault");
        }
        log.full_frames += 1;
        drop(log);
        Ok(Self::frame())
    }

    fn close(&mut self) {
        lock(&self.log).closed += 1;
    }
}

#[derive(Clone)]
enum Script {
    Result(ContourResult),
    Error,
    Panic,
}

/// Returns whatever the test last scripted, every tick.
#[derive(Clone)]
pub struct ScriptedDetector {
    next: Arc<Mutex<Script>>,
    calls: Arc<Mutex<u32>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self {
            next: Arc::new(Mutex::new(Script::Result(ContourResult::not_found()))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set(&self, result: ContourResult) {
        *lock(&self.next) = Script::Result(result);
    }

    pub fn set_corners(&self, corners: Corners) {
        self.set(ContourResult::found(corners));
    }

    pub fn set_not_found(&self) {
        self.set(ContourResult::not_found());
    }

    /// Make `detect` return an error until the next `set`.
    pub fn set_error(&self) {
        *lock(&self.next) = Script::Error;
    }

    /// Make `detect` panic until the next `set`.
    pub fn set_panic(&self) {
        *lock(&self.next) = Script::Panic;
    }

    pub fn calls(&self) -> u32 {
        *lock(&self.calls)
    }
}

impl ContourDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &FrameSample) -> Result<ContourResult> {
        *lock(&self.calls) += 1;
        let script = lock(&self.next).clone();
        match script {
            Script::Result(result) => Ok(result),
            Script::Error => Err(anyhow!("detector crashed")),
            Script::Panic => panic!("native detector aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Capture pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct FailingCorrector;

impl PerspectiveCorrector for FailingCorrector {
    fn correct(&mut self, _image: &RgbImage, _corners: &Corners) -> Result<RgbImage> {
        bail!("homography did not converge")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PanickingCorrector;

impl PerspectiveCorrector for PanickingCorrector {
    fn correct(&mut self, _image: &RgbImage, _corners: &Corners) -> Result<RgbImage> {
        panic!("corrector blew up")
    }
}

/// Records the corners it is asked to correct and returns a small page.
#[derive(Clone, Default)]
pub struct RecordingCorrector {
    calls: Arc<Mutex<Vec<Corners>>>,
}

impl RecordingCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Corners> {
        lock(&self.calls).clone()
    }
}

impl PerspectiveCorrector for RecordingCorrector {
    fn correct(&mut self, _image: &RgbImage, corners: &Corners) -> Result<RgbImage> {
        lock(&self.calls).push(*corners);
        Ok(RgbImage::from_pixel(64, 48, Rgb([255, 255, 255])))
    }
}

#[derive(Clone, Default)]
pub struct CollectingSink {
    pages: Arc<Mutex<Vec<CapturedPage>>>,
    panic_next: Arc<Mutex<bool>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(&self) -> Vec<CapturedPage> {
        lock(&self.pages).clone()
    }

    /// The next hand-off panics instead of storing the page.
    pub fn panic_on_next(&self) {
        *lock(&self.panic_next) = true;
    }
}

impl PageSink for CollectingSink {
    fn submit(&mut self, page: CapturedPage) -> Result<()> {
        if std::mem::take(&mut *lock(&self.panic_next)) {
            panic!("downstream uploader fault");
        }
        lock(&self.pages).push(page);
        Ok(())
    }
}
