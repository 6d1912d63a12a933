use rodio::Source;
use std::f32::consts::TAU;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;

/// Attack/release ramp so bursts start and stop without clicks.
const RAMP_SECS: f32 = 0.005;

/// Confidence tone pitch range.
pub const CONFIDENCE_MIN_HZ: f32 = 300.0;
pub const CONFIDENCE_MAX_HZ: f32 = 800.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    pub duration: Duration,
}

impl ToneSpec {
    pub const fn new(frequency_hz: f32, duration_ms: u64) -> Self {
        Self {
            frequency_hz,
            duration: Duration::from_millis(duration_ms),
        }
    }
}

const SUCCESS: [ToneSpec; 1] = [ToneSpec::new(880.0, 200)];
const WARNING: [ToneSpec; 1] = [ToneSpec::new(440.0, 150)];
const COUNTDOWN: [ToneSpec; 1] = [ToneSpec::new(523.0, 100)];
const SHUTTER: [ToneSpec; 2] = [ToneSpec::new(880.0, 100), ToneSpec::new(440.0, 100)];
const UNLOCK: [ToneSpec; 1] = [ToneSpec::new(440.0, 10)];

/// Discrete feedback sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Success,
    Warning,
    CountdownBeep,
    Shutter,
    /// Near-silent burst that wakes up audio pipelines needing a user gesture.
    Unlock,
}

impl Cue {
    pub fn tones(&self) -> &'static [ToneSpec] {
        match self {
            Cue::Success => &SUCCESS,
            Cue::Warning => &WARNING,
            Cue::CountdownBeep => &COUNTDOWN,
            Cue::Shutter => &SHUTTER,
            Cue::Unlock => &UNLOCK,
        }
    }
}

/// Linear map of confidence in [0, 1] onto the confidence tone range.
pub fn confidence_to_frequency(confidence: f32) -> f32 {
    let c = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    CONFIDENCE_MIN_HZ + c * (CONFIDENCE_MAX_HZ - CONFIDENCE_MIN_HZ)
}

/// Finite mono sine burst.
pub struct ToneBurst {
    frequency_hz: f32,
    sample_rate: u32,
    total_samples: usize,
    num_sample: usize,
}

impl ToneBurst {
    pub fn new(spec: ToneSpec) -> Self {
        let total_samples = (spec.duration.as_secs_f32() * SAMPLE_RATE as f32).round() as usize;
        Self {
            frequency_hz: spec.frequency_hz,
            sample_rate: SAMPLE_RATE,
            total_samples,
            num_sample: 0,
        }
    }

    fn envelope(&self) -> f32 {
        let ramp = (RAMP_SECS * self.sample_rate as f32).max(1.0);
        let from_start = self.num_sample as f32 / ramp;
        let from_end = (self.total_samples - self.num_sample) as f32 / ramp;
        from_start.min(from_end).min(1.0)
    }
}

impl Iterator for ToneBurst {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }
        let t = self.num_sample as f32 / self.sample_rate as f32;
        let sample = (TAU * self.frequency_hz * t).sin() * self.envelope();
        self.num_sample += 1;
        Some(sample)
    }
}

impl Source for ToneBurst {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples - self.num_sample)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples as f32 / self.sample_rate as f32,
        ))
    }
}

/// Shared knobs for the continuous confidence tone. Stored as f32 bits so the
/// analysis loop can retune the tone without a round trip to the audio thread.
#[derive(Clone, Debug)]
pub struct ToneControl {
    frequency_bits: Arc<AtomicU32>,
    gain_bits: Arc<AtomicU32>,
}

impl ToneControl {
    pub fn new() -> Self {
        Self {
            frequency_bits: Arc::new(AtomicU32::new(CONFIDENCE_MIN_HZ.to_bits())),
            gain_bits: Arc::new(AtomicU32::new(0.0f32.to_bits())),
        }
    }

    pub fn set(&self, frequency_hz: f32, gain: f32) {
        self.frequency_bits
            .store(frequency_hz.to_bits(), Ordering::Relaxed);
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn frequency_hz(&self) -> f32 {
        f32::from_bits(self.frequency_bits.load(Ordering::Relaxed))
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }
}

impl Default for ToneControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Endless sine whose pitch and gain follow a [`ToneControl`].
/// Phase is accumulated so retuning does not click.
pub struct ContinuousTone {
    control: ToneControl,
    sample_rate: u32,
    phase: f32,
}

impl ContinuousTone {
    pub fn new(control: ToneControl) -> Self {
        Self {
            control,
            sample_rate: SAMPLE_RATE,
            phase: 0.0,
        }
    }
}

impl Iterator for ContinuousTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let frequency = self.control.frequency_hz();
        self.phase += TAU * frequency / self.sample_rate as f32;
        if self.phase > TAU {
            self.phase -= TAU;
        }
        Some(self.phase.sin() * self.control.gain())
    }
}

impl Source for ContinuousTone {
    fn current_frame_len(&self) -> Option<usize> {
        None // Infinite stream
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
