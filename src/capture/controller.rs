use crate::edge::EdgeState;

use super::state::{AutoCaptureState, CountdownHandle};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone)]
pub struct AutoCaptureConfig {
    /// Consecutive detected-and-centered ticks before the countdown starts.
    /// Empirical value for a 10 Hz analysis loop.
    pub stability_threshold: u32,
    /// Countdown length; one beep and numeral per second.
    pub countdown_secs: u32,
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            stability_threshold: 10,
            countdown_secs: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Entered `CountingDown`. The caller announces the cue, emits the first
    /// numeral and starts the timer bound to `handle`.
    CountdownStarted {
        handle: CountdownHandle,
        seconds: u32,
    },
    /// Detection dropped mid-countdown; the timer handle is already cancelled.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Beep(u32),
    Capture,
}

/// `Idle -> CountingDown -> Capturing -> Idle`, driven one tick at a time.
#[derive(Debug)]
pub struct AutoCaptureController {
    state: AutoCaptureState,
    stability: u32,
    next_countdown_id: u64,
    config: AutoCaptureConfig,
}

impl AutoCaptureController {
    pub fn new(config: AutoCaptureConfig) -> Self {
        Self {
            state: AutoCaptureState::Idle,
            stability: 0,
            next_countdown_id: 0,
            config,
        }
    }

    pub fn state(&self) -> &AutoCaptureState {
        &self.state
    }

    pub fn stability(&self) -> u32 {
        self.stability
    }

    /// Feed this tick's edge state and centering verdict.
    pub fn observe(&mut self, edge: EdgeState, centered: bool) -> Option<ControllerEvent> {
        match &self.state {
            AutoCaptureState::Idle => {
                if edge != EdgeState::Detected || !centered {
                    self.stability = 0;
                    return None;
                }

                self.stability += 1;
                if self.stability < self.config.stability_threshold {
                    return None;
                }

                self.next_countdown_id += 1;
                let handle = CountdownHandle::new(self.next_countdown_id);
                let seconds = self.config.countdown_secs;
                self.state = AutoCaptureState::CountingDown {
                    remaining_secs: seconds,
                    handle: handle.clone(),
                };
                log_info!(
                    "Stable for {} ticks, starting {}s countdown #{}",
                    self.stability,
                    seconds,
                    handle.id()
                );
                Some(ControllerEvent::CountdownStarted { handle, seconds })
            }
            AutoCaptureState::CountingDown { .. } if edge == EdgeState::Lost => {
                self.cancel();
                log_info!("Countdown cancelled, document lost");
                Some(ControllerEvent::Cancelled)
            }
            AutoCaptureState::CountingDown { .. } | AutoCaptureState::Capturing => None,
        }
    }

    /// Advance the countdown on a timer tick. Ticks from a cancelled or
    /// superseded countdown are ignored.
    pub fn on_countdown_tick(&mut self, countdown_id: u64) -> Option<CountdownStep> {
        let AutoCaptureState::CountingDown {
            remaining_secs,
            handle,
        } = &mut self.state
        else {
            return None;
        };

        if handle.id() != countdown_id || !handle.is_live() {
            return None;
        }

        *remaining_secs = remaining_secs.saturating_sub(1);
        if *remaining_secs > 0 {
            return Some(CountdownStep::Beep(*remaining_secs));
        }

        handle.cancel();
        self.state = AutoCaptureState::Capturing;
        Some(CountdownStep::Capture)
    }

    /// Jump straight to `Capturing`, abandoning any countdown. Returns false
    /// if a capture is already in flight.
    pub fn begin_capture(&mut self) -> bool {
        if matches!(self.state, AutoCaptureState::Capturing) {
            return false;
        }
        if let AutoCaptureState::CountingDown { handle, .. } = &self.state {
            handle.cancel();
        }
        self.state = AutoCaptureState::Capturing;
        true
    }

    /// Pipeline finished, successfully or not. A new page needs a fresh run.
    pub fn finish_capture(&mut self) {
        self.state = AutoCaptureState::Idle;
        self.stability = 0;
    }

    /// Return to `Idle` from any state. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        if let AutoCaptureState::CountingDown { handle, .. } = &self.state {
            handle.cancel();
        }
        self.state = AutoCaptureState::Idle;
        self.stability = 0;
    }
}

impl Default for AutoCaptureController {
    fn default() -> Self {
        Self::new(AutoCaptureConfig::default())
    }
}
