use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EdgeState {
    Lost,
    Detected,
}

impl Default for EdgeState {
    fn default() -> Self {
        EdgeState::Lost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTransition {
    Gained,
    Lost,
}

#[derive(Debug, Clone)]
pub struct HysteresisConfig {
    /// `Lost -> Detected` needs confidence at or above this.
    pub upper: f32,
    /// `Detected -> Lost` needs confidence strictly below this.
    pub lower: f32,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            upper: 0.45,
            lower: 0.35,
        }
    }
}

/// Two-threshold debouncer over the per-tick confidence stream.
#[derive(Debug, Clone)]
pub struct EdgeStateMachine {
    state: EdgeState,
    config: HysteresisConfig,
}

impl EdgeStateMachine {
    pub fn new(config: HysteresisConfig) -> Self {
        Self::starting_in(EdgeState::Lost, config)
    }

    pub fn starting_in(state: EdgeState, config: HysteresisConfig) -> Self {
        Self { state, config }
    }

    pub fn state(&self) -> EdgeState {
        self.state
    }

    /// Feed one confidence sample. Returns the transition if one fired.
    pub fn update(&mut self, confidence: f32) -> Option<EdgeTransition> {
        match self.state {
            EdgeState::Lost if confidence >= self.config.upper => {
                self.state = EdgeState::Detected;
                Some(EdgeTransition::Gained)
            }
            EdgeState::Detected if confidence < self.config.lower => {
                self.state = EdgeState::Lost;
                Some(EdgeTransition::Lost)
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.state = EdgeState::Lost;
    }
}

impl Default for EdgeStateMachine {
    fn default() -> Self {
        Self::new(HysteresisConfig::default())
    }
}
