//! Audio-guided document capture for blind and low-vision users.
//!
//! A fixed-cadence loop scores each camera frame for how well a document
//! fills it, turns the score into tones and spoken guidance, and takes the
//! picture itself once the page has been held steady.

pub mod assistant;
pub mod capture;
pub mod edge;
pub mod feedback;
pub mod geometry;
pub mod pipeline;
pub mod sensing;
pub mod settings;
pub mod utils;

#[cfg(test)]
mod testing;

pub use assistant::{
    load_detector, ActivationSource, Assistant, AssistantCommand, AssistantParts,
    AssistantSnapshot, EnableReport,
};
pub use edge::{EdgeState, EdgeTransition};
pub use feedback::{Locale, Priority};
pub use geometry::{ContourResult, Corners, EdgeName, Evaluation, Point};
pub use pipeline::{CapturedPage, PageSink};
pub use sensing::{ContourDetector, FrameSample, FrameSource};
pub use settings::{AssistantSettings, SettingsStore};
pub use utils::init_logging;
