pub mod frame;
pub mod guidance;
pub mod loop_worker;

pub use frame::{ContourDetector, FrameSample, FrameSource, ANALYSIS_HEIGHT, ANALYSIS_WIDTH};
