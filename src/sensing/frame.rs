use anyhow::Result;
use image::{imageops, imageops::FilterType, RgbImage};

use crate::geometry::ContourResult;

/// Default analysis resolution, independent of the camera's capture size.
pub const ANALYSIS_WIDTH: u32 = 640;
pub const ANALYSIS_HEIGHT: u32 = 480;

/// One analysis-resolution frame. Produced fresh each tick and dropped after
/// evaluation.
pub struct FrameSample {
    image: RgbImage,
}

impl FrameSample {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Downscale a native-resolution frame to the analysis size.
    pub fn from_full_resolution(full: &RgbImage, width: u32, height: u32) -> Self {
        if full.dimensions() == (width, height) {
            return Self::new(full.clone());
        }
        Self::new(imageops::resize(full, width, height, FilterType::Triangle))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.image
    }
}

/// Camera collaborator.
pub trait FrameSource: Send {
    /// Acquire the analysis stream. Failure here is fatal to `enable`.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Acquire whatever surface full-resolution reads need. Failure disables
    /// capture but guidance keeps running.
    fn prepare_capture(&mut self) -> Result<()> {
        Ok(())
    }

    fn analysis_frame(&mut self, width: u32, height: u32) -> Result<FrameSample>;

    /// A frame at the camera's native resolution.
    fn full_resolution_frame(&mut self) -> Result<RgbImage>;

    fn close(&mut self) {}
}

/// Paper-contour detection collaborator. An `Err` is treated the same as a
/// frame without a document.
pub trait ContourDetector: Send {
    fn detect(&mut self, frame: &FrameSample) -> Result<ContourResult>;
}
