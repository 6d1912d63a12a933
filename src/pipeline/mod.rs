//! Full-resolution capture with perspective correction and an uncorrected
//! fallback. Correction problems never fail a capture.

pub mod correction;
pub mod encode;

pub use correction::{PerspectiveCorrector, ProjectiveCorrector};
pub use encode::encode_jpeg;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::geometry::{rescale_corners, Corners};
use crate::sensing::frame::{ANALYSIS_HEIGHT, ANALYSIS_WIDTH};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedPage {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    #[serde(skip)]
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub corrected: bool,
}

/// Downstream consumer of captured pages (page collection / upload).
pub trait PageSink: Send {
    fn submit(&mut self, page: CapturedPage) -> Result<()>;
}

impl PageSink for UnboundedSender<CapturedPage> {
    fn submit(&mut self, page: CapturedPage) -> Result<()> {
        self.send(page)
            .map_err(|_| anyhow!("page consumer has gone away"))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub analysis_width: u32,
    pub analysis_height: u32,
    pub corrected_quality: u8,
    pub fallback_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis_width: ANALYSIS_WIDTH,
            analysis_height: ANALYSIS_HEIGHT,
            corrected_quality: 90,
            fallback_quality: 85,
        }
    }
}

pub struct CapturePipeline {
    corrector: Box<dyn PerspectiveCorrector>,
    config: PipelineConfig,
}

impl CapturePipeline {
    pub fn new(corrector: Box<dyn PerspectiveCorrector>, config: PipelineConfig) -> Self {
        Self { corrector, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Turn a full-resolution frame into a page. `corners` are in analysis
    /// coordinates; `None` skips correction (degraded mode or no detection yet).
    ///
    /// Only a failure to encode the uncorrected frame is returned as an error.
    pub fn run(&mut self, full: RgbImage, corners: Option<&Corners>) -> Result<CapturedPage> {
        if let Some(corners) = corners {
            match self.try_correct(&full, corners) {
                Ok(page) => return Ok(page),
                Err(e) => log_warn!("Perspective correction failed, using uncorrected frame: {e:#}"),
            }
        }
        self.fallback(&full)
    }

    fn try_correct(&mut self, full: &RgbImage, corners: &Corners) -> Result<CapturedPage> {
        let scaled = rescale_corners(
            corners,
            (self.config.analysis_width, self.config.analysis_height),
            full.dimensions(),
        );

        // The corrector is third-party code; a panic in it is just another
        // failed correction. Its scratch buffers are dropped on unwind.
        let corrector = &mut self.corrector;
        let corrected = panic::catch_unwind(AssertUnwindSafe(|| corrector.correct(full, &scaled)))
            .map_err(|_| anyhow!("perspective corrector panicked"))??;

        let quality = self.config.corrected_quality;
        let jpeg = encode_jpeg(&corrected, quality)?;
        log_info!(
            "Captured corrected page {}x{} from {}x{} frame",
            corrected.width(),
            corrected.height(),
            full.width(),
            full.height()
        );
        Ok(page(jpeg, corrected.dimensions(), quality, true))
    }

    fn fallback(&self, full: &RgbImage) -> Result<CapturedPage> {
        let quality = self.config.fallback_quality;
        let jpeg = encode_jpeg(full, quality)?;
        log_info!("Captured uncorrected page {}x{}", full.width(), full.height());
        Ok(page(jpeg, full.dimensions(), quality, false))
    }
}

fn page(jpeg: Vec<u8>, (width, height): (u32, u32), quality: u8, corrected: bool) -> CapturedPage {
    CapturedPage {
        id: Uuid::new_v4(),
        captured_at: Utc::now(),
        jpeg,
        width,
        height,
        quality,
        corrected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::testing::{FailingCorrector, PanickingCorrector, RecordingCorrector};
    use image::Rgb;

    fn full_frame() -> RgbImage {
        RgbImage::from_fn(1920, 1080, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]))
    }

    fn analysis_quad() -> Corners {
        [
            Point::new(160.0, 120.0),
            Point::new(480.0, 120.0),
            Point::new(480.0, 360.0),
            Point::new(160.0, 360.0),
        ]
    }

    #[test]
    fn corners_are_rescaled_per_axis_before_correction() {
        let corrector = RecordingCorrector::new();
        let mut pipeline =
            CapturePipeline::new(Box::new(corrector.clone()), PipelineConfig::default());

        let page = pipeline
            .run(full_frame(), Some(&[Point::new(320.0, 240.0); 4]))
            .unwrap();

        assert_eq!(corrector.calls(), vec![[Point::new(960.0, 540.0); 4]]);
        assert!(page.corrected);
        assert_eq!(page.quality, 90);
    }

    #[test]
    fn corrected_capture_uses_high_quality() {
        let mut pipeline = CapturePipeline::new(
            Box::new(ProjectiveCorrector::new()),
            PipelineConfig::default(),
        );
        let page = pipeline.run(full_frame(), Some(&analysis_quad())).unwrap();

        assert!(page.corrected);
        assert_eq!(page.quality, 90);
        assert_eq!((page.width, page.height), (960, 540));
        let decoded = image::load_from_memory(&page.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (960, 540));
    }

    #[test]
    fn failing_correction_falls_back_to_full_frame() {
        let mut pipeline =
            CapturePipeline::new(Box::new(FailingCorrector), PipelineConfig::default());
        let full = full_frame();
        let expected = encode_jpeg(&full, 85).unwrap();

        let page = pipeline.run(full, Some(&analysis_quad())).unwrap();

        assert!(!page.corrected);
        assert_eq!(page.quality, 85);
        assert_eq!((page.width, page.height), (1920, 1080));
        assert_eq!(page.jpeg, expected);
    }

    #[test]
    fn panicking_correction_falls_back_to_full_frame() {
        let mut pipeline =
            CapturePipeline::new(Box::new(PanickingCorrector), PipelineConfig::default());
        let page = pipeline.run(full_frame(), Some(&analysis_quad())).unwrap();
        assert!(!page.corrected);
        assert_eq!(page.quality, 85);

        // The pipeline stays usable afterwards.
        let again = pipeline.run(full_frame(), None).unwrap();
        assert!(!again.corrected);
    }

    #[test]
    fn missing_corners_skip_correction() {
        let corrector = RecordingCorrector::new();
        let mut pipeline =
            CapturePipeline::new(Box::new(corrector.clone()), PipelineConfig::default());

        let page = pipeline.run(full_frame(), None).unwrap();

        assert!(corrector.calls().is_empty());
        assert!(!page.corrected);
        assert_eq!(page.quality, 85);
    }

    #[test]
    fn channel_sink_forwards_pages() {
        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<CapturedPage>();
        let page = page(vec![1, 2, 3], (4, 5), 85, false);
        tx.submit(page.clone()).unwrap();
        assert_eq!(rx.try_recv().unwrap().id, page.id);

        drop(rx);
        assert!(tx.submit(page).is_err());
    }
}
