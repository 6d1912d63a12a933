//! Contour geometry: confidence scoring, missing-edge classification and
//! corner rescaling between analysis and capture resolution.

pub mod config;

pub use config::EvaluatorConfig;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Confidence at the lower end of the accepted area band.
const FLOOR_CONFIDENCE: f64 = 0.25;

/// Confidence at the upper end of the accepted area band.
const CLOSE_UP_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Document quadrilateral, ordered top-left, top-right, bottom-right, bottom-left.
pub type Corners = [Point; 4];

/// Output of the contour detector for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContourResult {
    /// `Some` only when detection succeeded.
    pub corners: Option<Corners>,
}

impl ContourResult {
    pub fn found(corners: Corners) -> Self {
        Self {
            corners: Some(corners),
        }
    }

    pub fn not_found() -> Self {
        Self { corners: None }
    }

    pub fn success(&self) -> bool {
        self.corners.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeName {
    Top,
    Bottom,
    Left,
    Right,
}

impl EdgeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeName::Top => "top",
            EdgeName::Bottom => "bottom",
            EdgeName::Left => "left",
            EdgeName::Right => "right",
        }
    }
}

/// Per-tick verdict on a contour.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    pub confidence: f32,
    pub missing_edges: BTreeSet<EdgeName>,
    pub centered: bool,
}

/// Score a contour against the canvas it was detected on.
pub fn evaluate(
    result: &ContourResult,
    width: u32,
    height: u32,
    config: &EvaluatorConfig,
) -> Evaluation {
    let Some(corners) = result.corners.as_ref() else {
        return Evaluation::default();
    };

    let canvas_area = width as f64 * height as f64;
    let ratio = if canvas_area > 0.0 {
        polygon_area(corners) / canvas_area
    } else {
        0.0
    };

    let missing_edges = missing_edges(corners, width, height, config.edge_margin_px);
    let centered = missing_edges.is_empty();

    Evaluation {
        confidence: area_confidence(ratio, config),
        missing_edges,
        centered,
    }
}

/// Piecewise-linear confidence over the area ratio, continuous at the peak.
pub fn area_confidence(ratio: f64, config: &EvaluatorConfig) -> f32 {
    let (min, peak, max) = (
        config.min_area_ratio,
        config.peak_area_ratio,
        config.max_area_ratio,
    );

    if !ratio.is_finite() || ratio < min || ratio > max {
        return 0.0;
    }

    let confidence = if ratio <= peak {
        FLOOR_CONFIDENCE + (ratio - min) * ((1.0 - FLOOR_CONFIDENCE) / (peak - min))
    } else {
        1.0 - (ratio - peak) * ((1.0 - CLOSE_UP_CONFIDENCE) / (max - peak))
    };

    confidence.clamp(0.0, 1.0) as f32
}

/// Shoelace area of the quadrilateral, independent of winding order.
pub fn polygon_area(corners: &Corners) -> f64 {
    let mut twice_area = 0.0f64;
    for i in 0..corners.len() {
        let a = corners[i];
        let b = corners[(i + 1) % corners.len()];
        twice_area += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    twice_area.abs() / 2.0
}

fn missing_edges(corners: &Corners, width: u32, height: u32, margin: f32) -> BTreeSet<EdgeName> {
    let (w, h) = (width as f32, height as f32);
    let mut missing = BTreeSet::new();

    for corner in corners {
        let distances = [
            (EdgeName::Top, corner.y),
            (EdgeName::Bottom, h - corner.y),
            (EdgeName::Left, corner.x),
            (EdgeName::Right, w - corner.x),
        ];

        // Ties resolve in declaration order.
        let nearest = distances
            .iter()
            .copied()
            .fold(None::<(EdgeName, f32)>, |best, candidate| match best {
                Some(current) if current.1 <= candidate.1 => Some(current),
                _ => Some(candidate),
            });

        if let Some((edge, distance)) = nearest {
            if distance < margin {
                missing.insert(edge);
            }
        }
    }

    missing
}

/// Map corners between resolutions. Each axis scales independently.
pub fn rescale_corners(corners: &Corners, from: (u32, u32), to: (u32, u32)) -> Corners {
    let scale_x = if from.0 == 0 { 1.0 } else { to.0 as f64 / from.0 as f64 };
    let scale_y = if from.1 == 0 { 1.0 } else { to.1 as f64 / from.1 as f64 };

    corners.map(|p| Point {
        x: (p.x as f64 * scale_x) as f32,
        y: (p.y as f64 * scale_y) as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 640;
    const H: u32 = 480;

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Corners {
        [
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    /// Centered rectangle covering `ratio` of the analysis canvas.
    fn centered_with_ratio(ratio: f32) -> Corners {
        let scale = ratio.sqrt();
        let (w, h) = (W as f32 * scale, H as f32 * scale);
        let (x0, y0) = ((W as f32 - w) / 2.0, (H as f32 - h) / 2.0);
        rect(x0, y0, x0 + w, y0 + h)
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn confidence_peaks_at_forty_percent() {
        let config = EvaluatorConfig::default();
        assert!(close(area_confidence(0.40, &config), 1.0));
        assert!(close(area_confidence(0.10, &config), 0.25));
        assert!(close(area_confidence(0.90, &config), 0.5));
        assert!(close(area_confidence(0.25, &config), 0.625));
        assert!(close(area_confidence(0.65, &config), 0.75));
    }

    #[test]
    fn confidence_is_zero_outside_band() {
        let config = EvaluatorConfig::default();
        assert_eq!(area_confidence(0.05, &config), 0.0);
        assert_eq!(area_confidence(0.0999, &config), 0.0);
        assert_eq!(area_confidence(0.9001, &config), 0.0);
        assert_eq!(area_confidence(1.0, &config), 0.0);
        assert_eq!(area_confidence(f64::NAN, &config), 0.0);
    }

    #[test]
    fn confidence_is_continuous_across_band() {
        let config = EvaluatorConfig::default();
        let mut previous = area_confidence(0.10, &config);
        let mut ratio = 0.10;
        while ratio <= 0.90 {
            let current = area_confidence(ratio, &config);
            assert!(
                (current - previous).abs() < 0.01,
                "jump at ratio {ratio}: {previous} -> {current}"
            );
            previous = current;
            ratio += 0.001;
        }
    }

    #[test]
    fn failed_detection_scores_zero() {
        let evaluation = evaluate(
            &ContourResult::not_found(),
            W,
            H,
            &EvaluatorConfig::default(),
        );
        assert_eq!(evaluation.confidence, 0.0);
        assert!(evaluation.missing_edges.is_empty());
        assert!(!evaluation.centered);
    }

    #[test]
    fn tiny_document_scores_zero() {
        let evaluation = evaluate(
            &ContourResult::found(centered_with_ratio(0.05)),
            W,
            H,
            &EvaluatorConfig::default(),
        );
        assert_eq!(evaluation.confidence, 0.0);
    }

    #[test]
    fn centered_document_has_no_missing_edges() {
        let evaluation = evaluate(
            &ContourResult::found(centered_with_ratio(0.40)),
            W,
            H,
            &EvaluatorConfig::default(),
        );
        assert!(close(evaluation.confidence, 1.0));
        assert!(evaluation.missing_edges.is_empty());
        assert!(evaluation.centered);
    }

    #[test]
    fn corners_near_boundaries_report_missing_edges() {
        // Top-left corner hugs the top, bottom-right hugs the right side.
        let corners = [
            Point::new(100.0, 5.0),
            Point::new(500.0, 60.0),
            Point::new(630.0, 300.0),
            Point::new(120.0, 350.0),
        ];
        let evaluation = evaluate(
            &ContourResult::found(corners),
            W,
            H,
            &EvaluatorConfig::default(),
        );
        let expected: BTreeSet<_> = [EdgeName::Top, EdgeName::Right].into_iter().collect();
        assert_eq!(evaluation.missing_edges, expected);
        assert!(!evaluation.centered);
    }

    #[test]
    fn polygon_area_ignores_winding() {
        let clockwise = rect(0.0, 0.0, 10.0, 20.0);
        let mut counter = clockwise;
        counter.reverse();
        assert_eq!(polygon_area(&clockwise), 200.0);
        assert_eq!(polygon_area(&counter), 200.0);
    }

    #[test]
    fn rescale_is_linear_per_axis() {
        let corners = [Point::new(320.0, 240.0); 4];
        let scaled = rescale_corners(&corners, (640, 480), (1920, 1080));
        assert_eq!(scaled[0], Point::new(960.0, 540.0));

        let origin = [Point::new(0.0, 0.0); 4];
        assert_eq!(
            rescale_corners(&origin, (640, 480), (1920, 1080))[0],
            Point::new(0.0, 0.0)
        );
    }
}
