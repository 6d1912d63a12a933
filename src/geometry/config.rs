/// Tunables for turning a detected contour into a confidence value.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Corners closer than this to a canvas boundary mark that edge as missing.
    /// Empirical value for the 640x480 analysis resolution.
    pub edge_margin_px: f32,

    /// Area ratio below which a contour is too small to trust.
    pub min_area_ratio: f64,

    /// Area ratio at which confidence peaks at 1.0.
    pub peak_area_ratio: f64,

    /// Area ratio above which the document is too close to the lens.
    pub max_area_ratio: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            edge_margin_px: 20.0,
            min_area_ratio: 0.10,
            peak_area_ratio: 0.40,
            max_area_ratio: 0.90,
        }
    }
}
