use anyhow::{anyhow, bail, Result};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

use crate::geometry::{Corners, Point};

/// Perspective correction collaborator. May fail; any buffers it allocates
/// are owned by the returned image or dropped before it returns.
pub trait PerspectiveCorrector: Send {
    fn correct(&mut self, image: &RgbImage, corners: &Corners) -> Result<RgbImage>;
}

/// Largest side of a corrected page, in pixels.
const MAX_OUTPUT_SIDE: u32 = 8192;

/// Fill for output pixels that map outside the source frame. Paper white.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Warps the document quadrilateral onto an upright rectangle whose size
/// follows the quad's longest opposite edges.
#[derive(Debug, Default, Clone)]
pub struct ProjectiveCorrector;

impl ProjectiveCorrector {
    pub fn new() -> Self {
        Self
    }
}

impl PerspectiveCorrector for ProjectiveCorrector {
    fn correct(&mut self, image: &RgbImage, corners: &Corners) -> Result<RgbImage> {
        let (out_w, out_h) = output_size(corners)?;

        let src = corners.map(|p| (p.x, p.y));
        let dest: [(f32, f32); 4] = [
            (0.0, 0.0),                   // top-left
            (out_w as f32, 0.0),          // top-right
            (out_w as f32, out_h as f32), // bottom-right
            (0.0, out_h as f32),          // bottom-left
        ];

        let projection = Projection::from_control_points(src, dest)
            .ok_or_else(|| anyhow!("degenerate document quadrilateral"))?;

        let mut output = RgbImage::new(out_w, out_h);
        warp_into(image, &projection, Interpolation::Bilinear, BACKGROUND, &mut output);
        Ok(output)
    }
}

fn distance(a: Point, b: Point) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn output_size(corners: &Corners) -> Result<(u32, u32)> {
    let [tl, tr, br, bl] = *corners;
    if corners.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        bail!("non-finite corner coordinates");
    }

    let width = distance(tl, tr).max(distance(bl, br)).round();
    let height = distance(tl, bl).max(distance(tr, br)).round();

    if width < 2.0 || height < 2.0 {
        bail!("document quadrilateral too small ({width}x{height})");
    }
    if width > MAX_OUTPUT_SIDE as f32 || height > MAX_OUTPUT_SIDE as f32 {
        bail!("document quadrilateral too large ({width}x{height})");
    }
    Ok((width as u32, height as u32))
}
