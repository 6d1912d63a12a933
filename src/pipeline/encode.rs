use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(image)
        .with_context(|| {
            format!(
                "failed to encode {}x{} frame as JPEG (quality {quality})",
                image.width(),
                image.height()
            )
        })?;
    Ok(bytes)
}
