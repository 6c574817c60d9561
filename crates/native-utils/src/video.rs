use anyhow::Context;
use base64::Engine;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::path::Path;

/// Frames are shrunk to fit this box before upload.
pub const MAX_FRAME_WIDTH: u32 = 320;
pub const MAX_FRAME_HEIGHT: u32 = 240;
pub const JPEG_QUALITY: u8 = 40;

/// Shrinks `image` to fit `max_width` x `max_height`, keeping its aspect ratio.
/// Images that already fit are returned unchanged.
pub fn downscale(image: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    if image.width() <= max_width && image.height() <= max_height {
        image.clone()
    } else {
        image.resize(max_width, max_height, FilterType::Triangle)
    }
}

pub fn encode_jpeg_base64(image: &DynamicImage, quality: u8) -> anyhow::Result<String> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .context("Failed to JPEG-encode frame")?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
}

/// Downscales and compresses a camera frame for the realtime video channel.
pub fn encode_frame(image: &DynamicImage) -> anyhow::Result<String> {
    encode_jpeg_base64(
        &downscale(image, MAX_FRAME_WIDTH, MAX_FRAME_HEIGHT),
        JPEG_QUALITY,
    )
}

pub fn load_image(path: &Path) -> anyhow::Result<DynamicImage> {
    image::open(path).with_context(|| format!("Failed to read image: {}", path.display()))
}
