//! Base64 image transport used by the edit endpoint.

use std::io::Cursor;

use anyhow::{Context, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Images larger than this on either side are shrunk before editing.
pub const MAX_IMAGE_DIMENSION: u32 = 1024;

/// Decodes a base64 image, with or without a `data:image/...;base64,` prefix.
pub fn decode_data_url(encoded: &str) -> Result<DynamicImage> {
    let payload = match encoded.split_once(',') {
        Some((_, payload)) => payload,
        None => encoded,
    };
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .context("image is not valid base64")?;
    let image = image::load_from_memory(&bytes).context("failed to decode image")?;
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

/// Shrinks `image` so that its largest side is at most `max_dimension`,
/// keeping the aspect ratio. Smaller images are returned untouched.
pub fn downscale_to_fit(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width.max(height) <= max_dimension {
        return image;
    }
    let resized = image.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    tracing::info!(
        from = ?(width, height),
        to = ?resized.dimensions(),
        "resized input image"
    );
    resized
}

/// Encodes an image as a `data:image/png;base64,` URL.
pub fn encode_png_data_url(image: &DynamicImage) -> Result<String> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("failed to encode image as png")?;
    Ok(format!("data:image/png;base64,{}", BASE64_STANDARD.encode(&bytes)))
}
