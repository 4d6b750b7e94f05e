//! Image encoding: raw photo bytes → base64 [`ImagePayload`].
//!
//! Vision APIs accept images as base64 bodies embedded in the JSON request.
//! Photos that already fit are forwarded byte-for-byte in their original
//! format. Oversized photos are downscaled so their longest edge is
//! `max_edge` and re-encoded as JPEG, which keeps phone pictures of a page
//! well below upload limits without losing legibility.

use crate::model::ImagePayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Formats every supported provider accepts as-is.
const PASSTHROUGH_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
];

/// Encode photo bytes as a base64 payload ready for the extraction stage.
///
/// Fails when the bytes are not a recognised image.
pub fn encode_image(bytes: &[u8], max_edge: u32) -> Result<ImagePayload, image::ImageError> {
    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;
    let (width, height) = img.dimensions();

    if width.max(height) > max_edge {
        let resized = img.resize(max_edge, max_edge, FilterType::Lanczos3);
        debug!(
            "Downscaled {}x{} → {}x{}",
            width,
            height,
            resized.width(),
            resized.height()
        );
        return encode_as(&DynamicImage::ImageRgb8(resized.to_rgb8()), ImageFormat::Jpeg);
    }

    if PASSTHROUGH_FORMATS.contains(&format) {
        let b64 = STANDARD.encode(bytes);
        debug!("Encoded image → {} bytes base64", b64.len());
        return Ok(ImagePayload::new(b64, format.to_mime_type()));
    }

    // BMP and friends: lossless re-encode into something every API takes.
    encode_as(&img, ImageFormat::Png)
}

fn encode_as(img: &DynamicImage, format: ImageFormat) -> Result<ImagePayload, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Re-encoded image → {} bytes base64", b64.len());
    Ok(ImagePayload::new(b64, format.to_mime_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn small_png_passes_through() {
        let bytes = png_bytes(10, 10);
        let payload = encode_image(&bytes, 2000).expect("encode should succeed");
        assert_eq!(payload.mime_type, "image/png");
        let decoded = STANDARD.decode(&payload.data).expect("valid base64");
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn oversized_image_is_downscaled_to_jpeg() {
        let bytes = png_bytes(600, 300);
        let payload = encode_image(&bytes, 256).expect("encode should succeed");
        assert_eq!(payload.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&payload.data).expect("valid base64");
        let img = image::load_from_memory(&decoded).expect("valid jpeg");
        assert_eq!(img.width(), 256);
        assert_eq!(img.height(), 128);
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        assert!(encode_image(b"%PDF-1.7 not an image", 2000).is_err());
    }
}
