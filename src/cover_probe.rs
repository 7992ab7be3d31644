//! Decodability check for fetched covers before they replace the published image.

use std::fs;
use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageReader};
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

fn decode_cover(path: &Path) -> Option<DynamicImage> {
    ImageReader::open(path)
        .ok()
        .and_then(|reader| reader.with_guessed_format().ok())
        .and_then(|reader| reader.decode().ok())
        .or_else(|| {
            // Malformed JPEGs (trailing garbage, bad markers) are common in player caches.
            let bytes = fs::read(path).ok()?;
            decode_jpeg_non_strict(&bytes)
        })
}

/// Dimensions of the fully decoded image at `path`, sniffing the format from its bytes.
///
/// Staging files end in `.tmp`, so the extension can't be trusted. A header
/// alone isn't enough: truncated downloads still carry a valid one.
pub fn cover_dimensions(path: &Path) -> Option<(u32, u32)> {
    decode_cover(path).map(|decoded| decoded.dimensions())
}

pub fn cover_is_decodable(path: &Path) -> bool {
    matches!(cover_dimensions(path), Some((width, height)) if width > 0 && height > 0)
}
