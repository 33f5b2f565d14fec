//! Conversion of analysis frames into `image` buffers and thumbnails.

use crate::analyzer::Thumbnail;
use crate::frame::{Frame, PixelFormat};
use crate::utils::safe_cast::f64_to_u32_clamp;
use crate::{Error, Result};
use image::codecs::png::PngEncoder;
use image::{imageops, ColorType, ImageEncoder, RgbaImage};

/// Convert a BGRA8 frame into an RGBA image
///
/// # Errors
/// * Returns `UnsupportedPixelFormat` for frames not in BGRA8
/// * Returns `InvalidInput` if the buffer does not match the frame size
pub fn bgra_frame_to_rgba(frame: &Frame) -> Result<RgbaImage> {
    if frame.format() != PixelFormat::Bgra8 {
        return Err(Error::UnsupportedPixelFormat(frame.format()));
    }

    let mut rgba = frame.data().to_vec();
    for pixel in rgba.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }

    RgbaImage::from_raw(frame.width(), frame.height(), rgba).ok_or_else(|| {
        Error::InvalidInput(format!(
            "BGRA buffer does not match {}x{} frame",
            frame.width(),
            frame.height()
        ))
    })
}

/// Size of a thumbnail whose longest side is at most `max_side`.
///
/// Images already small enough keep their size; aspect ratio is preserved and
/// neither side collapses below one pixel.
#[must_use]
pub fn thumbnail_size(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side || longest == 0 {
        return (width, height);
    }
    let scale = f64::from(max_side) / f64::from(longest);
    (
        f64_to_u32_clamp(f64::from(width) * scale, 1, max_side),
        f64_to_u32_clamp(f64::from(height) * scale, 1, max_side),
    )
}

/// Downscale an analysis frame and encode it as PNG
///
/// # Errors
/// * Returns an error if the frame is not BGRA8 or PNG encoding fails
pub fn make_thumbnail(frame: &Frame, max_side: u32) -> Result<Thumbnail> {
    let rgba = bgra_frame_to_rgba(frame)?;
    let (width, height) = thumbnail_size(rgba.width(), rgba.height(), max_side);
    let small = imageops::thumbnail(&rgba, width, height);

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(small.as_raw(), small.width(), small.height(), ColorType::Rgba8)?;

    Ok(Thumbnail {
        width: small.width(),
        height: small.height(),
        png,
    })
}
