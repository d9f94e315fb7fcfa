//! Document thumbnails.

use art_core::Canvas;
use image::imageops;

use crate::codec::{png_bytes, to_rgba_image};
use crate::error::ImageError;

/// Longest edge of a document thumbnail.
pub const THUMBNAIL_MAX_EDGE: u32 = 1024;

/// Render a PNG thumbnail of the canvas background, scaled to fit `max_edge`.
///
/// Images already inside the bound are encoded at their own size.
///
/// # Errors
///
/// Returns [`ImageError::NoBackground`] when the canvas has no background, and
/// an error if the pixels are unusable or encoding fails.
pub fn render_thumbnail(canvas: &Canvas, max_edge: u32) -> Result<Vec<u8>, ImageError> {
    let background = canvas.background().ok_or(ImageError::NoBackground)?;
    if background.is_empty() || max_edge == 0 {
        return Err(ImageError::InvalidPixels {
            width: background.width(),
            height: background.height(),
        });
    }

    let rgba = to_rgba_image(background)?;
    let (width, height) = fit_within(rgba.width(), rgba.height(), max_edge);
    let bytes = if (width, height) == rgba.dimensions() {
        png_bytes(&rgba)?
    } else {
        png_bytes(&imageops::thumbnail(&rgba, width, height))?
    };

    tracing::debug!(width, height, bytes = bytes.len(), "Rendered thumbnail");
    Ok(bytes)
}

/// Dimensions of `width`x`height` scaled down to fit a `max_edge` square.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }
    let scale = f64::from(max_edge) / f64::from(width.max(height));
    let scaled = |edge: u32| ((f64::from(edge) * scale).round() as u32).clamp(1, max_edge);
    (scaled(width), scaled(height))
}
