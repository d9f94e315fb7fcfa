//! Image decoding and encoding.
//!
//! Supports decoding from raw bytes and base64 `data:` URIs, and encoding to
//! PNG (embedded backgrounds, thumbnails) or JPEG (local cache).

use std::io::Cursor;

use art_core::{ImageData, ImageHandle};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};

use crate::error::ImageError;

/// JPEG quality used for cached copies.
const JPEG_QUALITY: u8 = 100;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG with alpha support.
    Png,
    /// JPEG (no alpha).
    Jpeg,
    /// GIF.
    Gif,
    /// WebP (alpha support).
    WebP,
    /// Unknown/other format.
    Unknown,
}

impl ImageFormat {
    /// Detect format from MIME type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        match essence.to_lowercase().as_str() {
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/gif" => Self::Gif,
            "image/webp" => Self::WebP,
            _ => Self::Unknown,
        }
    }

    /// Detect format from magic bytes.
    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() < 4 {
            return Self::Unknown;
        }

        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Self::Png;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Self::Jpeg;
        }

        // GIF: GIF8
        if data.starts_with(b"GIF8") {
            return Self::Gif;
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Self::WebP;
        }

        Self::Unknown
    }
}

/// Decode an image from encoded bytes, keeping the bytes alongside the pixels.
///
/// # Errors
///
/// Returns [`ImageError::Decode`] if the bytes are not a decodable image.
pub fn decode_image(bytes: &[u8]) -> Result<ImageHandle, ImageError> {
    let format = ImageFormat::from_magic_bytes(bytes);
    let img = image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    tracing::trace!(?format, width, height, "Decoded image");

    Ok(ImageHandle::new(ImageData {
        width,
        height,
        rgba: rgba.into_raw(),
        encoded: Some(bytes.to_vec()),
    }))
}

/// Decode an image from a base64 `data:` URI such as `data:image/png;base64,iVBOR...`.
///
/// # Errors
///
/// Returns [`ImageError::Decode`] if the URI is malformed or the payload is not an image.
pub fn decode_data_uri(uri: &str) -> Result<ImageHandle, ImageError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ImageError::Decode("not a data URI".to_string()))?;
    let (metadata, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageError::Decode("invalid data URI: missing comma".to_string()))?;
    if !metadata.ends_with(";base64") {
        return Err(ImageError::Decode(
            "only base64 data URIs are supported".to_string(),
        ));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ImageError::Decode(format!("failed to decode base64: {e}")))?;
    decode_image(&bytes)
}

pub(crate) fn to_rgba_image(image: &ImageHandle) -> Result<RgbaImage, ImageError> {
    let data = image.data();
    RgbaImage::from_raw(data.width, data.height, data.rgba.clone()).ok_or(
        ImageError::InvalidPixels {
            width: data.width,
            height: data.height,
        },
    )
}

/// Encode RGBA pixels as PNG.
///
/// # Errors
///
/// Returns an error if the pixel buffer is inconsistent or encoding fails.
pub fn encode_png(image: &ImageHandle) -> Result<Vec<u8>, ImageError> {
    png_bytes(&to_rgba_image(image)?)
}

pub(crate) fn png_bytes(rgba: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Cursor::new(Vec::new());
    rgba.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Encode as JPEG at full quality (alpha is dropped).
///
/// # Errors
///
/// Returns an error if the pixel buffer is inconsistent or encoding fails.
pub fn encode_jpeg(image: &ImageHandle) -> Result<Vec<u8>, ImageError> {
    let rgb = DynamicImage::ImageRgba8(to_rgba_image(image)?).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(out)
}

/// Bytes to embed in a document for `image`.
///
/// The original encoding is reused when the image still carries it, so an
/// embedded background round-trips byte for byte; otherwise the pixels are
/// encoded as PNG.
///
/// # Errors
///
/// Returns an error only if PNG encoding is needed and fails.
pub fn embedded_bytes(image: &ImageHandle) -> Result<Vec<u8>, ImageError> {
    match image.encoded() {
        Some(bytes) => Ok(bytes.to_vec()),
        None => encode_png(image),
    }
}
