//! Decoded background images.
//!
//! [`ImageHandle`] is a cheap, clonable reference to decoded pixels. Two handles
//! denote the *same image* only when they were cloned from the same value;
//! equal pixel content is not enough. The resolver relies on this to recognise
//! a fallback image that was handed in for instant presentation.

use std::sync::Arc;

/// Decoded RGBA pixels plus, when known, the encoding they were decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA pixel data (4 bytes per pixel).
    pub rgba: Vec<u8>,
    /// Original encoded bytes (PNG, JPEG, ...) if the image came from an encoding.
    pub encoded: Option<Vec<u8>>,
}

/// Shared handle to a decoded image with identity semantics.
#[derive(Debug, Clone)]
pub struct ImageHandle(Arc<ImageData>);

impl ImageHandle {
    /// Wrap decoded image data.
    #[must_use]
    pub fn new(data: ImageData) -> Self {
        Self(Arc::new(data))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height
    }

    /// Whether either dimension is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.width == 0 || self.0.height == 0
    }

    /// The decoded pixel data.
    #[must_use]
    pub fn data(&self) -> &ImageData {
        &self.0
    }

    /// Original encoded bytes, if retained.
    #[must_use]
    pub fn encoded(&self) -> Option<&[u8]> {
        self.0.encoded.as_deref()
    }

    /// Identity comparison: true only for clones of the same handle.
    #[must_use]
    pub fn same_image(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
