//! Error types for canvas and snapshot operations.

use thiserror::Error;

use crate::GlyphId;

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors that can occur in canvas operations.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// Glyph not found on the canvas.
    #[error("Glyph not found: {0}")]
    GlyphNotFound(GlyphId),

    /// Invalid glyph operation (bad scale factor, empty text).
    #[error("Invalid operation on glyph: {0}")]
    InvalidOperation(String),
}

/// Errors from encoding or decoding a [`crate::DocumentSnapshot`].
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The persisted bytes are not a well-formed snapshot.
    #[error("Malformed snapshot: {0}")]
    Decode(String),

    /// The snapshot could not be encoded.
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}
