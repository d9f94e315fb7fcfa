//! Error types for image acquisition.

use thiserror::Error;
use url::Url;

/// Errors decoding, encoding or caching an image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The bytes are not a decodable image.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// The image could not be encoded.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// The pixel buffer does not match the stated dimensions.
    #[error("Invalid pixel buffer for {width}x{height} image")]
    InvalidPixels {
        /// Stated width.
        width: u32,
        /// Stated height.
        height: u32,
    },

    /// There is no background to work with.
    #[error("Canvas has no background image")]
    NoBackground,

    /// Cache I/O failed.
    #[error("Image cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache path cannot be expressed as a file URL.
    #[error("Cache path is not a valid file URL: {0}")]
    InvalidPath(String),
}

/// Errors fetching an image from a locator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP layer failed (connection, timeout, body).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// The URL that was fetched.
        url: Url,
    },

    /// Reading a local file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The fetched bytes were not a usable image.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The locator scheme is not one we can fetch.
    #[error("Unsupported locator: {0}")]
    Unsupported(String),

    /// The background fetch task died.
    #[error("Fetch task failed: {0}")]
    Task(String),
}

/// Result type for fetches.
pub type FetchResult<T> = Result<T, FetchError>;
