//! Serializable document snapshot: where the background came from plus the glyph list.
//!
//! ## Wire format
//!
//! ```text
//! {"background": "https://example.com/cat.jpg", "glyphs": [{"x":1,"y":2,"text":"🐶","size":40}]}
//! {"background": {"embedded": "<base64 image bytes>"}, "glyphs": []}
//! {"glyphs": []}                                   // no background
//! {"url": "https://...", "emojis": [...]}          // legacy field names
//! ```
//!
//! Unknown fields are ignored. Decoding fails closed: any malformed input yields
//! an error and never a partially populated snapshot.

use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{GlyphPlacement, SnapshotError};

/// Origin of the background image backing a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackgroundProvenance {
    /// Fetched from a remote locator.
    Remote(Url),
    /// Stored inline as encoded image bytes.
    Embedded(Vec<u8>),
    /// No background has been established.
    #[default]
    None,
}

impl BackgroundProvenance {
    /// Whether a background has been established.
    #[must_use]
    pub fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// The remote locator, if any.
    #[must_use]
    pub fn locator(&self) -> Option<&Url> {
        match self {
            Self::Remote(url) => Some(url),
            Self::Embedded(_) | Self::None => None,
        }
    }

    /// Short label for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Embedded(_) => "embedded",
            Self::None => "none",
        }
    }
}

/// Immutable projection of a canvas that can be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "WireSnapshot", try_from = "WireSnapshot")]
pub struct DocumentSnapshot {
    /// Background provenance.
    pub background: BackgroundProvenance,
    /// Glyphs in placement order.
    pub glyphs: Vec<GlyphPlacement>,
}

impl DocumentSnapshot {
    /// Build a snapshot.
    #[must_use]
    pub fn new(background: BackgroundProvenance, glyphs: Vec<GlyphPlacement>) -> Self {
        Self { background, glyphs }
    }

    /// Encode to the persisted byte form.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Encode`] only if the serializer itself fails.
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(self).map_err(SnapshotError::Encode)
    }

    /// Decode from persisted bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Decode`] for any malformed input.
    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        serde_json::from_slice(bytes).map_err(|e| SnapshotError::Decode(e.to_string()))
    }
}

/// Persisted background: a bare URL string or inline bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireBackground {
    Url(Url),
    Inline { embedded: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireSnapshot {
    #[serde(default, alias = "url", skip_serializing_if = "Option::is_none")]
    background: Option<WireBackground>,
    #[serde(default, alias = "emojis")]
    glyphs: Vec<GlyphPlacement>,
}

impl From<DocumentSnapshot> for WireSnapshot {
    fn from(snapshot: DocumentSnapshot) -> Self {
        let background = match snapshot.background {
            BackgroundProvenance::Remote(url) => Some(WireBackground::Url(url)),
            BackgroundProvenance::Embedded(bytes) => Some(WireBackground::Inline {
                embedded: base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
            BackgroundProvenance::None => None,
        };
        Self {
            background,
            glyphs: snapshot.glyphs,
        }
    }
}

impl TryFrom<WireSnapshot> for DocumentSnapshot {
    type Error = String;

    fn try_from(wire: WireSnapshot) -> Result<Self, Self::Error> {
        let background = match wire.background {
            Some(WireBackground::Url(url)) => BackgroundProvenance::Remote(url),
            Some(WireBackground::Inline { embedded }) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(embedded)
                    .map_err(|e| format!("embedded background is not base64: {e}"))?;
                BackgroundProvenance::Embedded(bytes)
            }
            None => BackgroundProvenance::None,
        };
        Ok(Self {
            background,
            glyphs: wire.glyphs,
        })
    }
}
