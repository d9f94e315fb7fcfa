//! # Emoji Art Core
//!
//! In-memory model for emoji art documents: one background image with text and
//! emoji glyphs placed over it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  art-core                   │
//! ├─────────────────────────────────────────────┤
//! │  Canvas           │  Snapshot               │
//! │  - Background     │  - Provenance           │
//! │  - Glyphs         │  - JSON encode/decode   │
//! │  - Viewport fit   │                         │
//! ├─────────────────────────────────────────────┤
//! │  Change events    │  Failure throttle       │
//! │  - Subscribe      │  - Per-key suppression  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Nothing here performs I/O; fetching lives in `art-resolver` and persistence
//! in `art-document`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod canvas;
pub mod error;
pub mod event;
pub mod glyph;
pub mod image;
pub mod snapshot;
pub mod state;
pub mod throttle;

pub use canvas::{Canvas, CanvasGeometry, ViewportConfig};
pub use error::{CanvasError, CanvasResult, SnapshotError};
pub use event::{CanvasEvent, CanvasId, ChangeNotifier};
pub use glyph::{Glyph, GlyphId, GlyphPlacement, Point};
pub use image::{ImageData, ImageHandle};
pub use snapshot::{BackgroundProvenance, DocumentSnapshot};
pub use state::LifecycleState;
pub use throttle::{FailureReport, FailureThrottle, ThrottleConfig};

/// Core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
