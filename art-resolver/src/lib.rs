//! # Emoji Art Resolver
//!
//! Background image acquisition for emoji art documents.
//!
//! ## Pipeline
//!
//! ```text
//! locator ──► rewrite ──► fetch (tokio task) ──┐
//!             (cache / imgurl)                 ├──► settle ──► Resolution
//! fallback ───────────────────► FallbackSlot ──┘      │
//!                                                     └──► local JPEG cache (on fallback)
//! ```
//!
//! [`ImageResolver::resolve`] hands back a [`ResolveTask`]; the owner awaits it
//! and applies the [`Resolution`] to its canvas. Results of superseded tasks
//! are discarded.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod locator;
pub mod resolver;
pub mod thumbnail;

pub use cache::LocalImageCache;
pub use codec::{decode_image, embedded_bytes, ImageFormat};
pub use config::ResolverConfig;
pub use error::{FetchError, FetchResult, ImageError};
pub use fetcher::{ImageFetcher, MemoizingFetcher, NetworkFetcher, DEFAULT_MEMO_ENTRIES};
pub use locator::image_url;
pub use resolver::{DefaultResolver, FallbackSlot, ImageResolver, Resolution, ResolveTask};
pub use thumbnail::{render_thumbnail, THUMBNAIL_MAX_EDGE};
