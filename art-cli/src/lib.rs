//! # Emoji Art CLI
//!
//! Drives the document lifecycle from the command line: every command opens a
//! document, applies one change, and closes it (which saves and attaches a
//! thumbnail).
//!
//! ## Usage
//!
//! ```bash
//! emojiart new beach.emojiart
//! emojiart background beach.emojiart --url https://example.com/beach.jpg
//! emojiart background beach.emojiart --file ./beach.png
//! emojiart add beach.emojiart 🦀 --size 48 --x 120 --y 300
//! emojiart move beach.emojiart 0 --dx 10 --dy -5
//! emojiart resize beach.emojiart 0 1.5
//! emojiart show beach.emojiart
//! emojiart info beach.emojiart
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use art_core::{DocumentSnapshot, GlyphId, Point, ThrottleConfig, ViewportConfig};
use art_document::{
    BackgroundChange, DocumentStorage, DocumentSynchronizer, FileStorage, SyncConfig,
};
use art_resolver::{
    decode_image, DefaultResolver, MemoizingFetcher, NetworkFetcher, ResolverConfig,
};
use clap::{Parser, Subcommand};
use url::Url;

/// Command-line arguments for emojiart.
#[derive(Debug, Clone, Parser)]
#[command(name = "emojiart")]
#[command(about = "Compose emoji art over a background image")]
#[command(version)]
pub struct CliArgs {
    /// Root directory of the local image cache
    #[arg(long, global = true, env = "EMOJIART_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Timeout for fetching a background, in seconds
    #[arg(long, global = true, env = "EMOJIART_FETCH_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Viewport width used to fit backgrounds
    #[arg(long, global = true, default_value = "800")]
    pub viewport_width: f32,

    /// Viewport height used to fit backgrounds
    #[arg(long, global = true, default_value = "600")]
    pub viewport_height: f32,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Document commands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create an empty document
    New {
        /// Document path
        path: PathBuf,
    },
    /// Print the stored document as JSON
    Show {
        /// Document path
        path: PathBuf,
    },
    /// Print size, modification time and thumbnail presence
    Info {
        /// Document path
        path: PathBuf,
    },
    /// Set the background from a URL, a local image, or both
    Background {
        /// Document path
        path: PathBuf,
        /// Remote image locator
        #[arg(long)]
        url: Option<Url>,
        /// Local image used directly or as a fallback for the URL
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Place a glyph
    Add {
        /// Document path
        path: PathBuf,
        /// Glyph text, usually one emoji
        text: String,
        /// Point size
        #[arg(long, default_value = "40")]
        size: i32,
        /// Center X
        #[arg(long, allow_negative_numbers = true, default_value = "0")]
        x: i32,
        /// Center Y
        #[arg(long, allow_negative_numbers = true, default_value = "0")]
        y: i32,
    },
    /// Move a glyph by an offset
    Move {
        /// Document path
        path: PathBuf,
        /// Glyph index, in placement order
        index: usize,
        /// Horizontal offset
        #[arg(long, allow_negative_numbers = true, default_value = "0")]
        dx: i32,
        /// Vertical offset
        #[arg(long, allow_negative_numbers = true, default_value = "0")]
        dy: i32,
    },
    /// Scale a glyph's point size
    Resize {
        /// Document path
        path: PathBuf,
        /// Glyph index, in placement order
        index: usize,
        /// Scale factor
        factor: f64,
    },
}

/// Settings derived from the command line.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Resolver settings.
    pub resolver: ResolverConfig,
    /// Synchronizer settings.
    pub sync: SyncConfig,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        let mut resolver = ResolverConfig::from_env();
        if let Some(dir) = &args.cache_dir {
            resolver.cache_dir.clone_from(dir);
        }
        if let Some(secs) = args.timeout_secs.filter(|secs| *secs > 0) {
            resolver.request_timeout = Duration::from_secs(secs);
        }
        let viewport = ViewportConfig {
            width: args.viewport_width,
            height: args.viewport_height,
            ..ViewportConfig::default()
        };
        Self {
            resolver,
            sync: SyncConfig {
                viewport,
                throttle: ThrottleConfig::default(),
            },
        }
    }
}

type Synchronizer = DocumentSynchronizer<MemoizingFetcher<NetworkFetcher>, FileStorage>;

fn synchronizer(config: &CliConfig) -> anyhow::Result<Synchronizer> {
    let resolver = DefaultResolver::from_config(&config.resolver)
        .context("failed to build image resolver")?;
    Ok(DocumentSynchronizer::new(
        resolver,
        Arc::new(FileStorage::new()),
        config.sync,
    ))
}

fn glyph_at(sync: &Synchronizer, index: usize) -> anyhow::Result<GlyphId> {
    sync.canvas()
        .glyphs()
        .nth(index)
        .map(|glyph| glyph.id)
        .ok_or_else(|| anyhow!("no glyph at index {index} ({} placed)", sync.canvas().glyph_count()))
}

async fn open_existing(config: &CliConfig, path: &Path) -> anyhow::Result<Synchronizer> {
    let mut sync = synchronizer(config)?;
    let outcome = sync.open(path, !path.exists()).await?;
    if let Some(BackgroundChange::Failed(notice)) = &outcome.background {
        tracing::warn!(reason = %notice.reason, "Background could not be restored");
    }
    Ok(sync)
}

fn describe_change(change: &BackgroundChange) -> String {
    match change {
        BackgroundChange::Applied { kind, cached } => match cached {
            Some(url) => format!("background set ({kind}, cached at {url})"),
            None => format!("background set ({kind})"),
        },
        BackgroundChange::Failed(notice) => {
            let target = notice
                .locator
                .as_ref()
                .map_or_else(|| "image".to_string(), Url::to_string);
            format!("could not open {target}: {}", notice.reason)
        }
        BackgroundChange::Superseded => "background change superseded".to_string(),
    }
}

/// Run one command and return the text to print.
///
/// # Errors
///
/// Returns an error if the document cannot be read or written, the command
/// refers to something that does not exist, `new` targets an existing
/// document, or a background could not be opened.
pub async fn run(args: CliArgs) -> anyhow::Result<String> {
    let config = CliConfig::from(&args);
    match args.command {
        Command::New { path } => {
            let mut sync = synchronizer(&config)?;
            sync.open(&path, true).await?;
            sync.close().await?;
            Ok(format!("created {}", path.display()))
        }
        Command::Show { path } => {
            let bytes = FileStorage::new()
                .read(&path)
                .await?
                .ok_or_else(|| anyhow!("{} does not exist", path.display()))?;
            if bytes.is_empty() {
                return Ok("empty document".to_string());
            }
            let snapshot = DocumentSnapshot::decode(&bytes)
                .with_context(|| format!("{} is not an emoji art document", path.display()))?;
            Ok(serde_json::to_string_pretty(&snapshot)?)
        }
        Command::Info { path } => {
            let info = FileStorage::new().info(&path).await?;
            let mut out = String::new();
            writeln!(out, "size: {} bytes", info.size_bytes)?;
            if let Some(modified) = info.modified {
                writeln!(out, "modified: {modified:?}")?;
            }
            write!(out, "thumbnail: {}", if info.has_thumbnail { "yes" } else { "no" })?;
            Ok(out)
        }
        Command::Background { path, url, file } => {
            if url.is_none() && file.is_none() {
                bail!("give --url, --file, or both");
            }
            let fallback = match &file {
                Some(file) => {
                    let bytes = tokio::fs::read(file)
                        .await
                        .with_context(|| format!("failed to read {}", file.display()))?;
                    Some(decode_image(&bytes)?)
                }
                None => None,
            };
            let mut sync = open_existing(&config, &path).await?;
            let change = sync.set_background(url, fallback).await?;
            sync.close().await?;
            match change {
                BackgroundChange::Applied { .. } => Ok(describe_change(&change)),
                BackgroundChange::Failed(_) | BackgroundChange::Superseded => {
                    bail!(describe_change(&change))
                }
            }
        }
        Command::Add {
            path,
            text,
            size,
            x,
            y,
        } => {
            let mut sync = open_existing(&config, &path).await?;
            sync.add_glyph(text.as_str(), size, Point::new(x, y))?;
            let index = sync.canvas().glyph_count() - 1;
            let saved = sync.canvas().to_snapshot().is_some();
            sync.close().await?;
            Ok(if saved {
                format!("added {text} as glyph {index}")
            } else {
                format!("added {text} as glyph {index} (not saved: set a background first)")
            })
        }
        Command::Move {
            path,
            index,
            dx,
            dy,
        } => {
            let mut sync = open_existing(&config, &path).await?;
            let id = glyph_at(&sync, index)?;
            let center = sync.edit(|canvas| canvas.move_glyph_by(id, Point::new(dx, dy)))??;
            sync.close().await?;
            Ok(format!("glyph {index} now at ({}, {})", center.x, center.y))
        }
        Command::Resize {
            path,
            index,
            factor,
        } => {
            let mut sync = open_existing(&config, &path).await?;
            let id = glyph_at(&sync, index)?;
            let size = sync.edit(|canvas| canvas.resize_glyph(id, factor))??;
            sync.close().await?;
            Ok(format!("glyph {index} now size {size}"))
        }
    }
}
