//! # Document Synchronization
//!
//! Keeps one canvas, its snapshot and the persisted document consistent.
//!
//! ## Lifecycle
//!
//! - `open`: `Closed -> Opening -> Normal`. Unreadable or malformed bytes open
//!   as an empty document. Glyphs are restored, the background goes through
//!   the resolver.
//! - edits: every canvas change signal marks the document dirty (`Editing`).
//! - `save`: snapshot, encode, single-flight write, then back to `Normal`.
//!   A canvas without a background has no snapshot and saves nothing.
//! - `close`: thumbnail (best effort), final save, teardown, `Closed`.
//!
//! Background failures are routed through a [`FailureThrottle`] keyed by
//! locator before they reach the user; every failure is still logged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use art_core::{
    BackgroundProvenance, Canvas, CanvasEvent, DocumentSnapshot, FailureThrottle, ImageHandle,
    LifecycleState, Point, ThrottleConfig, ViewportConfig,
};
use art_resolver::{
    decode_image, render_thumbnail, ImageError, ImageFetcher, ImageResolver, Resolution,
    ResolveTask, THUMBNAIL_MAX_EDGE,
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use url::Url;

use crate::error::{StoreError, StoreResult, SyncError, SyncResult};
use crate::persister::Persister;
use crate::storage::{DocumentInfo, DocumentStorage, THUMBNAIL_KEY};

/// Produces the thumbnail attached to a document on close.
pub trait Thumbnailer: Send + Sync {
    /// Render `canvas` to encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the canvas cannot be rendered.
    fn thumbnail(&self, canvas: &Canvas) -> Result<Vec<u8>, ImageError>;
}

/// Scales the background down to a PNG.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundThumbnailer {
    /// Longest edge of the thumbnail.
    pub max_edge: u32,
}

impl Default for BackgroundThumbnailer {
    fn default() -> Self {
        Self {
            max_edge: THUMBNAIL_MAX_EDGE,
        }
    }
}

impl Thumbnailer for BackgroundThumbnailer {
    fn thumbnail(&self, canvas: &Canvas) -> Result<Vec<u8>, ImageError> {
        render_thumbnail(canvas, self.max_edge)
    }
}

/// Synchronizer settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncConfig {
    /// Viewport the canvas fits backgrounds into.
    pub viewport: ViewportConfig,
    /// Failure warning throttle.
    pub throttle: ThrottleConfig,
}

/// A background failure after throttling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    /// The locator that failed, if there was one.
    pub locator: Option<Url>,
    /// What went wrong.
    pub reason: String,
    /// Whether the user should be warned.
    pub notify_user: bool,
}

/// Result of a background change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundChange {
    /// The canvas now shows the resolved background.
    Applied {
        /// Provenance kind that was applied (`remote` or `embedded`).
        kind: &'static str,
        /// Local cache copy written while falling back.
        cached: Option<Url>,
    },
    /// Resolution failed; the canvas is unchanged.
    Failed(FailureNotice),
    /// A newer background change started first; this one was dropped.
    Superseded,
}

/// Result of opening a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOutcome {
    /// Glyphs restored onto the canvas.
    pub glyphs: usize,
    /// Whether the stored bytes were unreadable and the document started empty.
    pub started_empty: bool,
    /// Outcome of restoring the background, if the document had one.
    pub background: Option<BackgroundChange>,
}

/// Result of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The snapshot was written.
    Saved {
        /// Encoded size.
        bytes: usize,
    },
    /// The canvas has no background, so there is no snapshot to write.
    NothingToSave,
}

/// Owns one canvas and the document it is persisted to.
///
/// All methods take `&mut self`: the synchronizer lives on a single owner task
/// and background fetches report back through awaited [`ResolveTask`]s.
pub struct DocumentSynchronizer<F, S> {
    config: SyncConfig,
    state: LifecycleState,
    location: Option<PathBuf>,
    canvas: Canvas,
    resolver: ImageResolver<F>,
    storage: Arc<S>,
    persister: Option<Arc<Persister<S>>>,
    throttle: FailureThrottle<Option<Url>>,
    events: Option<broadcast::Receiver<CanvasEvent>>,
    dirty: bool,
    thumbnailer: Box<dyn Thumbnailer>,
}

impl<F, S> std::fmt::Debug for DocumentSynchronizer<F, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSynchronizer")
            .field("state", &self.state)
            .field("location", &self.location)
            .field("dirty", &self.dirty)
            .field("glyphs", &self.canvas.glyph_count())
            .finish_non_exhaustive()
    }
}

impl<F: ImageFetcher, S: DocumentStorage> DocumentSynchronizer<F, S> {
    /// Create a closed synchronizer.
    pub fn new(resolver: ImageResolver<F>, storage: Arc<S>, config: SyncConfig) -> Self {
        Self {
            config,
            state: LifecycleState::Closed,
            location: None,
            canvas: Canvas::new(config.viewport),
            resolver,
            storage,
            persister: None,
            throttle: FailureThrottle::new(config.throttle),
            events: None,
            dirty: false,
            thumbnailer: Box::new(BackgroundThumbnailer::default()),
        }
    }

    /// Replace the thumbnail renderer.
    #[must_use]
    pub fn with_thumbnailer(mut self, thumbnailer: impl Thumbnailer + 'static) -> Self {
        self.thumbnailer = Box::new(thumbnailer);
        self
    }

    /// Synchronizer settings.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Location of the open document.
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Whether unsaved changes exist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The canvas.
    #[must_use]
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// The resolver used for backgrounds.
    #[must_use]
    pub fn resolver(&self) -> &ImageResolver<F> {
        &self.resolver
    }

    /// The failure throttle.
    #[must_use]
    pub fn throttle(&self) -> &FailureThrottle<Option<Url>> {
        &self.throttle
    }

    /// Subscribe to canvas events (changes and open failures).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.canvas.subscribe()
    }

    fn transition(&mut self, next: LifecycleState) -> SyncResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Document lifecycle");
            self.state = next;
        }
        Ok(())
    }

    fn require_open(&self) -> SyncResult<()> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(SyncError::NotOpen)
        }
    }

    /// Open the document at `location`, closing any open one first.
    ///
    /// With `is_new`, an empty document is created there. Storage and decode
    /// failures are logged and the document opens empty.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyExists`] when `is_new` is set and a document
    /// is already stored at `location` (the synchronizer stays `Closed` and the
    /// stored bytes are untouched), or the error from closing the previously
    /// open document.
    pub async fn open(&mut self, location: impl Into<PathBuf>, is_new: bool) -> SyncResult<OpenOutcome> {
        if self.state != LifecycleState::Closed {
            self.close().await?;
        }
        let location = location.into();
        if is_new {
            match self.storage.create_empty(&location).await {
                Ok(()) => {}
                Err(StoreError::AlreadyExists(path)) => return Err(SyncError::AlreadyExists(path)),
                Err(e) => {
                    tracing::warn!(location = %location.display(), error = %e, "Could not create new document");
                }
            }
        }
        self.transition(LifecycleState::Opening)?;
        tracing::info!(location = %location.display(), is_new, "Opening document");

        let (snapshot, started_empty) = self.read_snapshot(&location).await;
        for placement in &snapshot.glyphs {
            self.canvas
                .add_glyph(placement.text.clone(), placement.size, placement.center());
        }

        let background = match snapshot.background {
            BackgroundProvenance::None => None,
            BackgroundProvenance::Remote(locator) => {
                let task = self.resolver.resolve(Some(locator), None);
                Some(self.finish_background_change(task).await)
            }
            BackgroundProvenance::Embedded(bytes) => Some(self.restore_embedded(bytes).await),
        };

        self.events = Some(self.canvas.subscribe());
        self.persister = Some(Arc::new(Persister::new(
            Arc::clone(&self.storage),
            location.clone(),
        )));
        self.location = Some(location);
        self.dirty = false;
        self.transition(LifecycleState::Normal)?;

        let outcome = OpenOutcome {
            glyphs: snapshot.glyphs.len(),
            started_empty,
            background,
        };
        tracing::info!(glyphs = outcome.glyphs, started_empty, "Document open");
        Ok(outcome)
    }

    async fn read_snapshot(&self, location: &Path) -> (DocumentSnapshot, bool) {
        let bytes = match self.storage.read(location).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(location = %location.display(), "No stored document; starting empty");
                return (DocumentSnapshot::default(), true);
            }
            Err(e) => {
                tracing::warn!(location = %location.display(), error = %e, "Unreadable document; starting empty");
                return (DocumentSnapshot::default(), true);
            }
        };
        if bytes.is_empty() {
            return (DocumentSnapshot::default(), true);
        }
        match DocumentSnapshot::decode(&bytes) {
            Ok(snapshot) => (snapshot, false),
            Err(e) => {
                tracing::warn!(location = %location.display(), error = %e, "Malformed document; starting empty");
                (DocumentSnapshot::default(), true)
            }
        }
    }

    async fn restore_embedded(&mut self, bytes: Vec<u8>) -> BackgroundChange {
        let decoded = tokio::task::spawn_blocking(move || decode_image(&bytes)).await;
        match decoded {
            Ok(Ok(image)) => {
                let resolution = self.resolver.resolve_local(image);
                self.apply_resolution(resolution)
            }
            Ok(Err(e)) => self.report_failure(None, e.to_string()),
            Err(e) => self.report_failure(None, e.to_string()),
        }
    }

    /// Drain pending canvas events, marking the document dirty on changes.
    ///
    /// Returns the number of change signals seen.
    pub fn pump_events(&mut self) -> usize {
        let Some(events) = self.events.as_mut() else {
            return 0;
        };
        let canvas = self.canvas.id();
        let mut changes = 0;
        loop {
            match events.try_recv() {
                Ok(CanvasEvent::Changed { canvas: from }) if from == canvas => changes += 1,
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Change events lagged");
                    changes += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if changes > 0 {
            self.mark_dirty();
        }
        changes
    }

    /// Note that at least one save is needed.
    pub fn mark_dirty(&mut self) {
        if !self.state.is_open() {
            return;
        }
        self.dirty = true;
        if self.state == LifecycleState::Normal {
            tracing::debug!(from = %self.state, to = %LifecycleState::Editing, "Document lifecycle");
            self.state = LifecycleState::Editing;
        }
    }

    /// Apply an edit to the canvas and pick up its change signals.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] when no document is open.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut Canvas) -> R) -> SyncResult<R> {
        self.require_open()?;
        let result = f(&mut self.canvas);
        self.pump_events();
        Ok(result)
    }

    /// Place a glyph.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] when no document is open.
    pub fn add_glyph(
        &mut self,
        text: impl Into<String>,
        size: i32,
        center: Point,
    ) -> SyncResult<art_core::GlyphId> {
        let text = text.into();
        self.edit(|canvas| canvas.add_glyph(text, size, center))
    }

    /// Start changing the background.
    ///
    /// The returned task can take a fallback through its slot while the fetch
    /// runs; hand it to [`Self::finish_background_change`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] when no document is open.
    pub fn begin_background_change(
        &mut self,
        locator: Option<Url>,
        fallback: Option<ImageHandle>,
    ) -> SyncResult<ResolveTask> {
        self.require_open()?;
        Ok(self.resolver.resolve(locator, fallback))
    }

    /// Await a background change and apply its outcome to the canvas.
    pub async fn finish_background_change(&mut self, task: ResolveTask) -> BackgroundChange {
        match task.finish().await {
            Some(resolution) => self.apply_resolution(resolution),
            None => BackgroundChange::Superseded,
        }
    }

    /// Resolve and apply a new background.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] when no document is open.
    pub async fn set_background(
        &mut self,
        locator: Option<Url>,
        fallback: Option<ImageHandle>,
    ) -> SyncResult<BackgroundChange> {
        let task = self.begin_background_change(locator, fallback)?;
        Ok(self.finish_background_change(task).await)
    }

    fn apply_resolution(&mut self, resolution: Resolution) -> BackgroundChange {
        match resolution {
            Resolution::Resolved {
                provenance,
                image,
                cached,
            } => {
                let kind = provenance.kind();
                tracing::debug!(kind, width = image.width(), height = image.height(), "Applying background");
                self.canvas.set_background(image, provenance);
                self.pump_events();
                BackgroundChange::Applied { kind, cached }
            }
            Resolution::Failed { locator, reason } => self.report_failure(locator, reason),
        }
    }

    fn report_failure(&mut self, locator: Option<Url>, reason: String) -> BackgroundChange {
        let report = self.throttle.report_failure(locator.clone());
        tracing::warn!(
            locator = ?locator.as_ref().map(Url::as_str),
            reason = %reason,
            occurrences = report.occurrences,
            "Background could not be opened"
        );
        if report.should_notify_user {
            self.canvas.notifier().open_failed(locator.clone());
        }
        BackgroundChange::Failed(FailureNotice {
            locator,
            reason,
            notify_user: report.should_notify_user,
        })
    }

    /// The user asked to stop warning about the current failure.
    pub fn suppress_warnings(&mut self) {
        self.throttle.suppress();
    }

    /// Persist the current snapshot.
    ///
    /// A canvas without a background has no snapshot; nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] with no document open, [`SyncError::Encode`]
    /// if encoding fails and [`SyncError::Store`] if the write fails. On error
    /// the stored bytes are unchanged and the document stays dirty.
    pub async fn save(&mut self) -> SyncResult<SaveOutcome> {
        self.require_open()?;
        self.pump_events();

        let Some(snapshot) = self.canvas.to_snapshot() else {
            tracing::debug!("No background; nothing to save");
            return Ok(SaveOutcome::NothingToSave);
        };
        let bytes = snapshot.encode()?;
        let len = bytes.len();
        let persister = Arc::clone(self.persister.as_ref().ok_or(SyncError::NotOpen)?);
        persister.persist(bytes).await?;

        self.dirty = false;
        if self.state == LifecycleState::Editing {
            self.transition(LifecycleState::Normal)?;
        }
        tracing::info!(bytes = len, glyphs = snapshot.glyphs.len(), "Document saved");
        Ok(SaveOutcome::Saved { bytes: len })
    }

    /// Describe the stored document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotOpen`] with no document open, or the storage error.
    pub async fn info(&self) -> SyncResult<DocumentInfo> {
        let location = self.location.as_deref().ok_or(SyncError::NotOpen)?;
        Ok(self.storage.info(location).await?)
    }

    async fn attach_thumbnail(&self, location: &Path) -> StoreResult<bool> {
        let png = match self.thumbnailer.thumbnail(&self.canvas) {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(error = %e, "Thumbnail capture failed");
                return Ok(false);
            }
        };
        self.storage
            .write_attribute(location, THUMBNAIL_KEY, &png)
            .await?;
        tracing::debug!(bytes = png.len(), "Thumbnail attached");
        Ok(true)
    }

    /// Close the document: thumbnail, final save, teardown.
    ///
    /// Thumbnail failures are logged and never stop the close. The canvas is
    /// torn down even if the final save fails.
    ///
    /// # Errors
    ///
    /// Returns the final save's error after closing.
    pub async fn close(&mut self) -> SyncResult<()> {
        if self.state == LifecycleState::Closed {
            return Ok(());
        }
        self.pump_events();

        let mut result = Ok(());
        if self.state.is_open() && self.canvas.to_snapshot().is_some() {
            if let Some(location) = self.location.clone() {
                if let Err(e) = self.attach_thumbnail(&location).await {
                    tracing::warn!(error = %e, "Could not store thumbnail");
                }
            }
            if let Err(e) = self.save().await {
                tracing::warn!(error = %e, "Final save failed");
                result = Err(e);
            }
        }

        self.events = None;
        self.canvas.remove_all_glyphs();
        self.canvas.clear_background();
        self.resolver.invalidate();
        self.persister = None;
        let location = self.location.take();
        self.dirty = false;
        self.transition(LifecycleState::Closed)?;
        tracing::info!(location = ?location.as_deref().map(Path::display), "Document closed");
        result
    }
}
