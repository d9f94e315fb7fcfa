//! The live canvas: a resolved background image and the glyphs placed over it.

use crate::event::{CanvasEvent, CanvasId, ChangeNotifier};
use crate::{
    BackgroundProvenance, CanvasError, CanvasResult, DocumentSnapshot, Glyph, GlyphId,
    GlyphPlacement, ImageHandle, Point,
};
use tokio::sync::broadcast;

/// Default viewport width in pixels.
const DEFAULT_VIEWPORT_WIDTH: f32 = 800.0;

/// Default viewport height in pixels.
const DEFAULT_VIEWPORT_HEIGHT: f32 = 600.0;

/// Viewport the canvas is presented in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportConfig {
    /// Visible width in pixels.
    pub width: f32,
    /// Visible height in pixels.
    pub height: f32,
    /// Smallest zoom the viewport allows.
    pub min_zoom: f32,
    /// Largest zoom the viewport allows.
    pub max_zoom: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
            min_zoom: 0.1,
            max_zoom: 5.0,
        }
    }
}

/// Layout bounds of the canvas content, equal to the background's pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasGeometry {
    /// Content width in pixels.
    pub width: u32,
    /// Content height in pixels.
    pub height: u32,
}

/// In-memory canvas model.
#[derive(Debug)]
pub struct Canvas {
    notifier: ChangeNotifier,
    background: Option<ImageHandle>,
    provenance: BackgroundProvenance,
    geometry: Option<CanvasGeometry>,
    viewport: ViewportConfig,
    zoom: f32,
    glyphs: Vec<Glyph>,
}

impl Canvas {
    /// Create an empty canvas presented in `viewport`.
    #[must_use]
    pub fn new(viewport: ViewportConfig) -> Self {
        Self {
            notifier: ChangeNotifier::new(CanvasId::new()),
            background: None,
            provenance: BackgroundProvenance::None,
            geometry: None,
            viewport,
            zoom: 1.0,
            glyphs: Vec::new(),
        }
    }

    /// This canvas' identity.
    #[must_use]
    pub fn id(&self) -> CanvasId {
        self.notifier.canvas()
    }

    /// Subscribe to this canvas' change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.notifier.subscribe()
    }

    /// The notifier, for collaborators that report events on this canvas' behalf.
    #[must_use]
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Replace the resolved background.
    ///
    /// The layout bounds become the image's pixel size and the zoom is refit so the
    /// whole image is visible. An image with a zero dimension leaves the bounds and
    /// zoom untouched.
    pub fn set_background(&mut self, image: ImageHandle, provenance: BackgroundProvenance) {
        tracing::debug!(
            canvas = %self.id(),
            provenance = provenance.kind(),
            width = image.width(),
            height = image.height(),
            "Background replaced"
        );
        if !image.is_empty() {
            let geometry = CanvasGeometry {
                width: image.width(),
                height: image.height(),
            };
            self.geometry = Some(geometry);
            self.zoom = self.fit_zoom(geometry);
        }
        self.background = Some(image);
        self.provenance = provenance;
        self.notifier.changed();
    }

    /// Drop the background and its provenance without signalling.
    ///
    /// Part of replacing the whole document; the caller signals once for that.
    pub fn clear_background(&mut self) {
        self.background = None;
        self.provenance = BackgroundProvenance::None;
        self.geometry = None;
        self.zoom = 1.0;
    }

    #[allow(clippy::cast_precision_loss)] // pixel sizes are far below f32's exact integer range
    fn fit_zoom(&self, geometry: CanvasGeometry) -> f32 {
        let scale_x = self.viewport.width / geometry.width as f32;
        let scale_y = self.viewport.height / geometry.height as f32;
        scale_x
            .min(scale_y)
            .clamp(self.viewport.min_zoom, self.viewport.max_zoom)
    }

    /// Place a new glyph centered at `center`.
    pub fn add_glyph(&mut self, text: impl Into<String>, size: i32, center: Point) -> GlyphId {
        let glyph = Glyph::new(GlyphPlacement::new(text, size, center));
        let id = glyph.id;
        self.glyphs.push(glyph);
        self.notifier.changed();
        id
    }

    /// Move a glyph's center to `center`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::GlyphNotFound`] if the glyph does not exist.
    pub fn reposition_glyph(&mut self, id: GlyphId, center: Point) -> CanvasResult<()> {
        let glyph = self.glyph_mut(id)?;
        glyph.placement.x = center.x;
        glyph.placement.y = center.y;
        self.notifier.changed();
        Ok(())
    }

    /// Offset a glyph's center by `delta` (one committed drag step).
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::GlyphNotFound`] if the glyph does not exist.
    pub fn move_glyph_by(&mut self, id: GlyphId, delta: Point) -> CanvasResult<Point> {
        let glyph = self.glyph_mut(id)?;
        let center = glyph.placement.center().offset_by(delta);
        glyph.placement.x = center.x;
        glyph.placement.y = center.y;
        self.notifier.changed();
        Ok(center)
    }

    /// Scale a glyph's point size by `factor` (one committed pinch step).
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] for a non-finite or non-positive
    /// factor and [`CanvasError::GlyphNotFound`] if the glyph does not exist.
    pub fn resize_glyph(&mut self, id: GlyphId, factor: f64) -> CanvasResult<i32> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(CanvasError::InvalidOperation(format!(
                "scale factor must be positive, got {factor}"
            )));
        }
        let size = self.glyph_mut(id)?.scale(factor);
        self.notifier.changed();
        Ok(size)
    }

    /// Remove every glyph without signalling.
    pub fn remove_all_glyphs(&mut self) {
        self.glyphs.clear();
    }

    fn glyph_mut(&mut self, id: GlyphId) -> CanvasResult<&mut Glyph> {
        self.glyphs
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(CanvasError::GlyphNotFound(id))
    }

    /// Get a glyph by ID.
    #[must_use]
    pub fn glyph(&self, id: GlyphId) -> Option<&Glyph> {
        self.glyphs.iter().find(|g| g.id == id)
    }

    /// Glyphs in placement order.
    pub fn glyphs(&self) -> impl Iterator<Item = &Glyph> {
        self.glyphs.iter()
    }

    /// Number of glyphs on the canvas.
    #[must_use]
    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// The resolved background image.
    #[must_use]
    pub fn background(&self) -> Option<&ImageHandle> {
        self.background.as_ref()
    }

    /// Where the current background came from.
    #[must_use]
    pub fn provenance(&self) -> &BackgroundProvenance {
        &self.provenance
    }

    /// Layout bounds, unset until a non-empty background has been shown.
    #[must_use]
    pub fn geometry(&self) -> Option<CanvasGeometry> {
        self.geometry
    }

    /// Current viewport zoom.
    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// The viewport configuration.
    #[must_use]
    pub fn viewport(&self) -> ViewportConfig {
        self.viewport
    }

    /// Project the canvas into a persistable snapshot.
    ///
    /// Returns `None` while no background provenance has been established: a
    /// canvas without a background is never committed to a document.
    #[must_use]
    pub fn to_snapshot(&self) -> Option<DocumentSnapshot> {
        if !self.provenance.is_some() {
            return None;
        }
        Some(DocumentSnapshot::new(
            self.provenance.clone(),
            self.glyphs.iter().map(|g| g.placement.clone()).collect(),
        ))
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(ViewportConfig::default())
    }
}
