//! Change notification for canvases.
//!
//! Every canvas owns one broadcast channel. Mutations publish
//! [`CanvasEvent::Changed`]; consumers subscribe for the lifetime of an open
//! document and drop the receiver to unsubscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

/// Capacity of each canvas' event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Identity of a canvas instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasId(Uuid);

impl CanvasId {
    /// Create a new unique canvas ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CanvasId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CanvasId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events emitted by a canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanvasEvent {
    /// The canvas content changed and should eventually be persisted.
    Changed {
        /// Originating canvas.
        canvas: CanvasId,
    },
    /// A background image could not be opened.
    OpenFailed {
        /// Originating canvas.
        canvas: CanvasId,
        /// The locator that failed, if there was one.
        locator: Option<Url>,
    },
}

impl CanvasEvent {
    /// The canvas that emitted this event.
    #[must_use]
    pub const fn canvas(&self) -> CanvasId {
        match self {
            Self::Changed { canvas } | Self::OpenFailed { canvas, .. } => *canvas,
        }
    }
}

/// Sending half of a canvas' event channel.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    canvas: CanvasId,
    tx: broadcast::Sender<CanvasEvent>,
}

impl ChangeNotifier {
    /// Create a notifier for `canvas`.
    #[must_use]
    pub fn new(canvas: CanvasId) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { canvas, tx }
    }

    /// The canvas this notifier speaks for.
    #[must_use]
    pub const fn canvas(&self) -> CanvasId {
        self.canvas
    }

    /// Subscribe to events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a change signal.
    pub fn changed(&self) {
        self.publish(CanvasEvent::Changed {
            canvas: self.canvas,
        });
    }

    /// Publish an open failure for `locator`.
    pub fn open_failed(&self, locator: Option<Url>) {
        self.publish(CanvasEvent::OpenFailed {
            canvas: self.canvas,
            locator,
        });
    }

    fn publish(&self, event: CanvasEvent) {
        // No subscribers is fine: nobody has an open document on this canvas.
        if self.tx.send(event).is_err() {
            tracing::trace!(canvas = %self.canvas, "canvas event dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_reaches_subscriber() {
        let canvas = CanvasId::new();
        let notifier = ChangeNotifier::new(canvas);
        let mut rx = notifier.subscribe();
        notifier.changed();
        assert_eq!(rx.try_recv().expect("event"), CanvasEvent::Changed { canvas });
    }

    #[test]
    fn test_unsubscribe_by_drop() {
        let notifier = ChangeNotifier::new(CanvasId::new());
        let rx = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);
        drop(rx);
        assert_eq!(notifier.subscriber_count(), 0);
        notifier.changed();
    }

    #[test]
    fn test_event_json() {
        let canvas = CanvasId::new();
        let event = CanvasEvent::OpenFailed {
            canvas,
            locator: None,
        };
        let json = serde_json::to_value(&event).expect("json");
        assert_eq!(json["type"], "open_failed");
        assert_eq!(event.canvas(), canvas);
    }
}
