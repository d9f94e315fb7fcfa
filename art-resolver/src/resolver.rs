//! Background image resolution.
//!
//! A resolution turns an optional locator and an optional fallback image into
//! exactly one `(provenance, image)` pair or a failure:
//!
//! | locator | fallback | fetch   | outcome                                  |
//! |---------|----------|---------|------------------------------------------|
//! | none    | some     | -       | `Embedded(fallback bytes)`, no suspension |
//! | some    | any      | ok, same image as fallback | `Embedded(fallback bytes)` |
//! | some    | any      | ok      | `Remote(locator)` with the fetched image |
//! | some    | some     | failed  | `Embedded(fallback bytes)`, copy cached  |
//! | some    | none     | failed  | `Failed { locator }`                     |
//! | none    | none     | -       | `Failed { locator: None }`               |
//!
//! The fetch runs on a tokio task. The owner awaits [`ResolveTask::finish`] on
//! its own task, so the canvas is only ever touched by its owner. Every call to
//! [`ImageResolver::resolve`] starts a new generation; a task that finishes
//! after a newer one started yields `None` and its result is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use art_core::{BackgroundProvenance, ImageHandle};
use tokio::task::JoinHandle;
use url::Url;

use crate::cache::LocalImageCache;
use crate::codec::embedded_bytes;
use crate::config::ResolverConfig;
use crate::error::{FetchError, FetchResult};
use crate::fetcher::{ImageFetcher, MemoizingFetcher, NetworkFetcher};
use crate::locator::image_url;

/// Final outcome of one resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A background was settled on.
    Resolved {
        /// What the document records about the background.
        provenance: BackgroundProvenance,
        /// The decoded image to show.
        image: ImageHandle,
        /// Local cache copy written while falling back, if any.
        cached: Option<Url>,
    },
    /// Nothing usable came out of the resolution.
    Failed {
        /// The locator that was attempted.
        locator: Option<Url>,
        /// Human-readable cause.
        reason: String,
    },
}

impl Resolution {
    /// Whether a background was settled on.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// The provenance, when resolved.
    #[must_use]
    pub fn provenance(&self) -> Option<&BackgroundProvenance> {
        match self {
            Self::Resolved { provenance, .. } => Some(provenance),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    image: Option<ImageHandle>,
    finalized: bool,
}

/// Fallback image shared between a pending resolution and its caller.
///
/// The caller may supply (or replace) the fallback at any point before the
/// fetch completes. Once the resolution has finalized, supplies are ignored.
#[derive(Debug, Clone, Default)]
pub struct FallbackSlot {
    state: Arc<Mutex<SlotState>>,
}

impl FallbackSlot {
    fn with(image: Option<ImageHandle>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState {
                image,
                finalized: false,
            })),
        }
    }

    /// Offer a fallback image. Returns `false` if the resolution already finalized.
    pub fn supply(&self, image: ImageHandle) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.finalized {
            tracing::debug!("Ignoring fallback supplied after resolution finalized");
            return false;
        }
        state.image = Some(image);
        true
    }

    /// Whether the resolution has finalized.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finalized
    }

    /// Mark finalized and take the current fallback.
    fn finalize(&self) -> Option<ImageHandle> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.finalized = true;
        state.image.clone()
    }
}

enum TaskState {
    Ready(Resolution),
    Pending {
        locator: Url,
        fetch: JoinHandle<FetchResult<ImageHandle>>,
    },
}

/// One in-flight resolution.
pub struct ResolveTask {
    generation: u64,
    latest: Arc<AtomicU64>,
    slot: FallbackSlot,
    cache: LocalImageCache,
    state: TaskState,
}

impl std::fmt::Debug for ResolveTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveTask")
            .field("generation", &self.generation)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl ResolveTask {
    /// Generation this task belongs to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the outcome is already known without suspending.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, TaskState::Ready(_))
    }

    /// Handle for supplying a fallback while the fetch is in flight.
    #[must_use]
    pub fn fallback_slot(&self) -> FallbackSlot {
        self.slot.clone()
    }

    /// Whether a newer resolution has started since this one.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.latest.load(Ordering::SeqCst) != self.generation
    }

    /// Wait for the outcome.
    ///
    /// Returns `None` if a newer resolution started before this one finished.
    /// A ready task completes without suspending.
    pub async fn finish(self) -> Option<Resolution> {
        let (locator, fetch) = match self.state {
            TaskState::Ready(resolution) => {
                self.slot.finalize();
                return Some(resolution);
            }
            TaskState::Pending { locator, fetch } => (locator, fetch),
        };

        let fetched = match fetch.await {
            Ok(result) => result,
            Err(e) => Err(FetchError::Task(e.to_string())),
        };
        let fallback = self.slot.finalize();

        if self.latest.load(Ordering::SeqCst) != self.generation {
            tracing::debug!(
                generation = self.generation,
                %locator,
                "Discarding result of superseded resolution"
            );
            return None;
        }

        Some(settle(locator, fetched, fallback, self.cache).await)
    }
}

/// Compare a finished fetch against the fallback and pick the winner.
async fn settle(
    locator: Url,
    fetched: FetchResult<ImageHandle>,
    fallback: Option<ImageHandle>,
    cache: LocalImageCache,
) -> Resolution {
    match (fetched, fallback) {
        (Ok(image), Some(fallback)) if image.same_image(&fallback) => {
            tracing::debug!(%locator, "Fetched image is the fallback; embedding it");
            let embedded = tokio::task::spawn_blocking(move || {
                embedded_bytes(&fallback).map(|bytes| (bytes, fallback))
            })
            .await;
            match embedded {
                Ok(Ok((bytes, image))) => Resolution::Resolved {
                    provenance: BackgroundProvenance::Embedded(bytes),
                    image,
                    cached: None,
                },
                Ok(Err(e)) => failed(Some(locator), &e),
                Err(e) => failed(Some(locator), &e),
            }
        }
        (Ok(image), _) => {
            tracing::debug!(%locator, width = image.width(), height = image.height(), "Resolved remote background");
            Resolution::Resolved {
                provenance: BackgroundProvenance::Remote(locator),
                image,
                cached: None,
            }
        }
        (Err(err), Some(fallback)) => {
            tracing::warn!(%locator, error = %err, "Fetch failed; falling back to supplied image");
            let name = LocalImageCache::name_for_locator(&locator);
            let stored = tokio::task::spawn_blocking(move || {
                let cached = match cache.store_jpeg(&name, &fallback) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(name, error = %e, "Could not cache fallback image");
                        None
                    }
                };
                embedded_bytes(&fallback).map(|bytes| (bytes, fallback, cached))
            })
            .await;
            match stored {
                Ok(Ok((bytes, image, cached))) => Resolution::Resolved {
                    provenance: BackgroundProvenance::Embedded(bytes),
                    image,
                    cached,
                },
                Ok(Err(e)) => failed(Some(locator), &e),
                Err(e) => failed(Some(locator), &e),
            }
        }
        (Err(err), None) => {
            tracing::warn!(%locator, error = %err, "Fetch failed with no fallback");
            failed(Some(locator), &err)
        }
    }
}

fn failed(locator: Option<Url>, reason: &dyn std::fmt::Display) -> Resolution {
    Resolution::Failed {
        locator,
        reason: reason.to_string(),
    }
}

/// Resolver with the network fetcher and identity-preserving memo.
pub type DefaultResolver = ImageResolver<MemoizingFetcher<NetworkFetcher>>;

/// Resolves background images for one canvas.
#[derive(Debug)]
pub struct ImageResolver<F> {
    fetcher: Arc<F>,
    cache: LocalImageCache,
    generation: Arc<AtomicU64>,
}

impl<F> Clone for ImageResolver<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            cache: self.cache.clone(),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl DefaultResolver {
    /// Build the standard resolver from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ResolverConfig) -> FetchResult<Self> {
        let network = NetworkFetcher::new(config.request_timeout, &config.user_agent)?;
        Ok(Self::new(
            MemoizingFetcher::new(network),
            LocalImageCache::new(&config.cache_dir),
        ))
    }
}

impl<F: ImageFetcher> ImageResolver<F> {
    /// Create a resolver fetching through `fetcher` and caching into `cache`.
    pub fn new(fetcher: F, cache: LocalImageCache) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            cache,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The fetcher.
    #[must_use]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// The local image cache.
    #[must_use]
    pub fn cache(&self) -> &LocalImageCache {
        &self.cache
    }

    /// The most recent generation handed out.
    #[must_use]
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Make every in-flight resolution stale.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Start resolving a background.
    ///
    /// With a locator, the fetch is spawned on the current tokio runtime and
    /// must be called from within one. Without a locator, the returned task is
    /// already ready.
    pub fn resolve(&self, locator: Option<Url>, fallback: Option<ImageHandle>) -> ResolveTask {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let state = match locator {
            None => {
                let resolution = match fallback.clone() {
                    Some(image) => embed_now(image),
                    None => Resolution::Failed {
                        locator: None,
                        reason: "no locator or fallback image".to_string(),
                    },
                };
                TaskState::Ready(resolution)
            }
            Some(locator) => {
                let url = image_url(&locator, &self.cache);
                if url != locator {
                    tracing::debug!(%locator, %url, "Rewrote locator");
                }
                let fetcher = Arc::clone(&self.fetcher);
                let fetch = tokio::spawn(async move { fetcher.fetch(&url).await });
                TaskState::Pending { locator, fetch }
            }
        };

        ResolveTask {
            generation,
            latest: Arc::clone(&self.generation),
            slot: FallbackSlot::with(fallback),
            cache: self.cache.clone(),
            state,
        }
    }

    /// The non-suspending path: embed `fallback` directly.
    ///
    /// Starts a new generation like [`Self::resolve`].
    pub fn resolve_local(&self, fallback: ImageHandle) -> Resolution {
        self.generation.fetch_add(1, Ordering::SeqCst);
        embed_now(fallback)
    }
}

fn embed_now(image: ImageHandle) -> Resolution {
    match embedded_bytes(&image) {
        Ok(bytes) => Resolution::Resolved {
            provenance: BackgroundProvenance::Embedded(bytes),
            image,
            cached: None,
        },
        Err(e) => failed(None, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_image;
    use crate::codec::tests::{png_1x1, solid};
    use async_trait::async_trait;
    use futures::FutureExt;
    use tokio::sync::Notify;

    /// Fetcher that always fails.
    struct Failing;

    #[async_trait]
    impl ImageFetcher for Failing {
        async fn fetch(&self, url: &Url) -> FetchResult<ImageHandle> {
            Err(FetchError::Unsupported(url.to_string()))
        }
    }

    /// Fetcher that returns a fixed handle.
    struct Fixed(ImageHandle);

    #[async_trait]
    impl ImageFetcher for Fixed {
        async fn fetch(&self, _url: &Url) -> FetchResult<ImageHandle> {
            Ok(self.0.clone())
        }
    }

    /// Fetcher that waits for a signal before answering.
    struct Gated {
        gate: Arc<Notify>,
        image: ImageHandle,
    }

    #[async_trait]
    impl ImageFetcher for Gated {
        async fn fetch(&self, _url: &Url) -> FetchResult<ImageHandle> {
            self.gate.notified().await;
            Ok(self.image.clone())
        }
    }

    fn locator() -> Url {
        Url::parse("https://example.com/cat.png").expect("url")
    }

    fn cache_in(dir: &tempfile::TempDir) -> LocalImageCache {
        LocalImageCache::new(dir.path())
    }

    #[test]
    fn test_fast_path_never_suspends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ImageResolver::new(Failing, cache_in(&dir));
        let image = decode_image(&png_1x1()).expect("decode");

        let task = resolver.resolve(None, Some(image.clone()));
        assert!(task.is_ready());
        let resolution = task
            .finish()
            .now_or_never()
            .expect("ready without suspending")
            .expect("not superseded");

        match resolution {
            Resolution::Resolved {
                provenance: BackgroundProvenance::Embedded(bytes),
                image: resolved,
                cached,
            } => {
                assert_eq!(bytes, png_1x1());
                assert!(resolved.same_image(&image));
                assert!(cached.is_none());
            }
            other => panic!("expected embedded, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_local_embeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ImageResolver::new(Failing, cache_in(&dir));
        let resolution = resolver.resolve_local(solid(2, 2));
        assert!(matches!(
            resolution.provenance(),
            Some(BackgroundProvenance::Embedded(_))
        ));
        assert_eq!(resolver.current_generation(), 1);
    }

    #[test]
    fn test_nothing_to_resolve_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ImageResolver::new(Failing, cache_in(&dir));
        let resolution = resolver
            .resolve(None, None)
            .finish()
            .now_or_never()
            .flatten();
        assert!(matches!(
            resolution,
            Some(Resolution::Failed { locator: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_fetch_without_fallback_reports_locator() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ImageResolver::new(Failing, cache_in(&dir));

        let resolution = resolver
            .resolve(Some(locator()), None)
            .finish()
            .await
            .expect("not superseded");
        match resolution {
            Resolution::Failed { locator: l, .. } => assert_eq!(l, Some(locator())),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_with_fallback_embeds_and_caches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ImageResolver::new(Failing, cache_in(&dir));
        let fallback = solid(4, 3);

        let resolution = resolver
            .resolve(Some(locator()), Some(fallback.clone()))
            .finish()
            .await
            .expect("not superseded");
        match resolution {
            Resolution::Resolved {
                provenance: BackgroundProvenance::Embedded(bytes),
                image,
                cached,
            } => {
                assert!(image.same_image(&fallback));
                let decoded = decode_image(&bytes).expect("embedded bytes decode");
                assert_eq!((decoded.width(), decoded.height()), (4, 3));
                let cached = cached.expect("cached copy");
                let path = cached.to_file_path().expect("file url");
                assert!(path.starts_with(resolver.cache().dir()));
                assert!(path.exists());
            }
            other => panic!("expected embedded fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_identity_equal_fetch_embeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = decode_image(&png_1x1()).expect("decode");
        let resolver = ImageResolver::new(Fixed(image.clone()), cache_in(&dir));

        let resolution = resolver
            .resolve(Some(locator()), Some(image.clone()))
            .finish()
            .await
            .expect("not superseded");
        match resolution {
            Resolution::Resolved {
                provenance: BackgroundProvenance::Embedded(bytes),
                ..
            } => assert_eq!(bytes, png_1x1()),
            other => panic!("expected embedded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_equal_content_but_distinct_fetch_is_remote() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetched = decode_image(&png_1x1()).expect("decode");
        let lookalike = decode_image(&png_1x1()).expect("decode");
        let resolver = ImageResolver::new(Fixed(fetched), cache_in(&dir));

        let resolution = resolver
            .resolve(Some(locator()), Some(lookalike))
            .finish()
            .await
            .expect("not superseded");
        assert!(matches!(
            resolution.provenance(),
            Some(BackgroundProvenance::Remote(url)) if *url == locator()
        ));
    }

    #[tokio::test]
    async fn test_remote_keeps_original_locator() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ImageResolver::new(Fixed(solid(1, 1)), cache_in(&dir));
        let wrapped = Url::parse(
            "https://www.google.com/imgres?imgurl=https%3A%2F%2Fcdn.example.com%2Fcat.jpg",
        )
        .expect("url");

        let resolution = resolver
            .resolve(Some(wrapped.clone()), None)
            .finish()
            .await
            .expect("not superseded");
        assert_eq!(
            resolution.provenance(),
            Some(&BackgroundProvenance::Remote(wrapped))
        );
    }

    #[tokio::test]
    async fn test_fallback_supplied_during_fetch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gate = Arc::new(Notify::new());
        let image = solid(2, 2);
        let resolver = ImageResolver::new(
            Gated {
                gate: Arc::clone(&gate),
                image: image.clone(),
            },
            cache_in(&dir),
        );

        let task = resolver.resolve(Some(locator()), None);
        let slot = task.fallback_slot();
        assert!(slot.supply(image.clone()));
        gate.notify_one();

        let resolution = task.finish().await.expect("not superseded");
        assert!(matches!(
            resolution.provenance(),
            Some(BackgroundProvenance::Embedded(_))
        ));
        assert!(slot.is_finalized());
        assert!(!slot.supply(solid(3, 3)));
    }

    #[tokio::test]
    async fn test_superseded_result_is_discarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gate = Arc::new(Notify::new());
        let resolver = ImageResolver::new(
            Gated {
                gate: Arc::clone(&gate),
                image: solid(2, 2),
            },
            cache_in(&dir),
        );

        let stale = resolver.resolve(Some(locator()), None);
        let fresh = resolver.resolve(None, Some(solid(5, 5)));
        assert!(stale.is_superseded());
        assert!(!fresh.is_superseded());

        gate.notify_one();
        assert!(stale.finish().await.is_none());
        assert!(fresh.finish().await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_discards_in_flight() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ImageResolver::new(Fixed(solid(1, 1)), cache_in(&dir));
        let task = resolver.resolve(Some(locator()), None);
        resolver.invalidate();
        assert!(task.finish().await.is_none());
    }
}
