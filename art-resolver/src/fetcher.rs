//! Fetching image bytes for a locator.
//!
//! [`ImageFetcher`] is the seam the resolver fetches through. [`NetworkFetcher`]
//! handles `http`/`https` with reqwest, `file` from disk and base64 `data:` URIs.
//! [`MemoizingFetcher`] hands back the same decoded handle for repeat fetches of
//! a URL, remembering a bounded number of recent images.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use art_core::ImageHandle;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::codec::{decode_data_uri, decode_image, ImageFormat};
use crate::error::{FetchError, FetchResult};

/// Default timeout for a single image request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Something that can turn a locator into a decoded image.
#[async_trait]
pub trait ImageFetcher: Send + Sync + 'static {
    /// Fetch and decode the image at `url`.
    async fn fetch(&self, url: &Url) -> FetchResult<ImageHandle>;
}

#[async_trait]
impl<T: ImageFetcher + ?Sized> ImageFetcher for Arc<T> {
    async fn fetch(&self, url: &Url) -> FetchResult<ImageHandle> {
        (**self).fetch(url).await
    }
}

/// Fetcher for network, file and data locators.
#[derive(Debug, Clone)]
pub struct NetworkFetcher {
    client: Client,
}

impl NetworkFetcher {
    /// Create a fetcher with the given request timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration, user_agent: &str) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Create a fetcher around an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_http(&self, url: &Url) -> FetchResult<Vec<u8>> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.clone(),
            });
        }
        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if ImageFormat::from_mime(content_type) == ImageFormat::Unknown {
                tracing::debug!(%url, content_type, "Response is not labelled as an image");
            }
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ImageFetcher for NetworkFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<ImageHandle> {
        tracing::debug!(%url, "Fetching image");
        let bytes = match url.scheme() {
            "http" | "https" => self.fetch_http(url).await?,
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| FetchError::Unsupported(url.to_string()))?;
                tokio::fs::read(path).await?
            }
            "data" => {
                let uri = url.to_string();
                return tokio::task::spawn_blocking(move || decode_data_uri(&uri))
                    .await
                    .map_err(|e| FetchError::Task(e.to_string()))?
                    .map_err(FetchError::from);
            }
            other => return Err(FetchError::Unsupported(format!("scheme {other}"))),
        };

        tokio::task::spawn_blocking(move || decode_image(&bytes))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))?
            .map_err(FetchError::from)
    }
}

/// Default number of images a [`MemoizingFetcher`] keeps.
pub const DEFAULT_MEMO_ENTRIES: usize = 16;

#[derive(Debug)]
struct MemoEntry {
    image: ImageHandle,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Memo {
    entries: HashMap<Url, MemoEntry>,
    clock: u64,
}

impl Memo {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, url: &Url) -> Option<ImageHandle> {
        let now = self.tick();
        let entry = self.entries.get_mut(url)?;
        entry.last_used = now;
        Some(entry.image.clone())
    }

    /// Insert unless present; returns the handle now stored for `url`.
    fn insert(
        &mut self,
        url: Url,
        image: ImageHandle,
        max_entries: usize,
        replace: bool,
    ) -> ImageHandle {
        let now = self.tick();
        if let Some(entry) = self.entries.get_mut(&url) {
            if replace {
                entry.image = image;
            }
            entry.last_used = now;
            return entry.image.clone();
        }
        while self.entries.len() >= max_entries {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(url, _)| url.clone())
            else {
                break;
            };
            tracing::trace!(url = %oldest, "Evicting memoized image");
            self.entries.remove(&oldest);
        }
        self.entries.insert(
            url,
            MemoEntry {
                image: image.clone(),
                last_used: now,
            },
        );
        image
    }
}

/// Remembers decoded images per URL.
///
/// A second fetch of the same URL returns a clone of the first handle, so a
/// caller that shows a cached image as a fallback and then resolves the same
/// URL gets an identity match. At most `max_entries` images are kept; the least
/// recently used one is evicted first.
#[derive(Debug)]
pub struct MemoizingFetcher<F> {
    inner: F,
    max_entries: usize,
    memo: Mutex<Memo>,
}

impl<F> MemoizingFetcher<F> {
    /// Wrap `inner`, keeping up to [`DEFAULT_MEMO_ENTRIES`] images.
    #[must_use]
    pub fn new(inner: F) -> Self {
        Self::with_capacity(inner, DEFAULT_MEMO_ENTRIES)
    }

    /// Wrap `inner`, keeping up to `max_entries` images (at least one).
    #[must_use]
    pub fn with_capacity(inner: F, max_entries: usize) -> Self {
        Self {
            inner,
            max_entries: max_entries.max(1),
            memo: Mutex::new(Memo::default()),
        }
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, Memo> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A previously fetched image for `url`, if still remembered.
    #[must_use]
    pub fn cached(&self, url: &Url) -> Option<ImageHandle> {
        self.memo().get(url)
    }

    /// Seed the memo with an image already on hand.
    pub fn prime(&self, url: Url, image: ImageHandle) {
        self.memo().insert(url, image, self.max_entries, true);
    }

    /// Number of remembered images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memo().entries.len()
    }

    /// Whether nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every remembered image.
    pub fn clear(&self) {
        self.memo().entries.clear();
    }
}

#[async_trait]
impl<F: ImageFetcher> ImageFetcher for MemoizingFetcher<F> {
    async fn fetch(&self, url: &Url) -> FetchResult<ImageHandle> {
        if let Some(image) = self.cached(url) {
            tracing::trace!(%url, "Memoized image hit");
            return Ok(image);
        }
        let image = self.inner.fetch(url).await?;
        // Keep whichever handle landed first so every caller sees one identity.
        Ok(self.memo().insert(url.clone(), image, self.max_entries, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{png_1x1, PNG_1X1_BASE64};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> NetworkFetcher {
        NetworkFetcher::new(Duration::from_secs(5), "emojiart-test").expect("client")
    }

    #[tokio::test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "wiremock/reqwest system-configuration issue on macOS"
    )]
    async fn test_http_fetch_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(png_1x1()),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/cat.png", server.uri())).expect("url");
        let image = fetcher().fetch(&url).await.expect("fetch");
        assert_eq!((image.width(), image.height()), (1, 1));
    }

    #[tokio::test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "wiremock/reqwest system-configuration issue on macOS"
    )]
    async fn test_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing.png", server.uri())).expect("url");
        let err = fetcher().fetch(&url).await.expect_err("should fail");
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "wiremock/reqwest system-configuration issue on macOS"
    )]
    async fn test_http_non_image_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/page", server.uri())).expect("url");
        let err = fetcher().fetch(&url).await.expect_err("should fail");
        assert!(matches!(err, FetchError::Image(_)));
    }

    #[tokio::test]
    async fn test_file_and_data_fetch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("dot.png");
        std::fs::write(&file, png_1x1()).expect("write");

        let url = Url::from_file_path(&file).expect("file url");
        assert_eq!(fetcher().fetch(&url).await.expect("file").width(), 1);

        let data = Url::parse(&format!("data:image/png;base64,{PNG_1X1_BASE64}")).expect("url");
        assert_eq!(fetcher().fetch(&data).await.expect("data").width(), 1);

        let missing = Url::from_file_path(dir.path().join("nope.png")).expect("file url");
        assert!(matches!(
            fetcher().fetch(&missing).await,
            Err(FetchError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let url = Url::parse("ftp://example.com/a.png").expect("url");
        assert!(matches!(
            fetcher().fetch(&url).await,
            Err(FetchError::Unsupported(_))
        ));
    }

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageFetcher for CountingFetcher {
        async fn fetch(&self, _url: &Url) -> FetchResult<ImageHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            decode_image(&png_1x1()).map_err(FetchError::from)
        }
    }

    #[tokio::test]
    async fn test_memoizing_fetcher_preserves_identity() {
        let memo = MemoizingFetcher::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let url = Url::parse("https://example.com/a.png").expect("url");

        let first = memo.fetch(&url).await.expect("first");
        let second = memo.fetch(&url).await.expect("second");
        assert!(first.same_image(&second));
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 1);

        let other = Url::parse("https://example.com/b.png").expect("url");
        let primed = decode_image(&png_1x1()).expect("decode");
        memo.prime(other.clone(), primed.clone());
        assert!(memo.fetch(&other).await.expect("primed").same_image(&primed));
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memoizing_fetcher_evicts_least_recently_used() {
        let memo = MemoizingFetcher::with_capacity(
            CountingFetcher {
                calls: AtomicUsize::new(0),
            },
            2,
        );
        let a = Url::parse("https://example.com/a.png").expect("url");
        let b = Url::parse("https://example.com/b.png").expect("url");
        let c = Url::parse("https://example.com/c.png").expect("url");

        let first_a = memo.fetch(&a).await.expect("a");
        memo.fetch(&b).await.expect("b");
        // Touch `a` so `b` is the oldest.
        assert!(memo.fetch(&a).await.expect("a").same_image(&first_a));
        memo.fetch(&c).await.expect("c");

        assert_eq!(memo.len(), 2);
        assert!(memo.cached(&a).is_some());
        assert!(memo.cached(&b).is_none());
        assert!(memo.cached(&c).is_some());
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 3);

        memo.fetch(&b).await.expect("b again");
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 4);
        assert_eq!(memo.len(), 2);

        memo.clear();
        assert!(memo.is_empty());
    }
}
