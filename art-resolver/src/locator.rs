//! Locator rewriting.
//!
//! Dropped or pasted URLs are often not the image itself: search engines and
//! proxies wrap the real location in a redirector URL. Before fetching, a
//! locator is rewritten:
//!
//! 1. a file inside a local image cache is mapped onto the current cache;
//! 2. otherwise an `imgurl` query parameter holding an absolute URL wins;
//! 3. otherwise the locator is used as is.

use url::Url;

use crate::cache::LocalImageCache;

/// Query parameter that carries the real image location.
pub const IMAGE_URL_PARAM: &str = "imgurl";

/// The URL to actually fetch for `locator`.
#[must_use]
pub fn image_url(locator: &Url, cache: &LocalImageCache) -> Url {
    if let Some(cached) = cache.relocate(locator) {
        return cached;
    }
    locator
        .query_pairs()
        .find(|(key, _)| key == IMAGE_URL_PARAM)
        .and_then(|(_, value)| Url::parse(&value).ok())
        .unwrap_or_else(|| locator.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> LocalImageCache {
        LocalImageCache::new("/var/cache/app")
    }

    #[test]
    fn test_cache_locator_used_verbatim() {
        let url = Url::parse("file:///var/cache/app/emojiart-images/dog.jpg").expect("url");
        assert_eq!(image_url(&url, &cache()), url);
    }

    #[test]
    fn test_embedded_image_url_extracted() {
        let url = Url::parse(
            "https://www.google.com/imgres?imgurl=https%3A%2F%2Fcdn.example.com%2Fcat.jpg%3Fw%3D800&imgrefurl=https%3A%2F%2Fexample.com",
        )
        .expect("url");
        assert_eq!(
            image_url(&url, &cache()).as_str(),
            "https://cdn.example.com/cat.jpg?w=800"
        );
    }

    #[test]
    fn test_relative_imgurl_ignored() {
        let url = Url::parse("https://proxy.example.com/view?imgurl=cat.jpg").expect("url");
        assert_eq!(image_url(&url, &cache()), url);
    }

    #[test]
    fn test_plain_locator_unchanged() {
        let url = Url::parse("https://example.com/pictures/cat.png?size=2").expect("url");
        assert_eq!(image_url(&url, &cache()), url);
    }
}
