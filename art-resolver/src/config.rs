//! Resolver configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::DEFAULT_REQUEST_TIMEOUT;

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "EMOJIART_CACHE_DIR";

/// Environment variable overriding the request timeout, in seconds.
pub const FETCH_TIMEOUT_ENV: &str = "EMOJIART_FETCH_TIMEOUT_SECS";

/// Settings for fetching and caching background images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Root directory for the local image cache.
    pub cache_dir: PathBuf,
    /// Timeout for a single image request.
    pub request_timeout: Duration,
    /// User agent sent with HTTP requests.
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("emojiart"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: format!("emojiart/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ResolverConfig {
    /// Defaults overridden by `EMOJIART_CACHE_DIR` and `EMOJIART_FETCH_TIMEOUT_SECS`.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cache_dir = std::env::var_os(CACHE_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map_or(defaults.cache_dir, PathBuf::from);
        let request_timeout = std::env::var(FETCH_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(defaults.request_timeout, Duration::from_secs);
        Self {
            cache_dir,
            request_timeout,
            user_agent: defaults.user_agent,
        }
    }

    /// Replace the cache root.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.cache_dir.ends_with("emojiart"));
        assert!(config.user_agent.starts_with("emojiart/"));
    }

    #[test]
    fn test_with_cache_dir() {
        let config = ResolverConfig::default().with_cache_dir("/srv/images");
        assert_eq!(config.cache_dir, PathBuf::from("/srv/images"));
    }
}
