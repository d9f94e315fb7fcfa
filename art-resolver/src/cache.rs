//! Local image cache.
//!
//! A process-wide directory of JPEG copies keyed by name. Writes go through a
//! temp file and an atomic rename, so storing the same name twice simply
//! replaces the earlier copy.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use art_core::ImageHandle;
use url::Url;

use crate::codec::encode_jpeg;
use crate::error::ImageError;

/// Name of the cache directory under the configured root.
pub const CACHE_DIR_NAME: &str = "emojiart-images";

/// Longest file stem derived from a locator.
const MAX_NAME_LEN: usize = 120;

/// Directory of locally stored images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImageCache {
    dir: PathBuf,
}

impl LocalImageCache {
    /// Cache rooted at `root`; images live in `root/emojiart-images`.
    ///
    /// The directory is created lazily on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            dir: root.join(CACHE_DIR_NAME),
        }
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where an image called `name` is stored.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        let mut file = sanitize_name(name);
        if !Path::new(&file)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg"))
        {
            file.push_str(".jpg");
        }
        self.dir.join(file)
    }

    /// File URL of the image called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidPath`] if the path cannot be a file URL.
    pub fn url_for(&self, name: &str) -> Result<Url, ImageError> {
        file_url(&self.path_for(name))
    }

    /// Map a file URL that points into *a* cache directory onto this cache.
    ///
    /// Cached copies are referenced by absolute path, and the root can move
    /// between runs; any file whose parent directory is named like the cache is
    /// looked up here by file name instead. Returns `None` for anything else.
    #[must_use]
    pub fn relocate(&self, locator: &Url) -> Option<Url> {
        if locator.scheme() != "file" {
            return None;
        }
        let path = locator.to_file_path().ok()?;
        if path.parent()?.file_name()? != CACHE_DIR_NAME {
            return None;
        }
        let name = path.file_name()?.to_str()?;
        self.url_for(name).ok()
    }

    /// Store `image` as a JPEG under `name`, replacing any earlier copy.
    ///
    /// Blocking; call from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or any filesystem step fails.
    pub fn store_jpeg(&self, name: &str, image: &ImageHandle) -> Result<Url, ImageError> {
        fs::create_dir_all(&self.dir)?;
        let bytes = encode_jpeg(image)?;
        let path = self.path_for(name);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| ImageError::Io(e.error))?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Stored image in local cache");
        file_url(&path)
    }

    /// Deterministic cache name for images fetched from `locator`.
    #[must_use]
    pub fn name_for_locator(locator: &Url) -> String {
        let raw = format!(
            "{}{}",
            locator.host_str().unwrap_or(locator.scheme()),
            locator.path()
        );
        sanitize_name(&raw).chars().take(MAX_NAME_LEN).collect()
    }
}

fn file_url(path: &Path) -> Result<Url, ImageError> {
    Url::from_file_path(path).map_err(|()| ImageError::InvalidPath(path.display().to_string()))
}

/// Sanitize a name for use as a file name.
///
/// Replaces any character that is not alphanumeric, `-`, `_` or `.` with `_`.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
