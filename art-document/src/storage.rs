//! Persisted document storage.
//!
//! A document is an opaque byte blob at a location, plus an optional map of
//! named attributes (the thumbnail lives there). [`FileStorage`] keeps the
//! attributes in a `<document>.attributes.json` sidecar; [`MemoryStorage`]
//! keeps everything in process.
//!
//! Writes are atomic: the stored bytes are either fully replaced or left
//! untouched.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Attribute key for the document thumbnail.
pub const THUMBNAIL_KEY: &str = "thumbnail";

/// Suffix appended to a document file name for its attributes sidecar.
pub const ATTRIBUTES_SUFFIX: &str = ".attributes.json";

/// Facts about a stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Size of the stored bytes.
    pub size_bytes: u64,
    /// Last modification time, when the backend knows it.
    pub modified: Option<SystemTime>,
    /// Whether a thumbnail attribute is attached.
    pub has_thumbnail: bool,
}

/// Where documents are read from and written to.
#[async_trait]
pub trait DocumentStorage: Send + Sync + 'static {
    /// Read the document bytes. `Ok(None)` means nothing is stored there.
    async fn read(&self, location: &Path) -> StoreResult<Option<Vec<u8>>>;

    /// Atomically replace the document bytes.
    async fn write(&self, location: &Path, bytes: &[u8]) -> StoreResult<()>;

    /// Create an empty document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if something is already stored at
    /// `location`; the stored bytes are left alone.
    async fn create_empty(&self, location: &Path) -> StoreResult<()> {
        if self.read(location).await?.is_some() {
            return Err(StoreError::AlreadyExists(location.to_path_buf()));
        }
        self.write(location, &[]).await
    }

    /// Attach a named attribute to the document.
    async fn write_attribute(&self, location: &Path, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Read a named attribute.
    async fn read_attribute(&self, location: &Path, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Describe the stored document.
    async fn info(&self, location: &Path) -> StoreResult<DocumentInfo>;
}

/// Attributes sidecar contents: key to base64 value.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct AttributeFile(BTreeMap<String, String>);

impl AttributeFile {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.0
            .get(key)
            .map(|encoded| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| StoreError::Attributes(format!("{key}: {e}")))
            })
            .transpose()
    }

    fn set(&mut self, key: &str, value: &[u8]) {
        self.0.insert(
            key.to_string(),
            base64::engine::general_purpose::STANDARD.encode(value),
        );
    }
}

/// Documents stored as files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStorage;

impl FileStorage {
    /// Create file storage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Path of the attributes sidecar for `location`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLocation`] if `location` has no file name.
    pub fn attributes_path(location: &Path) -> StoreResult<PathBuf> {
        let name = location
            .file_name()
            .ok_or_else(|| StoreError::InvalidLocation(location.display().to_string()))?;
        let mut sidecar = name.to_os_string();
        sidecar.push(ATTRIBUTES_SUFFIX);
        Ok(location.with_file_name(sidecar))
    }

    fn read_attributes(location: &Path) -> StoreResult<AttributeFile> {
        let path = Self::attributes_path(location)?;
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Attributes(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AttributeFile::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `bytes` to `path` through a temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

#[async_trait]
impl DocumentStorage for FileStorage {
    async fn read(&self, location: &Path) -> StoreResult<Option<Vec<u8>>> {
        match tokio::fs::read(location).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, location: &Path, bytes: &[u8]) -> StoreResult<()> {
        let path = location.to_path_buf();
        let bytes = bytes.to_vec();
        let len = bytes.len();
        blocking(move || write_atomic(&path, &bytes)).await?;
        tracing::debug!(location = %location.display(), bytes = len, "Document written");
        Ok(())
    }

    async fn create_empty(&self, location: &Path) -> StoreResult<()> {
        let path = location.to_path_buf();
        blocking(move || {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.clone()),
                    _ => StoreError::Io(e),
                })?;
            file.sync_all()?;
            Ok(())
        })
        .await?;
        tracing::debug!(location = %location.display(), "Empty document created");
        Ok(())
    }

    async fn write_attribute(&self, location: &Path, key: &str, value: &[u8]) -> StoreResult<()> {
        let location = location.to_path_buf();
        let key = key.to_string();
        let value = value.to_vec();
        blocking(move || {
            let mut attributes = Self::read_attributes(&location)?;
            attributes.set(&key, &value);
            let json = serde_json::to_vec_pretty(&attributes)
                .map_err(|e| StoreError::Attributes(e.to_string()))?;
            write_atomic(&Self::attributes_path(&location)?, &json)
        })
        .await
    }

    async fn read_attribute(&self, location: &Path, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let location = location.to_path_buf();
        let key = key.to_string();
        blocking(move || Self::read_attributes(&location)?.get(&key)).await
    }

    async fn info(&self, location: &Path) -> StoreResult<DocumentInfo> {
        let metadata = tokio::fs::metadata(location).await?;
        let has_thumbnail = self.read_attribute(location, THUMBNAIL_KEY).await?.is_some();
        Ok(DocumentInfo {
            size_bytes: metadata.len(),
            modified: metadata.modified().ok(),
            has_thumbnail,
        })
    }
}

#[derive(Debug, Default)]
struct MemoryEntry {
    bytes: Vec<u8>,
    attributes: HashMap<String, Vec<u8>>,
    modified: Option<SystemTime>,
}

/// In-process storage, mainly for embedding and tests.
///
/// Writes can be made to fail on demand to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<PathBuf, MemoryEntry>>,
    fail_writes: Mutex<bool>,
    writes: Mutex<u64>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Number of successful document writes.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current bytes at `location`, if any.
    #[must_use]
    pub fn bytes(&self, location: &Path) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .map(|entry| entry.bytes.clone())
    }

    /// Seed `location` with `bytes`.
    pub fn insert(&self, location: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(location.into())
            .or_default()
            .bytes = bytes;
    }

    fn check_writable(&self) -> StoreResult<()> {
        if *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StoreError::Io(std::io::Error::other("write refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStorage for MemoryStorage {
    async fn read(&self, location: &Path) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.bytes(location))
    }

    async fn write(&self, location: &Path, bytes: &[u8]) -> StoreResult<()> {
        self.check_writable()?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(location.to_path_buf()).or_default();
        entry.bytes = bytes.to_vec();
        entry.modified = Some(SystemTime::now());
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }

    async fn write_attribute(&self, location: &Path, key: &str, value: &[u8]) -> StoreResult<()> {
        self.check_writable()?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(location.to_path_buf())
            .or_default()
            .attributes
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn read_attribute(&self, location: &Path, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .and_then(|entry| entry.attributes.get(key).cloned()))
    }

    async fn info(&self, location: &Path) -> StoreResult<DocumentInfo> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(location).ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                location.display().to_string(),
            ))
        })?;
        Ok(DocumentInfo {
            size_bytes: entry.bytes.len() as u64,
            modified: entry.modified,
            has_thumbnail: entry.attributes.contains_key(THUMBNAIL_KEY),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_path() {
        assert_eq!(
            FileStorage::attributes_path(Path::new("/docs/cat.emojiart")).expect("path"),
            PathBuf::from("/docs/cat.emojiart.attributes.json")
        );
        assert!(FileStorage::attributes_path(Path::new("/")).is_err());
    }

    #[tokio::test]
    async fn test_file_read_missing_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new();
        let bytes = storage
            .read(&dir.path().join("absent.json"))
            .await
            .expect("read");
        assert!(bytes.is_none());
    }

    #[tokio::test]
    async fn test_file_write_replaces_atomically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let location = dir.path().join("doc.json");
        let storage = FileStorage::new();

        storage.write(&location, b"first").await.expect("write");
        storage.write(&location, b"second").await.expect("write");
        assert_eq!(
            storage.read(&location).await.expect("read"),
            Some(b"second".to_vec())
        );

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .collect();
        assert_eq!(leftovers.len(), 1, "temp files must not linger");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_previous_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let location = dir.path().join("doc.json");
        let storage = FileStorage::new();
        storage.write(&location, b"good").await.expect("write");

        let bad = dir.path().join("missing-dir").join("doc.json");
        assert!(storage.write(&bad, b"lost").await.is_err());
        assert_eq!(std::fs::read(&location).expect("read"), b"good");
    }

    #[tokio::test]
    async fn test_file_attributes_and_info() {
        let dir = tempfile::tempdir().expect("tempdir");
        let location = dir.path().join("doc.json");
        let storage = FileStorage::new();
        storage.create_empty(&location).await.expect("create");

        let info = storage.info(&location).await.expect("info");
        assert_eq!(info.size_bytes, 0);
        assert!(!info.has_thumbnail);

        storage
            .write_attribute(&location, THUMBNAIL_KEY, &[1, 2, 3])
            .await
            .expect("attribute");
        storage
            .write_attribute(&location, "author", b"someone")
            .await
            .expect("attribute");
        assert_eq!(
            storage
                .read_attribute(&location, THUMBNAIL_KEY)
                .await
                .expect("read"),
            Some(vec![1, 2, 3])
        );
        assert!(storage.info(&location).await.expect("info").has_thumbnail);

        let sidecar = std::fs::read_to_string(dir.path().join("doc.json.attributes.json"))
            .expect("sidecar");
        assert!(sidecar.contains("\"thumbnail\": \"AQID\""));
    }

    #[tokio::test]
    async fn test_create_empty_refuses_existing_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let location = dir.path().join("doc.json");
        let storage = FileStorage::new();
        storage.write(&location, b"work").await.expect("write");

        let err = storage
            .create_empty(&location)
            .await
            .expect_err("existing document");
        assert!(matches!(err, StoreError::AlreadyExists(ref path) if *path == location));
        assert_eq!(std::fs::read(&location).expect("read"), b"work");

        let memory = MemoryStorage::new();
        memory.insert("mem/doc", b"work".to_vec());
        assert!(matches!(
            memory.create_empty(Path::new("mem/doc")).await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(memory.bytes(Path::new("mem/doc")), Some(b"work".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_storage_failures() {
        let storage = MemoryStorage::new();
        let location = Path::new("mem/doc");
        storage.write(location, b"one").await.expect("write");

        storage.set_fail_writes(true);
        assert!(storage.write(location, b"two").await.is_err());
        assert_eq!(storage.bytes(location), Some(b"one".to_vec()));
        assert_eq!(storage.write_count(), 1);
    }
}
