//! Single-flight, coalescing document writes.
//!
//! Only one write to storage is in flight at a time. Requests that arrive while
//! a write is running queue behind it; when the queue drains, only the newest
//! bytes are written and every request they cover returns together.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StoreResult;
use crate::storage::DocumentStorage;

#[derive(Debug, Default)]
struct Pending {
    bytes: Option<Vec<u8>>,
    requested: u64,
    written: u64,
}

/// Serializes writes of one document.
#[derive(Debug)]
pub struct Persister<S> {
    storage: Arc<S>,
    location: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    pending: Mutex<Pending>,
}

impl<S: DocumentStorage> Persister<S> {
    /// Persister for the document at `location`.
    pub fn new(storage: Arc<S>, location: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            location: location.into(),
            write_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// The document location.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Number of requests that have been durably written.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .written
    }

    /// Write `bytes`, or newer bytes queued after them.
    ///
    /// Resolves once storage holds these bytes or a later version.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write covering this request failed.
    /// The previously stored bytes are left as they were.
    pub async fn persist(&self, bytes: Vec<u8>) -> StoreResult<()> {
        let ticket = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.requested += 1;
            pending.bytes = Some(bytes);
            pending.requested
        };

        let _write = self.write_lock.lock().await;

        let (bytes, covers) = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.written >= ticket {
                tracing::trace!(ticket, "Save already covered by a later write");
                return Ok(());
            }
            match pending.bytes.take() {
                Some(bytes) => (bytes, pending.requested),
                None => return Ok(()),
            }
        };

        match self.storage.write(&self.location, &bytes).await {
            Ok(()) => {
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                pending.written = pending.written.max(covers);
                tracing::debug!(
                    location = %self.location.display(),
                    covers,
                    bytes = bytes.len(),
                    "Persisted document"
                );
                Ok(())
            }
            Err(e) => {
                // Put the bytes back for the requests still waiting, unless newer ones arrived.
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                if pending.bytes.is_none() {
                    pending.bytes = Some(bytes);
                }
                tracing::warn!(location = %self.location.display(), error = %e, "Document write failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_sequential_writes() {
        let storage = Arc::new(MemoryStorage::new());
        let persister = Persister::new(Arc::clone(&storage), "doc");

        persister.persist(b"one".to_vec()).await.expect("first");
        persister.persist(b"two".to_vec()).await.expect("second");
        assert_eq!(storage.bytes(Path::new("doc")), Some(b"two".to_vec()));
        assert_eq!(storage.write_count(), 2);
        assert_eq!(persister.written(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_saves_coalesce_to_newest() {
        let storage = Arc::new(MemoryStorage::new());
        let persister = Arc::new(Persister::new(Arc::clone(&storage), "doc"));

        let saves: Vec<_> = (0..8u8)
            .map(|i| {
                let persister = Arc::clone(&persister);
                tokio::spawn(async move { persister.persist(vec![i]).await })
            })
            .collect();
        for save in saves {
            save.await.expect("join").expect("save");
        }

        assert_eq!(persister.written(), 8);
        assert!(storage.write_count() >= 1 && storage.write_count() <= 8);
        let stored = storage.bytes(Path::new("doc")).expect("stored");
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_and_retried() {
        let storage = Arc::new(MemoryStorage::new());
        let persister = Persister::new(Arc::clone(&storage), "doc");
        persister.persist(b"good".to_vec()).await.expect("save");

        storage.set_fail_writes(true);
        assert!(persister.persist(b"bad".to_vec()).await.is_err());
        assert_eq!(storage.bytes(Path::new("doc")), Some(b"good".to_vec()));

        storage.set_fail_writes(false);
        persister.persist(b"better".to_vec()).await.expect("save");
        assert_eq!(storage.bytes(Path::new("doc")), Some(b"better".to_vec()));
        assert_eq!(persister.written(), 3);
    }
}
