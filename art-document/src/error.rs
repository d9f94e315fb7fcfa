//! Error types for document storage and synchronization.

use std::path::PathBuf;

use art_core::{CanvasError, LifecycleState, SnapshotError};
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for synchronizer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur reading or writing persisted documents.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The attributes sidecar could not be read or written.
    #[error("Attribute error: {0}")]
    Attributes(String),

    /// A new document was requested where one is already stored.
    #[error("Document already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The location cannot hold a document.
    #[error("Invalid document location: {0}")]
    InvalidLocation(String),

    /// A blocking storage task died.
    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Errors from the document synchronizer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The operation needs an open document.
    #[error("No document is open")]
    NotOpen,

    /// A new document was requested over an existing one; nothing was changed.
    #[error("A document already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The lifecycle does not allow this step.
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },

    /// The snapshot could not be encoded; nothing was written.
    #[error(transparent)]
    Encode(#[from] SnapshotError),

    /// Persisting failed; the previously stored bytes are intact.
    #[error("Save failed: {0}")]
    Store(#[from] StoreError),

    /// A canvas edit was rejected.
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}
