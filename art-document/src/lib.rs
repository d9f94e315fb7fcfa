//! # Emoji Art Documents
//!
//! Opening, editing, saving and closing emoji art documents.
//!
//! ```text
//! canvas change ──► pump_events ──► dirty (Editing)
//!                                      │
//!                                   save() ──► snapshot ──► encode ──► Persister ──► storage
//!                                                                     (one write in flight)
//! ```
//!
//! [`DocumentSynchronizer`] owns the canvas for the lifetime of the open
//! document. [`FileStorage`] writes atomically via a temp file and rename and
//! keeps document attributes (the thumbnail) in a JSON sidecar.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod persister;
pub mod storage;
pub mod synchronizer;

pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use persister::Persister;
pub use storage::{DocumentInfo, DocumentStorage, FileStorage, MemoryStorage, THUMBNAIL_KEY};
pub use synchronizer::{
    BackgroundChange, BackgroundThumbnailer, DocumentSynchronizer, FailureNotice, OpenOutcome,
    SaveOutcome, SyncConfig, Thumbnailer,
};
