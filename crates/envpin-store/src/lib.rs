//! Lock store and storage backends for envpin.
//!
//! This crate provides the persistence layer: the `StorageBackend` trait with a
//! durable filesystem implementation (`FsBackend`, atomic writes serialized per
//! key) and an in-memory one (`MemoryBackend`), the `StoreLayout` directory
//! structure with its format version marker, and the `LockStore` that maps a
//! manifest content hash to its resolved environment.

pub mod backend;
pub mod integrity;
pub mod layout;
pub mod lock_store;

pub use backend::{FsBackend, MemoryBackend, PutOutcome, StorageBackend};
pub use integrity::{IntegrityFailure, IntegrityReport};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use lock_store::{LockEntry, LockStore, LOCK_ENTRY_VERSION};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename survives a crash until the parent
/// directory itself has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for entry '{hash}': expected {expected}, got {actual}")]
    IntegrityFailure {
        hash: String,
        expected: String,
        actual: String,
    },
    #[error("lock conflict for manifest {hash}: stored content {existing} differs from new content {proposed}")]
    LockConflict {
        hash: String,
        existing: String,
        proposed: String,
    },
    #[error("entry for manifest {key} carries environment for {found}")]
    KeyMismatch { key: String, found: String },
    #[error("invalid store key: '{0}'")]
    InvalidKey(String),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
