use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was absent and the value is now stored.
    Written,
    /// The key already held a value; nothing was written.
    Existing(Vec<u8>),
}

/// Durable key-value persistence underneath the lock store.
///
/// `put_if_absent` must be atomic with respect to other writers of the same
/// key: a reader never observes a partially written value, and two writers
/// racing on one key are serialized so exactly one of them writes.
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<PutOutcome, StoreError>;

    /// Remove a key. Returns whether anything was removed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// All stored keys, sorted.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Keys are restricted to lowercase hex and `-` so they are always safe file names.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty()
        || key.len() > 128
        || !key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b) || b == b'-')
    {
        return Err(StoreError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

/// Filesystem backend: one `<key>.json` file per entry.
///
/// Writes go through a temp file that is fsynced and renamed into place.
/// Writers of the same key are serialized by an exclusive lock on
/// `<key>.lock`, which also works across processes.
pub struct FsBackend {
    layout: StoreLayout,
}

struct KeyLock {
    file: File,
}

impl KeyLock {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()
            .map_err(|e| StoreError::LockFailed(format!("{}: {e}", path.display())))?;
        Ok(Self { file })
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl FsBackend {
    /// Open the backend, initializing the layout if needed.
    pub fn open(layout: StoreLayout) -> Result<Self, StoreError> {
        layout.initialize()?;
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }
}

impl StorageBackend for FsBackend {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        match fs::read(self.layout.entry_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<PutOutcome, StoreError> {
        validate_key(key)?;
        let _guard = KeyLock::acquire(&self.layout.entry_lock_path(key))?;

        let dest = self.layout.entry_path(key);
        if dest.exists() {
            debug!("entry {key} already present, skipping write");
            return Ok(PutOutcome::Existing(fs::read(&dest)?));
        }

        let dir = self.layout.locks_dir();
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(value)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        Ok(PutOutcome::Written)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        // The lock file is left in place: unlinking it would let a later writer
        // lock a fresh inode while an earlier one still holds the old.
        let _guard = KeyLock::acquire(&self.layout.entry_lock_path(key))?;
        let path = self.layout.entry_path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        fsync_dir(&self.layout.locks_dir())?;
        Ok(true)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.layout.locks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(key) = name.strip_suffix(".json") {
                    if !key.starts_with('.') {
                        keys.push(key.to_owned());
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Process-local backend, for tests and embedding.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, StoreError> {
        self.entries
            .lock()
            .map_err(|e| StoreError::LockFailed(format!("mutex poisoned: {e}")))
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        Ok(self.entries()?.get(key).cloned())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<PutOutcome, StoreError> {
        validate_key(key)?;
        let mut entries = self.entries()?;
        if let Some(existing) = entries.get(key) {
            return Ok(PutOutcome::Existing(existing.clone()));
        }
        entries.insert(key.to_owned(), value.to_vec());
        Ok(PutOutcome::Written)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.entries()?.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn fs_backend() -> (tempfile::TempDir, FsBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(StoreLayout::new(dir.path())).unwrap();
        (dir, backend)
    }

    fn exercise(backend: &dyn StorageBackend) {
        assert_eq!(backend.read("abc").unwrap(), None);
        assert_eq!(backend.put_if_absent("abc", b"one").unwrap(), PutOutcome::Written);
        assert_eq!(backend.read("abc").unwrap().as_deref(), Some(&b"one"[..]));
        assert_eq!(
            backend.put_if_absent("abc", b"two").unwrap(),
            PutOutcome::Existing(b"one".to_vec())
        );
        assert_eq!(backend.read("abc").unwrap().as_deref(), Some(&b"one"[..]));

        backend.put_if_absent("0f", b"x").unwrap();
        assert_eq!(backend.keys().unwrap(), vec!["0f", "abc"]);

        assert!(backend.remove("abc").unwrap());
        assert!(!backend.remove("abc").unwrap());
        assert_eq!(backend.keys().unwrap(), vec!["0f"]);
    }

    #[test]
    fn fs_backend_contract() {
        let (_dir, backend) = fs_backend();
        exercise(&backend);
    }

    #[test]
    fn memory_backend_contract() {
        exercise(&MemoryBackend::new());
    }

    #[test]
    fn rejects_path_like_keys() {
        let (_dir, backend) = fs_backend();
        for bad in ["", "../x", "ABC", "a/b", "entry.json"] {
            assert!(
                matches!(backend.read(bad), Err(StoreError::InvalidKey(_))),
                "key {bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn keys_ignore_lock_and_temp_files() {
        let (_dir, backend) = fs_backend();
        backend.put_if_absent("abc", b"one").unwrap();
        fs::write(backend.layout().locks_dir().join(".tmpXYZ"), b"partial").unwrap();
        assert_eq!(backend.keys().unwrap(), vec!["abc"]);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = FsBackend::open(StoreLayout::new(dir.path())).unwrap();
            backend.put_if_absent("abc", b"durable").unwrap();
        }
        let backend = FsBackend::open(StoreLayout::new(dir.path())).unwrap();
        assert_eq!(backend.read("abc").unwrap().as_deref(), Some(&b"durable"[..]));
    }

    #[test]
    fn concurrent_writers_of_one_key_write_once() {
        let (_dir, backend) = fs_backend();
        let backend = Arc::new(backend);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let backend = Arc::clone(&backend);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    backend.put_if_absent("abc", &[i]).unwrap()
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let written = outcomes
            .iter()
            .filter(|o| **o == PutOutcome::Written)
            .count();
        assert_eq!(written, 1, "exactly one writer must win");

        let stored = backend.read("abc").unwrap().unwrap();
        for outcome in outcomes {
            if let PutOutcome::Existing(seen) = outcome {
                assert_eq!(seen, stored);
            }
        }
    }
}
