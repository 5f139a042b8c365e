use crate::backend::{validate_key, FsBackend, MemoryBackend, PutOutcome, StorageBackend};
use crate::integrity::{IntegrityFailure, IntegrityReport};
use crate::layout::StoreLayout;
use crate::StoreError;
use envpin_schema::{ContentHash, ResolvedEnvironment};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const LOCK_ENTRY_VERSION: u32 = 1;

/// Persisted record pinning a manifest hash to its resolved environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockEntry {
    pub entry_version: u32,
    pub manifest_hash: ContentHash,
    pub environment: ResolvedEnvironment,
    /// blake3 checksum over the entry with this field unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl LockEntry {
    fn new(environment: ResolvedEnvironment) -> Self {
        Self {
            entry_version: LOCK_ENTRY_VERSION,
            manifest_hash: environment.manifest_hash.clone(),
            environment,
            checksum: None,
        }
    }

    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let mut sealed = self.clone();
        sealed.checksum = Some(sealed.compute_checksum()?);
        Ok(serde_json::to_vec_pretty(&sealed)?)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<Self, StoreError> {
        let entry: LockEntry = serde_json::from_slice(bytes)?;

        let Some(expected) = entry.checksum.as_deref() else {
            return Err(StoreError::IntegrityFailure {
                hash: key.to_owned(),
                expected: "checksum".to_owned(),
                actual: "none".to_owned(),
            });
        };
        let actual = entry.compute_checksum()?;
        if actual != expected {
            return Err(StoreError::IntegrityFailure {
                hash: key.to_owned(),
                expected: expected.to_owned(),
                actual,
            });
        }

        if entry.manifest_hash != key || entry.environment.manifest_hash != key {
            return Err(StoreError::KeyMismatch {
                key: key.to_owned(),
                found: entry.environment.manifest_hash.to_string(),
            });
        }
        Ok(entry)
    }
}

/// Maps manifest content hashes to resolved environments.
///
/// Entries are write-once. Writing a semantically identical environment for
/// an existing hash is a no-op; writing a different one is a
/// [`StoreError::LockConflict`].
pub struct LockStore {
    backend: Box<dyn StorageBackend>,
}

impl LockStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        debug!("lock store using {} backend", backend.name());
        Self { backend }
    }

    /// Open (and initialize if needed) the filesystem store under `layout`.
    pub fn open(layout: StoreLayout) -> Result<Self, StoreError> {
        Ok(Self::new(Box::new(FsBackend::open(layout)?)))
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    pub fn get(&self, hash: &ContentHash) -> Result<Option<ResolvedEnvironment>, StoreError> {
        Ok(self.get_entry(hash)?.map(|e| e.environment))
    }

    pub fn get_entry(&self, hash: &ContentHash) -> Result<Option<LockEntry>, StoreError> {
        match self.backend.read(hash)? {
            Some(bytes) => Ok(Some(LockEntry::decode(hash, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist `environment` under `hash` and return the environment that is
    /// now stored.
    ///
    /// When a semantically identical entry already exists (for example written
    /// by a concurrent resolver), that stored entry is returned unchanged.
    pub fn put(
        &self,
        hash: &ContentHash,
        environment: &ResolvedEnvironment,
    ) -> Result<ResolvedEnvironment, StoreError> {
        validate_key(hash)?;
        if environment.manifest_hash != *hash {
            return Err(StoreError::KeyMismatch {
                key: hash.to_string(),
                found: environment.manifest_hash.to_string(),
            });
        }

        let bytes = LockEntry::new(environment.clone()).encode()?;
        match self.backend.put_if_absent(hash, &bytes)? {
            PutOutcome::Written => {
                debug!("lock entry {} written", hash.short());
                Ok(environment.clone())
            }
            PutOutcome::Existing(existing) => {
                let stored = LockEntry::decode(hash, &existing)?.environment;
                if stored.is_semantically_equal(environment) {
                    debug!("lock entry {} already present with identical content", hash.short());
                    Ok(stored)
                } else {
                    Err(StoreError::LockConflict {
                        hash: hash.to_string(),
                        existing: stored.content_digest()?,
                        proposed: environment.content_digest()?,
                    })
                }
            }
        }
    }

    /// Evict an entry. Returns whether it existed.
    pub fn remove(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        self.backend.remove(hash)
    }

    pub fn hashes(&self) -> Result<Vec<ContentHash>, StoreError> {
        Ok(self
            .backend
            .keys()?
            .into_iter()
            .map(ContentHash::new)
            .collect())
    }

    /// All readable entries, sorted by hash. Corrupt entries are skipped with a warning.
    pub fn list(&self) -> Result<Vec<LockEntry>, StoreError> {
        let mut entries = Vec::new();
        for result in self.list_with_errors()? {
            match result {
                Ok(entry) => entries.push(entry),
                Err((hash, e)) => warn!("skipping corrupted lock entry '{hash}': {e}"),
            }
        }
        Ok(entries)
    }

    /// Like `list()`, but returns per-entry results so callers can surface
    /// individual corruption errors.
    #[allow(clippy::type_complexity)]
    pub fn list_with_errors(
        &self,
    ) -> Result<Vec<Result<LockEntry, (String, StoreError)>>, StoreError> {
        let mut results = Vec::new();
        for key in self.backend.keys()? {
            let outcome = match self.backend.read(&key) {
                Ok(Some(bytes)) => LockEntry::decode(&key, &bytes),
                // Removed between listing and reading.
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            results.push(outcome.map_err(|e| (key, e)));
        }
        Ok(results)
    }

    /// Check every entry's checksum and key binding.
    pub fn verify(&self) -> Result<IntegrityReport, StoreError> {
        let mut report = IntegrityReport::default();
        for result in self.list_with_errors()? {
            report.checked += 1;
            match result {
                Ok(_) => report.passed += 1,
                Err((hash, e)) => report.failed.push(IntegrityFailure {
                    hash,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(report)
    }
}
