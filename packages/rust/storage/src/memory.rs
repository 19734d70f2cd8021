//! In-memory artifact store for testing.
//!
//! Data is lost when the struct is dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use tepdiag_shared::{Result, TepError};

use crate::ArtifactStore;

#[derive(Debug, Default)]
struct Inner {
    artifacts: BTreeMap<PathBuf, Vec<u8>>,
    writes: usize,
}

/// Artifact store backed by a map, with a write counter so tests can assert
/// that a stage did nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.inner.read().artifacts.len()
    }

    /// Whether the store holds no artifacts.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of `save` calls so far.
    pub fn writes(&self) -> usize {
        self.inner.read().writes
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<PathBuf> {
        self.inner.read().artifacts.keys().cloned().collect()
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, key: &Path) -> bool {
        self.inner.read().artifacts.contains_key(key)
    }

    fn load(&self, key: &Path) -> Result<Vec<u8>> {
        self.inner
            .read()
            .artifacts
            .get(key)
            .cloned()
            .ok_or_else(|| TepError::missing(key))
    }

    fn save(&self, key: &Path, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        inner.artifacts.insert(key.to_path_buf(), bytes.to_vec());
        inner.writes += 1;
        Ok(())
    }
}
