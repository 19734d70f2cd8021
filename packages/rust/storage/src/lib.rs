//! Artifact storage layer.
//!
//! Every pipeline stage caches its output as an artifact and checks for it
//! before recomputing. The [`ArtifactStore`] trait is that cache:
//! - [`FsStore`]: files under a root directory (atomic writes)
//! - [`MemoryStore`]: a map in memory, for tests
//!
//! [`StoreExt`] layers typed helpers on top (Parquet frames, JSON, YAML).

mod codec;
mod fs;
mod memory;

use std::path::Path;

use polars::prelude::DataFrame;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use tepdiag_shared::{Result, TepError};

pub use codec::{frame_from_parquet, frame_to_parquet};
pub use fs::FsStore;
pub use memory::MemoryStore;

/// Byte-level artifact cache keyed by path.
///
/// Presence of a key is the durability marker: a stage that finds its output
/// already stored loads it instead of recomputing.
pub trait ArtifactStore {
    /// Whether an artifact exists at `key`.
    fn exists(&self, key: &Path) -> bool;

    /// Read the artifact at `key`. Missing keys yield [`TepError::MissingArtifact`].
    fn load(&self, key: &Path) -> Result<Vec<u8>>;

    /// Write (or replace) the artifact at `key`.
    fn save(&self, key: &Path, bytes: &[u8]) -> Result<()>;

    /// SHA-256 of the artifact at `key`, hex encoded.
    fn fingerprint(&self, key: &Path) -> Result<String> {
        let bytes = self.load(key)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Typed helpers over any [`ArtifactStore`].
pub trait StoreExt: ArtifactStore {
    /// Load a Parquet-encoded dataframe.
    fn load_frame(&self, key: &Path) -> Result<DataFrame> {
        frame_from_parquet(self.load(key)?)
    }

    /// Store a dataframe as Parquet.
    fn save_frame(&self, key: &Path, df: &mut DataFrame) -> Result<()> {
        let bytes = frame_to_parquet(df)?;
        self.save(key, &bytes)?;
        tracing::debug!(key = %key.display(), rows = df.height(), "saved frame");
        Ok(())
    }

    /// Load a JSON document.
    fn load_json<T: DeserializeOwned>(&self, key: &Path) -> Result<T> {
        let bytes = self.load(key)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            TepError::Serialization(format!("{}: {e}", key.display()))
        })
    }

    /// Store a value as JSON.
    fn save_json<T: Serialize>(&self, key: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| {
            TepError::Serialization(format!("{}: {e}", key.display()))
        })?;
        self.save(key, &bytes)
    }

    /// Load a YAML document.
    fn load_yaml<T: DeserializeOwned>(&self, key: &Path) -> Result<T> {
        let bytes = self.load(key)?;
        serde_yaml::from_slice(&bytes).map_err(|e| {
            TepError::Serialization(format!("{}: {e}", key.display()))
        })
    }

    /// Store a value as YAML.
    fn save_yaml<T: Serialize>(&self, key: &Path, value: &T) -> Result<()> {
        let text = serde_yaml::to_string(value).map_err(|e| {
            TepError::Serialization(format!("{}: {e}", key.display()))
        })?;
        self.save(key, text.as_bytes())
    }
}

impl<S: ArtifactStore + ?Sized> StoreExt for S {}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use polars::prelude::*;
    use tepdiag_shared::CacheInfo;

    use super::*;

    #[test]
    fn fingerprint_is_sha256() {
        let store = MemoryStore::new();
        let key = Path::new("a/b.bin");
        store.save(key, b"abc").unwrap();
        assert_eq!(
            store.fingerprint(key).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn fingerprint_of_missing_key_fails() {
        let store = MemoryStore::new();
        let err = store.fingerprint(Path::new("nope")).unwrap_err();
        assert!(matches!(err, TepError::MissingArtifact { .. }));
    }

    #[test]
    fn frame_through_store() {
        let store = MemoryStore::new();
        let key = PathBuf::from("processed/x.parquet");
        let mut df = DataFrame::new(vec![
            Series::new("faultNumber".into(), &[0i32, 1, 2]).into(),
            Series::new("xmeas_1".into(), &[0.5f32, 1.5, 2.5]).into(),
        ])
        .unwrap();

        store.save_frame(&key, &mut df).unwrap();
        let loaded = store.load_frame(&key).unwrap();
        assert!(loaded.equals(&df));
    }

    #[test]
    fn yaml_through_store() {
        let store = MemoryStore::new();
        let key = Path::new("config/cache.yaml");
        let info = CacheInfo {
            source_path: "/home/u/.cache/kagglehub/datasets/afrniomelo/tep-csv".into(),
            data_path: "data/raw/tep-csv".into(),
            dataset: "afrniomelo/tep-csv".into(),
            imported_at: chrono::Utc::now(),
            checksums: BTreeMap::from([("a.csv".to_string(), "00".to_string())]),
        };

        store.save_yaml(key, &info).unwrap();
        let text = String::from_utf8(store.load(key).unwrap()).unwrap();
        assert!(text.contains("source_path:"));

        let parsed: CacheInfo = store.load_yaml(key).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn corrupt_json_is_serialization_error() {
        let store = MemoryStore::new();
        let key = Path::new("models/m.json");
        store.save(key, b"{not json").unwrap();
        let err = store.load_json::<serde_json::Value>(key).unwrap_err();
        assert!(matches!(err, TepError::Serialization(_)));
    }
}
