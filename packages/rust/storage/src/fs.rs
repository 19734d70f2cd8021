//! Filesystem-backed artifact store.

use std::path::{Path, PathBuf};

use tracing::debug;

use tepdiag_shared::{Result, TepError};

use crate::ArtifactStore;

/// Stores artifacts as files under a root directory.
///
/// Relative keys resolve against the root; absolute keys are used as-is.
/// Writes go to a hidden temp file first and are renamed into place, so a
/// present file is always a complete one.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root` (not created until the first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of `key`.
    pub fn resolve(&self, key: &Path) -> PathBuf {
        self.root.join(key)
    }
}

impl ArtifactStore for FsStore {
    fn exists(&self, key: &Path) -> bool {
        self.resolve(key).is_file()
    }

    fn load(&self, key: &Path) -> Result<Vec<u8>> {
        let path = self.resolve(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TepError::missing(key)),
            Err(e) => Err(TepError::io(path, e)),
        }
    }

    fn save(&self, key: &Path, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(key);
        let parent = target
            .parent()
            .ok_or_else(|| TepError::validation(format!("invalid artifact key {key:?}")))?;
        std::fs::create_dir_all(parent).map_err(|e| TepError::io(parent, e))?;

        let file_name = target
            .file_name()
            .ok_or_else(|| TepError::validation(format!("invalid artifact key {key:?}")))?
            .to_string_lossy();
        let temp = parent.join(format!(".{file_name}.tmp"));

        std::fs::write(&temp, bytes).map_err(|e| TepError::io(&temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| TepError::io(&target, e))?;

        debug!(path = %target.display(), size = bytes.len(), "wrote artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tep-fs-store-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn save_creates_parent_dirs() {
        let tmp = temp_dir();
        let store = FsStore::new(&tmp);
        let key = Path::new("processed/subsets/TEP_subset_N5.parquet");

        assert!(!store.exists(key));
        store.save(key, b"payload").unwrap();
        assert!(store.exists(key));
        assert!(tmp.join(key).is_file());
        assert_eq!(store.load(key).unwrap(), b"payload");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let tmp = temp_dir();
        let store = FsStore::new(&tmp);
        store.save(Path::new("models/tep_detector.json"), b"{}").unwrap();
        store.save(Path::new("models/tep_detector.json"), b"{\"v\":2}").unwrap();

        for entry in std::fs::read_dir(tmp.join("models")).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }
        assert_eq!(
            store.load(Path::new("models/tep_detector.json")).unwrap(),
            b"{\"v\":2}"
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn absolute_keys_bypass_root() {
        let tmp = temp_dir();
        let store = FsStore::new("/definitely/not/here");
        let key = tmp.join("abs.bin");
        store.save(&key, b"x").unwrap();
        assert!(key.is_file());
        assert!(store.exists(&key));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_key_is_missing_artifact() {
        let tmp = temp_dir();
        let store = FsStore::new(&tmp);
        let err = store.load(Path::new("nope.parquet")).unwrap_err();
        assert!(matches!(err, TepError::MissingArtifact { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
