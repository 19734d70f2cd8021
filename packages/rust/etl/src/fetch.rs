//! Raw dataset import.
//!
//! Copies a locally downloaded `afrniomelo/tep-csv` dataset (by default the
//! kagglehub cache) into the raw data directory and records where it came
//! from in `cache.yaml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, instrument, warn};

use tepdiag_shared::{CacheInfo, Layout, PipelineConfig, RAW_CSV_FILES, Result, TepError};
use tepdiag_storage::{ArtifactStore, StoreExt};

/// Outcome of the fetch stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    /// Raw CSV directory.
    pub raw_dir: PathBuf,
    /// Files copied in this run (empty when the data was already present).
    pub imported: Vec<String>,
    /// Directory the files were copied from.
    pub source: Option<PathBuf>,
}

impl FetchReport {
    /// Whether the stage found the raw data already in place.
    pub fn already_present(&self) -> bool {
        self.imported.is_empty()
    }
}

/// kagglehub stores datasets under `versions/<n>/`; pick the newest one.
fn resolve_version_dir(dir: &Path) -> PathBuf {
    let latest = std::fs::read_dir(dir.join("versions"))
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let version = entry.file_name().to_str()?.parse::<u32>().ok()?;
            Some((version, entry.path()))
        })
        .max_by_key(|(version, _)| *version);

    match latest {
        Some((_, path)) => path,
        None => dir.to_path_buf(),
    }
}

/// Import the raw CSVs unless they are all present already.
///
/// `source` overrides the configured source directory.
#[instrument(skip_all, fields(raw_dir = %layout.raw_dir.display()))]
pub fn fetch_dataset<S: ArtifactStore + ?Sized>(
    store: &S,
    layout: &Layout,
    config: &PipelineConfig,
    source: Option<&Path>,
) -> Result<FetchReport> {
    let present: Vec<&str> = RAW_CSV_FILES
        .iter()
        .copied()
        .filter(|name| store.exists(&layout.raw_csv(name)))
        .collect();
    let already_present = || FetchReport {
        raw_dir: layout.raw_dir.clone(),
        imported: Vec::new(),
        source: None,
    };

    if present.len() == RAW_CSV_FILES.len() {
        info!("raw data already present");
        return Ok(already_present());
    }

    let dir = source
        .map(Path::to_path_buf)
        .or_else(|| config.source_dir())
        .map(|base| resolve_version_dir(&base));

    let dir = match dir {
        Some(dir) if dir.is_dir() => dir,
        _ if !present.is_empty() => {
            warn!(
                present = ?present,
                "dataset source unavailable; continuing with the raw files already in place"
            );
            return Ok(already_present());
        }
        Some(dir) => {
            return Err(TepError::config(format!(
                "dataset source {} not found; download {} first or pass --from",
                dir.display(),
                config.paths.dataset
            )));
        }
        None => return Err(TepError::config("no dataset source directory configured")),
    };

    info!(source = %dir.display(), "importing raw dataset");

    let mut imported = Vec::new();
    let mut checksums = BTreeMap::new();

    for csv_name in RAW_CSV_FILES {
        let src = dir.join(csv_name);
        let key = layout.raw_csv(csv_name);

        if store.exists(&key) {
            checksums.insert(csv_name.to_string(), store.fingerprint(&key)?);
            continue;
        }
        if !src.is_file() {
            warn!(file = csv_name, source = %dir.display(), "source file missing");
            continue;
        }

        let bytes = std::fs::read(&src).map_err(|e| TepError::io(&src, e))?;
        store.save(&key, &bytes)?;
        checksums.insert(csv_name.to_string(), store.fingerprint(&key)?);
        info!(file = csv_name, bytes = bytes.len(), "imported");
        imported.push(csv_name.to_string());
    }

    if checksums.is_empty() {
        return Err(TepError::validation(format!(
            "no TEP CSV files found in {}",
            dir.display()
        )));
    }
    if imported.is_empty() {
        info!("no new files to import");
        return Ok(FetchReport {
            raw_dir: layout.raw_dir.clone(),
            imported,
            source: Some(dir),
        });
    }

    let cache_info = CacheInfo {
        source_path: dir.display().to_string(),
        data_path: layout.raw_dir.display().to_string(),
        dataset: config.paths.dataset.clone(),
        imported_at: Utc::now(),
        checksums,
    };
    store.save_yaml(&layout.cache_info(), &cache_info)?;
    info!(path = %layout.cache_info().display(), "cache info saved");

    Ok(FetchReport {
        raw_dir: layout.raw_dir.clone(),
        imported,
        source: Some(dir),
    })
}
