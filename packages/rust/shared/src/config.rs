//! Pipeline configuration for tepdiag.
//!
//! Config lives in `tepdiag.toml` (working directory by default, or `--config`).
//! CLI flags override config file values, which override defaults. The
//! `DATA_PATH` environment variable overrides the data root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TepError};
use crate::types::ModelKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tepdiag.toml";

/// Environment variable overriding `[paths].data_dir`.
pub const DATA_PATH_ENV: &str = "DATA_PATH";

/// Dataset handle on Kaggle.
const KAGGLE_DATASET: &str = "afrniomelo/tep-csv";

// ---------------------------------------------------------------------------
// Config structs (matching tepdiag.toml schema)
// ---------------------------------------------------------------------------

/// Top-level pipeline config, deserialized from TOML and passed to every stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Sampling and split defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Random forest hyperparameters per cascade stage.
    #[serde(default)]
    pub models: ModelsConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Data root holding `raw/` and `processed/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory for serialized models.
    #[serde(default = "default_models_dir")]
    pub models_dir: String,

    /// Directory for `cache.yaml`.
    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    /// Where the fetch stage imports the dataset from. Defaults to the
    /// kagglehub cache for `afrniomelo/tep-csv`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,

    /// Dataset handle recorded in the cache info.
    #[serde(default = "default_dataset")]
    pub dataset: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models_dir: default_models_dir(),
            config_dir: default_config_dir(),
            source_dir: None,
            dataset: default_dataset(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_models_dir() -> String {
    "models".into()
}
fn default_config_dir() -> String {
    "config".into()
}
fn default_dataset() -> String {
    KAGGLE_DATASET.into()
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Simulation runs kept per fault number when subsampling (0 = all).
    #[serde(default = "default_n_simulations")]
    pub n_simulations: usize,

    /// Fraction of runs held out for testing.
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Seed for the run shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            n_simulations: default_n_simulations(),
            test_size: default_test_size(),
            seed: default_seed(),
        }
    }
}

fn default_n_simulations() -> usize {
    50
}
fn default_test_size() -> f64 {
    0.2
}
fn default_seed() -> u64 {
    42
}

/// `[models]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Binary detector hyperparameters.
    #[serde(default = "ForestParams::detector")]
    pub detector: ForestParams,

    /// Multiclass diagnostician hyperparameters.
    #[serde(default = "ForestParams::diagnostician")]
    pub diagnostician: ForestParams,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            detector: ForestParams::detector(),
            diagnostician: ForestParams::diagnostician(),
        }
    }
}

impl ModelsConfig {
    /// Hyperparameters for one cascade stage.
    pub fn params(&self, kind: ModelKind) -> &ForestParams {
        match kind {
            ModelKind::Detector => &self.detector,
            ModelKind::Diagnostician => &self.diagnostician,
        }
    }
}

/// `[models.detector]` / `[models.diagnostician]`: random forest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees.
    pub n_trees: u16,
    /// Maximum tree depth (unbounded when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u16>,
    /// Minimum samples in a leaf.
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Minimum samples required to split a node.
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    /// Seed for bootstrap sampling and feature selection.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl ForestParams {
    /// Defaults for the binary detector.
    pub fn detector() -> Self {
        Self {
            n_trees: 100,
            max_depth: Some(15),
            min_samples_leaf: 2,
            min_samples_split: default_min_samples_split(),
            seed: default_seed(),
        }
    }

    /// Defaults for the multiclass diagnostician.
    pub fn diagnostician() -> Self {
        Self {
            n_trees: 150,
            max_depth: Some(20),
            min_samples_leaf: default_min_samples_leaf(),
            min_samples_split: default_min_samples_split(),
            seed: default_seed(),
        }
    }
}

fn default_min_samples_leaf() -> usize {
    1
}
fn default_min_samples_split() -> usize {
    2
}

impl PipelineConfig {
    /// Reject values no stage can work with.
    pub fn validate(&self) -> Result<()> {
        let ts = self.defaults.test_size;
        if !(ts > 0.0 && ts < 1.0) {
            return Err(TepError::config(format!(
                "test_size must be in (0, 1), got {ts}"
            )));
        }
        for kind in [ModelKind::Detector, ModelKind::Diagnostician] {
            if self.models.params(kind).n_trees == 0 {
                return Err(TepError::config(format!("{kind}: n_trees must be > 0")));
            }
        }
        Ok(())
    }

    /// Apply environment overrides (`DATA_PATH`).
    pub fn apply_env(&mut self) {
        self.apply_data_path(std::env::var(DATA_PATH_ENV).ok());
    }

    /// Override the data root when `value` is set and non-empty.
    pub fn apply_data_path(&mut self, value: Option<String>) {
        if let Some(dir) = value.filter(|v| !v.is_empty()) {
            tracing::debug!(data_dir = %dir, "data root overridden by {DATA_PATH_ENV}");
            self.paths.data_dir = dir;
        }
    }

    /// Where the fetch stage looks for the downloaded dataset.
    pub fn source_dir(&self) -> Option<PathBuf> {
        match &self.paths.source_dir {
            Some(dir) => Some(PathBuf::from(dir)),
            None => dirs::home_dir().map(|home| {
                home.join(".cache")
                    .join("kagglehub")
                    .join("datasets")
                    .join(&self.paths.dataset)
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Layout (resolved artifact locations)
// ---------------------------------------------------------------------------

/// Resolved locations of every artifact the pipeline reads or writes.
///
/// All paths are store keys: relative paths resolve against the store root,
/// absolute ones are used as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// `<data>/raw/tep-csv`
    pub raw_dir: PathBuf,
    /// `<data>/processed`
    pub processed_dir: PathBuf,
    /// `<models>`
    pub models_dir: PathBuf,
    /// `<config>`
    pub config_dir: PathBuf,
}

impl From<&PipelineConfig> for Layout {
    fn from(config: &PipelineConfig) -> Self {
        let data = PathBuf::from(&config.paths.data_dir);
        Self {
            raw_dir: data.join("raw").join("tep-csv"),
            processed_dir: data.join("processed"),
            models_dir: PathBuf::from(&config.paths.models_dir),
            config_dir: PathBuf::from(&config.paths.config_dir),
        }
    }
}

impl Layout {
    /// A raw CSV by file name.
    pub fn raw_csv(&self, csv_name: &str) -> PathBuf {
        self.raw_dir.join(csv_name)
    }

    /// The Parquet mirror of a raw CSV.
    pub fn raw_parquet(&self, csv_name: &str) -> PathBuf {
        let stem = csv_name.strip_suffix(".csv").unwrap_or(csv_name);
        self.processed_dir
            .join("parquet")
            .join(format!("{stem}.parquet"))
    }

    /// The merged master dataset.
    pub fn master(&self) -> PathBuf {
        self.processed_dir.join("tep_master.parquet")
    }

    /// Cached subsample keyed by simulation count.
    pub fn subset(&self, n_simulations: usize) -> PathBuf {
        self.processed_dir
            .join("subsets")
            .join(format!("TEP_subset_N{n_simulations}.parquet"))
    }

    /// The archived final test set.
    pub fn test_set(&self) -> PathBuf {
        self.processed_dir.join("final").join("test_set_final.parquet")
    }

    /// A serialized cascade model.
    pub fn model(&self, kind: ModelKind) -> PathBuf {
        self.models_dir.join(kind.file_name())
    }

    /// The `cache.yaml` record of the fetch stage.
    pub fn cache_info(&self) -> PathBuf {
        self.config_dir.join("cache.yaml")
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Default config path (`./tepdiag.toml`).
pub fn default_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE_NAME)
}

/// Load the pipeline config.
///
/// An explicit path must exist; otherwise `./tepdiag.toml` is used when
/// present and defaults when not. Environment overrides apply last.
pub fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match explicit {
        Some(path) => load_config_from(path)?,
        None => {
            let path = default_config_path();
            if path.exists() {
                load_config_from(&path)?
            } else {
                tracing::debug!(?path, "config file not found, using defaults");
                PipelineConfig::default()
            }
        }
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Load the pipeline config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TepError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| TepError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file to `path`. Returns the path written.
pub fn init_config(path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TepError::io(parent, e))?;
    }

    let content = toml::to_string_pretty(&PipelineConfig::default())
        .map_err(|e| TepError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| TepError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}
