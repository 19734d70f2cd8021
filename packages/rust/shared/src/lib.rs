//! Shared types, error model, and configuration for tepdiag.
//!
//! This crate is the foundation depended on by all other tepdiag crates.
//! It provides:
//! - [`TepError`]: the unified error type
//! - Domain types ([`RunId`], [`ModelKind`], [`CacheInfo`]) and column names
//! - Configuration ([`PipelineConfig`], [`Layout`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    DATA_PATH_ENV, DefaultsConfig, ForestParams, Layout, ModelsConfig, PathsConfig,
    PipelineConfig, default_config_path, init_config, load_config, load_config_from,
};
pub use error::{Result, TepError};
pub use types::{
    CacheInfo, FAULT_NUMBER, FAULTY_TRAIN_FILE, METADATA_COLUMNS, ModelKind, NORMAL_TRAIN_FILE,
    RAW_CSV_FILES, RunId, SAMPLE, SIMULATION_RUN, TARGET, UNIQUE_RUN_ID, is_metadata_column,
    sensor_columns,
};
