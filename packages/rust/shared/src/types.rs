//! Core domain types and column names for the Tennessee Eastman Process dataset.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

/// Fault label: 0 = normal operation, >0 = fault type.
pub const FAULT_NUMBER: &str = "faultNumber";
/// Monte Carlo run identifier, unique within one fault number.
pub const SIMULATION_RUN: &str = "simulationRun";
/// Time index within a run.
pub const SAMPLE: &str = "sample";
/// Composite `"{faultNumber}_{simulationRun}"` key added at load time.
pub const UNIQUE_RUN_ID: &str = "unique_run_id";
/// Label column of the persisted test set.
pub const TARGET: &str = "target";

/// Columns that are never model features.
pub const METADATA_COLUMNS: [&str; 4] = [FAULT_NUMBER, SIMULATION_RUN, SAMPLE, UNIQUE_RUN_ID];

/// Number of measured variables (`xmeas_1..=xmeas_41`).
const XMEAS_COUNT: usize = 41;
/// Number of manipulated variables (`xmv_1..=xmv_11`).
const XMV_COUNT: usize = 11;

/// Whether `name` is one of the [`METADATA_COLUMNS`].
pub fn is_metadata_column(name: &str) -> bool {
    METADATA_COLUMNS.contains(&name)
}

/// The 52 sensor / manipulated-variable column names, in file order.
pub fn sensor_columns() -> Vec<String> {
    (1..=XMEAS_COUNT)
        .map(|i| format!("xmeas_{i}"))
        .chain((1..=XMV_COUNT).map(|i| format!("xmv_{i}")))
        .collect()
}

// ---------------------------------------------------------------------------
// Raw files
// ---------------------------------------------------------------------------

/// Fault-free training runs.
pub const NORMAL_TRAIN_FILE: &str = "fault_free_training.csv";
/// Faulty training runs.
pub const FAULTY_TRAIN_FILE: &str = "faulty_training.csv";

/// Every CSV the conversion stage expects in the raw directory.
pub const RAW_CSV_FILES: [&str; 4] = [
    NORMAL_TRAIN_FILE,
    "fault_free_testing.csv",
    FAULTY_TRAIN_FILE,
    "faulty_testing.csv",
];

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// One simulated process trial, identified by fault number and run number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub fault_number: i64,
    pub simulation_run: i64,
}

impl RunId {
    pub fn new(fault_number: i64, simulation_run: i64) -> Self {
        Self {
            fault_number,
            simulation_run,
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.fault_number, self.simulation_run)
    }
}

// ---------------------------------------------------------------------------
// ModelKind
// ---------------------------------------------------------------------------

/// The two stages of the classifier cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Binary: normal vs. any fault.
    Detector,
    /// Multiclass: which fault, trained on faulty rows only.
    Diagnostician,
}

impl ModelKind {
    /// File name of the serialized model inside the models directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Detector => "tep_detector.json",
            Self::Diagnostician => "tep_diagnostician.json",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detector => f.write_str("detector"),
            Self::Diagnostician => f.write_str("diagnostician"),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheInfo
// ---------------------------------------------------------------------------

/// The `cache.yaml` record written by the fetch stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Where the dataset was imported from (e.g. the kagglehub cache).
    pub source_path: String,
    /// Where the raw CSVs now live.
    pub data_path: String,
    /// Dataset handle on the upstream registry.
    pub dataset: String,
    /// When the import happened.
    pub imported_at: DateTime<Utc>,
    /// SHA-256 of each imported CSV, keyed by file name.
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}
