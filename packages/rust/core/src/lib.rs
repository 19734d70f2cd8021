//! Core training logic and pipeline orchestration for tepdiag.
//!
//! This crate loads the master dataset, splits it by simulation run, trains
//! the detector → diagnostician cascade, evaluates it, and ties every stage
//! together into an end-to-end run (`run_pipeline`).

mod frame;

pub mod evaluate;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod split;
pub mod trainer;

pub use evaluate::{CascadeMetrics, DetectionMetrics, evaluate};
pub use loader::{load_data, load_test_set, save_test_set, subsample_by_run, with_run_id};
pub use model::{FaultClassifier, StandardScaler};
pub use pipeline::{
    ProgressReporter, RunOptions, RunSummary, SilentProgress, prepare_split, run_pipeline,
};
pub use split::{Dataset, SplitData, split_by_run};
pub use trainer::{CascadeState, CascadeTrainer, PhaseOutcome, TrainReport};
