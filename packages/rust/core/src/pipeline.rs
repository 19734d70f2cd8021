//! End-to-end pipeline: fetch → convert → merge → load → split → train → evaluate.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use tepdiag_etl::{ConvertReport, FetchReport, convert_csv_to_parquet, fetch_dataset, merge_master};
use tepdiag_shared::{Layout, PipelineConfig, Result};
use tepdiag_storage::ArtifactStore;

use crate::evaluate::{CascadeMetrics, evaluate};
use crate::loader::{load_data, save_test_set};
use crate::split::{SplitData, split_by_run};
use crate::trainer::{CascadeTrainer, TrainReport};

/// Per-run settings, seeded from `[defaults]` and overridable from the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Simulation runs kept per fault number (0 = all).
    pub n_simulations: usize,
    /// Fraction of runs held out for testing.
    pub test_size: f64,
    /// Seed for the run shuffle.
    pub seed: u64,
    /// Retrain models even when their artifacts exist.
    pub force: bool,
    /// Directory to import the raw CSVs from.
    pub source: Option<PathBuf>,
    /// Evaluate the cascade on the held-out runs after training.
    pub evaluate: bool,
}

impl RunOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            n_simulations: config.defaults.n_simulations,
            test_size: config.defaults.test_size,
            seed: config.defaults.seed,
            force: false,
            source: None,
            evaluate: true,
        }
    }
}

/// What a full run did.
#[derive(Debug)]
pub struct RunSummary {
    pub fetch: FetchReport,
    pub convert: ConvertReport,
    pub master_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub test_runs: Vec<String>,
    pub train: TrainReport,
    pub metrics: Option<CascadeMetrics>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Load the (subsampled) dataset and split it by run, archiving the test
/// partition.
#[instrument(skip_all, fields(n_simulations = options.n_simulations, test_size = options.test_size))]
pub fn prepare_split<S: ArtifactStore + ?Sized>(
    store: &S,
    layout: &Layout,
    options: &RunOptions,
) -> Result<SplitData> {
    let df = load_data(store, layout, options.n_simulations)?;
    let split = split_by_run(&df, options.test_size, options.seed)?;
    save_test_set(store, layout, &split.test)?;
    Ok(split)
}

/// Run every stage in order. Stages whose outputs already exist reuse them.
#[instrument(skip_all, fields(data_dir = %config.paths.data_dir, force = options.force))]
pub fn run_pipeline<S: ArtifactStore + ?Sized>(
    store: &S,
    config: &PipelineConfig,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let start = Instant::now();
    let layout = Layout::from(config);

    progress.phase("Fetching raw dataset");
    let fetch = fetch_dataset(store, &layout, config, options.source.as_deref())?;

    progress.phase("Converting CSV to Parquet");
    let convert = convert_csv_to_parquet(store, &layout)?;

    progress.phase("Merging normal and faulty data");
    let master_rows = merge_master(store, &layout)?.height();

    progress.phase("Splitting by simulation run");
    let split = prepare_split(store, &layout, options)?;

    progress.phase("Training cascade");
    let trainer = CascadeTrainer::new(store, &layout, &config.models);
    let train = trainer.train(&split.train.features, &split.train.labels, options.force)?;

    let metrics = if options.evaluate {
        progress.phase("Evaluating on held-out runs");
        Some(evaluate(store, &layout)?)
    } else {
        None
    };

    let summary = RunSummary {
        fetch,
        convert,
        master_rows,
        train_rows: split.train.rows(),
        test_rows: split.test.rows(),
        test_runs: split.test_runs,
        train,
        metrics,
        elapsed: start.elapsed(),
    };

    info!(
        master_rows = summary.master_rows,
        train_rows = summary.train_rows,
        test_rows = summary.test_rows,
        state = ?summary.train.state,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "pipeline complete"
    );

    progress.done(&summary);
    Ok(summary)
}
