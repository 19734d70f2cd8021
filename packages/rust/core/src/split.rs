//! Leakage-safe train/test split.
//!
//! Partitioning happens over unique run ids, never rows, so every sample of a
//! simulation run lands in exactly one partition.

use std::collections::{BTreeSet, HashSet};

use polars::prelude::*;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{info, instrument, warn};

use tepdiag_shared::{FAULT_NUMBER, METADATA_COLUMNS, Result, TepError, UNIQUE_RUN_ID};

/// Features with metadata stripped, plus `faultNumber` labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: DataFrame,
    pub labels: Series,
}

impl Dataset {
    pub fn rows(&self) -> usize {
        self.features.height()
    }
}

/// The two partitions of a run-level split.
#[derive(Debug, Clone)]
pub struct SplitData {
    pub train: Dataset,
    pub test: Dataset,
    /// Run ids assigned to the test partition, sorted.
    pub test_runs: Vec<String>,
}

/// Partition run ids into `(train, test)`.
///
/// Ids are sorted before a seeded shuffle so the outcome depends only on the
/// id set and the seed. The last `round(n * test_size)` shuffled ids are test.
pub fn split_runs<'a>(
    run_ids: impl IntoIterator<Item = &'a str>,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<String>, Vec<String>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TepError::validation(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let unique: BTreeSet<&str> = run_ids.into_iter().collect();
    let mut runs: Vec<String> = unique.into_iter().map(String::from).collect();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    runs.shuffle(&mut rng);

    let n_test = (runs.len() as f64 * test_size).round() as usize;
    let test = runs.split_off(runs.len() - n_test);

    if test.is_empty() || runs.is_empty() {
        warn!(
            train_runs = runs.len(),
            test_runs = test.len(),
            "split leaves a partition empty"
        );
    }

    Ok((runs, test))
}

/// Strip metadata columns and take `faultNumber` as labels.
fn finalize(mut df: DataFrame) -> Result<Dataset> {
    let labels = df
        .column(FAULT_NUMBER)
        .map_err(|_| TepError::validation(format!("column '{FAULT_NUMBER}' not found")))?
        .as_materialized_series()
        .clone();

    for name in METADATA_COLUMNS {
        if df.get_column_index(name).is_some() {
            df.drop_in_place(name).map_err(TepError::data)?;
        }
    }

    Ok(Dataset {
        features: df,
        labels,
    })
}

/// Split a frame carrying `unique_run_id` into train and test datasets.
#[instrument(skip_all, fields(rows = df.height(), test_size = test_size, seed = seed))]
pub fn split_by_run(df: &DataFrame, test_size: f64, seed: u64) -> Result<SplitData> {
    let ids = df
        .column(UNIQUE_RUN_ID)
        .map_err(|_| {
            TepError::validation(format!(
                "column '{UNIQUE_RUN_ID}' not found; load the data before splitting"
            ))
        })?
        .as_materialized_series()
        .str()
        .map_err(TepError::data)?
        .clone();

    if ids.null_count() > 0 {
        return Err(TepError::validation(format!(
            "'{UNIQUE_RUN_ID}' contains {} null values",
            ids.null_count()
        )));
    }

    let (train_runs, test_runs) = split_runs(ids.into_no_null_iter(), test_size, seed)?;
    let test_set: HashSet<&str> = test_runs.iter().map(String::as_str).collect();

    let test_mask: BooleanChunked = ids
        .into_no_null_iter()
        .map(|id| test_set.contains(id))
        .collect();
    let train_mask = !&test_mask;

    let train = df.filter(&train_mask).map_err(TepError::data)?;
    let test = df.filter(&test_mask).map_err(TepError::data)?;

    info!(
        train_runs = train_runs.len(),
        test_runs = test_runs.len(),
        train_rows = train.height(),
        test_rows = test.height(),
        "split by run"
    );

    let mut test_runs = test_runs;
    test_runs.sort();

    Ok(SplitData {
        train: finalize(train)?,
        test: finalize(test)?,
        test_runs,
    })
}
