//! Dataset loading: subsampled, cached views of the master dataset, and the
//! archived test set.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, info, instrument};

use tepdiag_shared::{
    FAULT_NUMBER, Layout, Result, RunId, SIMULATION_RUN, TARGET, TepError, UNIQUE_RUN_ID,
};
use tepdiag_storage::{ArtifactStore, StoreExt, frame_to_parquet};

use crate::frame::column_i64;
use crate::split::Dataset;

/// Add the `unique_run_id` column (`"{faultNumber}_{simulationRun}"`).
pub fn with_run_id(mut df: DataFrame) -> Result<DataFrame> {
    let faults = column_i64(&df, FAULT_NUMBER)?;
    let runs = column_i64(&df, SIMULATION_RUN)?;

    let ids: Vec<String> = faults
        .iter()
        .zip(&runs)
        .map(|(&fault, &run)| RunId::new(fault, run).to_string())
        .collect();

    df.with_column(Series::new(UNIQUE_RUN_ID.into(), ids))
        .map_err(TepError::data)?;
    Ok(df)
}

/// Keep, for every fault number, the rows of its first `n_simulations`
/// distinct simulation runs (ascending run number).
pub fn subsample_by_run(df: &DataFrame, n_simulations: usize) -> Result<DataFrame> {
    let faults = column_i64(df, FAULT_NUMBER)?;
    let runs = column_i64(df, SIMULATION_RUN)?;

    let mut runs_per_fault: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
    for (&fault, &run) in faults.iter().zip(&runs) {
        runs_per_fault.entry(fault).or_default().insert(run);
    }

    let keep: HashSet<RunId> = runs_per_fault
        .into_iter()
        .flat_map(|(fault, runs)| {
            runs.into_iter()
                .take(n_simulations)
                .map(move |run| RunId::new(fault, run))
        })
        .collect();

    let mask: BooleanChunked = faults
        .iter()
        .zip(&runs)
        .map(|(&fault, &run)| keep.contains(&RunId::new(fault, run)))
        .collect();

    df.filter(&mask).map_err(TepError::data)
}

/// Load the working dataset with its `unique_run_id` column.
///
/// With `n_simulations > 0` the subsample is served from its cache or built
/// from the master dataset and cached. With `0` the full master is used.
/// A missing master is fatal.
#[instrument(skip_all, fields(n_simulations = n_simulations))]
pub fn load_data<S: ArtifactStore + ?Sized>(
    store: &S,
    layout: &Layout,
    n_simulations: usize,
) -> Result<DataFrame> {
    let subset_key = layout.subset(n_simulations);

    let df = if n_simulations > 0 && store.exists(&subset_key) {
        debug!(key = %subset_key.display(), "using cached subset");
        store.load_frame(&subset_key)?
    } else {
        let master = layout.master();
        if !store.exists(&master) {
            return Err(TepError::MasterMissing { path: master });
        }

        let df = store.load_frame(&master)?;
        if n_simulations > 0 {
            let mut subset = subsample_by_run(&df, n_simulations)?;
            store.save_frame(&subset_key, &mut subset)?;
            info!(
                rows = subset.height(),
                master_rows = df.height(),
                "subset generated and cached"
            );
            subset
        } else {
            df
        }
    };

    with_run_id(df)
}

/// Archive the test partition (features plus a `target` column).
///
/// An identical archive already in the store is left untouched.
pub fn save_test_set<S: ArtifactStore + ?Sized>(
    store: &S,
    layout: &Layout,
    test: &Dataset,
) -> Result<PathBuf> {
    let mut df = test.features.clone();
    let target = test.labels.clone().with_name(TARGET.into());
    df.with_column(target).map_err(TepError::data)?;

    let key = layout.test_set();
    let bytes = frame_to_parquet(&mut df)?;
    if store.exists(&key) && store.load(&key)? == bytes {
        debug!(path = %key.display(), "test set unchanged");
        return Ok(key);
    }

    store.save(&key, &bytes)?;
    info!(path = %key.display(), rows = df.height(), "test set archived");
    Ok(key)
}

/// Load the archived test set back into features and labels.
pub fn load_test_set<S: ArtifactStore + ?Sized>(store: &S, layout: &Layout) -> Result<Dataset> {
    let mut df = store.load_frame(&layout.test_set())?;
    let labels = df
        .drop_in_place(TARGET)
        .map_err(|_| TepError::validation("test set has no 'target' column"))?
        .as_materialized_series()
        .clone()
        .with_name(FAULT_NUMBER.into());
    Ok(Dataset {
        features: df,
        labels,
    })
}
