//! Normal + faulty merge into the master dataset.

use polars::prelude::*;
use tracing::{error, info, instrument};

use tepdiag_shared::{FAULT_NUMBER, FAULTY_TRAIN_FILE, Layout, NORMAL_TRAIN_FILE, Result, TepError};
use tepdiag_storage::{ArtifactStore, StoreExt};

/// Stack normal and faulty records into one frame.
///
/// Normal rows without a `faultNumber` column are labeled 0. Columns follow
/// the faulty frame's order and dtypes. When both inputs are empty the result
/// is an empty frame and an error is logged.
pub fn merge_frames(mut normal: DataFrame, faulty: DataFrame) -> Result<DataFrame> {
    if normal.height() == 0 && faulty.height() == 0 {
        error!("normal and faulty frames are both empty, nothing to merge");
        return Ok(DataFrame::empty());
    }

    if normal.width() > 0 && normal.column(FAULT_NUMBER).is_err() {
        let label_dtype = faulty
            .column(FAULT_NUMBER)
            .map(|c| c.dtype().clone())
            .unwrap_or(DataType::Int32);
        let labels = Series::new(FAULT_NUMBER.into(), vec![0i32; normal.height()])
            .cast(&label_dtype)
            .map_err(TepError::data)?;
        normal.with_column(labels).map_err(TepError::data)?;
    }

    if faulty.width() == 0 {
        return Ok(normal);
    }
    if normal.width() == 0 {
        return Ok(faulty);
    }

    // Reorder and cast the normal frame to the faulty schema so the stack is exact.
    let aligned = faulty
        .get_columns()
        .iter()
        .map(|target| {
            let name = target.name().as_str();
            normal
                .column(name)
                .map_err(|_| {
                    TepError::validation(format!("normal data lacks column '{name}'"))
                })?
                .cast(target.dtype())
                .map_err(TepError::data)
        })
        .collect::<Result<Vec<Column>>>()?;

    if aligned.len() != normal.width() {
        return Err(TepError::validation(format!(
            "normal data has {} columns, faulty data has {}",
            normal.width(),
            faulty.width()
        )));
    }

    DataFrame::new(aligned)
        .and_then(|normal| normal.vstack(&faulty))
        .map_err(TepError::data)
}

/// Build (or reuse) the master dataset from the normal and faulty training
/// Parquet mirrors.
///
/// An existing master is returned as-is. Missing inputs are fatal. An empty
/// merge result is returned but not persisted, so a later load still reports
/// the master as missing.
#[instrument(skip_all, fields(master = %layout.master().display()))]
pub fn merge_master<S: ArtifactStore + ?Sized>(store: &S, layout: &Layout) -> Result<DataFrame> {
    let master = layout.master();
    if store.exists(&master) {
        info!("master dataset already present");
        return store.load_frame(&master);
    }

    let faulty_key = layout.raw_parquet(FAULTY_TRAIN_FILE);
    let normal_key = layout.raw_parquet(NORMAL_TRAIN_FILE);

    info!(file = %faulty_key.display(), "reading faulty records");
    let faulty = store.load_frame(&faulty_key)?;
    info!(file = %normal_key.display(), "reading normal records");
    let normal = store.load_frame(&normal_key)?;

    let mut merged = merge_frames(normal, faulty)?;
    if merged.height() == 0 {
        return Ok(merged);
    }

    store.save_frame(&master, &mut merged)?;
    info!(rows = merged.height(), columns = merged.width(), "master dataset saved");

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use tepdiag_shared::PipelineConfig;
    use tepdiag_storage::MemoryStore;

    use super::*;

    fn normal_without_label() -> DataFrame {
        DataFrame::new(vec![
            Series::new("simulationRun".into(), &[1i32, 1, 2]).into(),
            Series::new("sample".into(), &[1i32, 2, 1]).into(),
            Series::new("xmeas_1".into(), &[0.1f32, 0.2, 0.3]).into(),
        ])
        .unwrap()
    }

    fn faulty() -> DataFrame {
        DataFrame::new(vec![
            Series::new("faultNumber".into(), &[3i32, 3]).into(),
            Series::new("simulationRun".into(), &[1i32, 1]).into(),
            Series::new("sample".into(), &[1i32, 2]).into(),
            Series::new("xmeas_1".into(), &[0.9f32, 0.8]).into(),
        ])
        .unwrap()
    }

    fn layout() -> Layout {
        Layout::from(&PipelineConfig::default())
    }

    #[test]
    fn normal_rows_get_label_zero() {
        let merged = merge_frames(normal_without_label(), faulty()).unwrap();
        assert_eq!(merged.height(), 5);
        assert_eq!(
            merged.get_column_names_owned(),
            faulty().get_column_names_owned()
        );

        let labels: Vec<Option<i32>> = merged
            .column("faultNumber")
            .unwrap()
            .as_materialized_series()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(labels, vec![Some(0), Some(0), Some(0), Some(3), Some(3)]);
    }

    #[test]
    fn existing_normal_labels_are_kept() {
        let mut normal = normal_without_label();
        normal
            .with_column(Series::new("faultNumber".into(), &[0i32, 0, 0]))
            .unwrap();
        let merged = merge_frames(normal, faulty()).unwrap();
        assert_eq!(merged.height(), 5);
    }

    #[test]
    fn both_empty_yields_empty() {
        let merged = merge_frames(DataFrame::empty(), DataFrame::empty()).unwrap();
        assert_eq!(merged.height(), 0);
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let mut normal = normal_without_label();
        normal
            .with_column(Series::new("xmv_1".into(), &[1.0f32, 2.0, 3.0]))
            .unwrap();
        assert!(merge_frames(normal, faulty()).is_err());
    }

    #[test]
    fn merge_master_persists_once() {
        let store = MemoryStore::new();
        let layout = layout();
        store
            .save_frame(&layout.raw_parquet(NORMAL_TRAIN_FILE), &mut normal_without_label())
            .unwrap();
        store
            .save_frame(&layout.raw_parquet(FAULTY_TRAIN_FILE), &mut faulty())
            .unwrap();

        let first = merge_master(&store, &layout).unwrap();
        assert!(store.exists(&layout.master()));
        let writes = store.writes();
        let fingerprint = store.fingerprint(&layout.master()).unwrap();

        let second = merge_master(&store, &layout).unwrap();
        assert!(second.equals(&first));
        assert_eq!(store.writes(), writes);
        assert_eq!(store.fingerprint(&layout.master()).unwrap(), fingerprint);
    }

    #[test]
    fn merge_master_requires_inputs() {
        let store = MemoryStore::new();
        let err = merge_master(&store, &layout()).unwrap_err();
        assert!(matches!(err, TepError::MissingArtifact { .. }));
    }

    #[test]
    fn empty_merge_is_not_persisted() {
        let store = MemoryStore::new();
        let layout = layout();
        let mut empty = faulty().head(Some(0));
        store
            .save_frame(&layout.raw_parquet(NORMAL_TRAIN_FILE), &mut empty.clone())
            .unwrap();
        store
            .save_frame(&layout.raw_parquet(FAULTY_TRAIN_FILE), &mut empty)
            .unwrap();

        let merged = merge_master(&store, &layout).unwrap();
        assert_eq!(merged.height(), 0);
        assert!(!store.exists(&layout.master()));
    }
}
