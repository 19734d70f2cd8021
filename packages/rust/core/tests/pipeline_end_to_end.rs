//! Full pipeline over a synthetic TEP dataset.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use tepdiag_core::{
    CascadeState, PhaseOutcome, RunOptions, SilentProgress, load_test_set, run_pipeline,
};
use tepdiag_shared::{
    FAULTY_TRAIN_FILE, ForestParams, Layout, METADATA_COLUMNS, NORMAL_TRAIN_FILE, PipelineConfig,
    RAW_CSV_FILES, TepError,
};
use tepdiag_storage::{ArtifactStore, FsStore, MemoryStore};

const ROWS_PER_RUN: usize = 100;

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tep-e2e-test-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Sensor values for fault `f` sit around `10 * f`, well apart between faults.
fn sensor_row(fault: usize, run: usize, sample: usize) -> String {
    let wobble = ((run * 7 + sample * 13) % 10) as f64 * 0.05;
    let base = fault as f64 * 10.0;
    format!(
        "{:.3},{:.3},{:.3}",
        base + wobble,
        -base + wobble,
        base * 0.5 - wobble
    )
}

/// Normal runs omit `faultNumber`, as the merge stage must label them.
fn normal_csv(runs: usize) -> String {
    let mut csv = String::from("simulationRun,sample,xmeas_1,xmeas_2,xmv_1\n");
    for run in 1..=runs {
        for sample in 1..=ROWS_PER_RUN {
            writeln!(csv, "{run},{sample},{}", sensor_row(0, run, sample)).unwrap();
        }
    }
    csv
}

fn faulty_csv(faults: &[usize], runs: usize) -> String {
    let mut csv = String::from("faultNumber,simulationRun,sample,xmeas_1,xmeas_2,xmv_1\n");
    for &fault in faults {
        for run in 1..=runs {
            for sample in 1..=ROWS_PER_RUN {
                writeln!(csv, "{fault},{run},{sample},{}", sensor_row(fault, run, sample))
                    .unwrap();
            }
        }
    }
    csv
}

/// Writes the four raw CSVs: 10 normal runs and 5 runs each of faults 1 and 2.
fn write_source() -> PathBuf {
    let dir = temp_dir();
    let normal = normal_csv(10);
    let faulty = faulty_csv(&[1, 2], 5);
    for name in RAW_CSV_FILES {
        let body = if name.starts_with("fault_free") {
            &normal
        } else {
            &faulty
        };
        std::fs::write(dir.join(name), body).unwrap();
    }
    dir
}

fn config() -> PipelineConfig {
    let small = ForestParams {
        n_trees: 10,
        max_depth: Some(6),
        min_samples_leaf: 1,
        min_samples_split: 2,
        seed: 11,
    };
    let mut config = PipelineConfig::default();
    config.models.detector = small.clone();
    config.models.diagnostician = small;
    config
}

fn options(source: PathBuf) -> RunOptions {
    let mut options = RunOptions::from_config(&config());
    options.source = Some(source);
    options
}

#[test]
fn end_to_end_in_memory() {
    let source = write_source();
    let store = MemoryStore::new();
    let config = config();
    let layout = Layout::from(&config);
    let options = options(source.clone());

    let summary = run_pipeline(&store, &config, &options, &SilentProgress).unwrap();

    assert_eq!(summary.fetch.imported.len(), 4);
    assert_eq!(summary.convert.converted.len(), 4);
    assert_eq!(summary.master_rows, 20 * ROWS_PER_RUN);

    // 20 runs at test_size 0.2 hold out 4 whole runs.
    assert_eq!(summary.test_runs.len(), 4);
    assert_eq!(summary.test_rows, 4 * ROWS_PER_RUN);
    assert_eq!(summary.train_rows + summary.test_rows, summary.master_rows);

    assert!(summary.train.detector.was_trained());
    assert!(summary.train.diagnostician.was_trained());
    assert_eq!(summary.train.state, CascadeState::DiagnosticianTrained);

    let test = load_test_set(&store, &layout).unwrap();
    let columns: BTreeSet<String> = test
        .features
        .get_column_names_owned()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(
        columns,
        BTreeSet::from(["xmeas_1", "xmeas_2", "xmv_1"].map(String::from))
    );
    assert!(METADATA_COLUMNS.iter().all(|m| !columns.contains(*m)));

    let metrics = summary.metrics.unwrap();
    assert_eq!(metrics.rows, 4 * ROWS_PER_RUN);
    assert!(metrics.cascade_accuracy > 0.9, "{metrics}");
    assert!(metrics.detection.accuracy > 0.9, "{metrics}");

    let _ = std::fs::remove_dir_all(&source);
}

#[test]
fn rerun_is_a_no_op() {
    let source = write_source();
    let store = MemoryStore::new();
    let config = config();
    let layout = Layout::from(&config);
    let options = options(source.clone());

    run_pipeline(&store, &config, &options, &SilentProgress).unwrap();
    let writes = store.writes();
    let master = store.fingerprint(&layout.master()).unwrap();
    let detector = store
        .fingerprint(&layout.model(tepdiag_shared::ModelKind::Detector))
        .unwrap();

    let again = run_pipeline(&store, &config, &options, &SilentProgress).unwrap();
    assert!(again.fetch.already_present());
    assert!(again.convert.converted.is_empty());
    assert_eq!(again.train.detector, PhaseOutcome::Skipped);
    assert_eq!(again.train.diagnostician, PhaseOutcome::Skipped);

    assert_eq!(store.writes(), writes);
    assert_eq!(store.fingerprint(&layout.master()).unwrap(), master);
    assert_eq!(
        store
            .fingerprint(&layout.model(tepdiag_shared::ModelKind::Detector))
            .unwrap(),
        detector
    );

    let _ = std::fs::remove_dir_all(&source);
}

#[test]
fn end_to_end_on_disk() {
    let source = write_source();
    let root = temp_dir();
    let store = FsStore::new(&root);
    let config = config();
    let mut options = options(source.clone());
    options.evaluate = false;

    let summary = run_pipeline(&store, &config, &options, &SilentProgress).unwrap();
    assert!(summary.metrics.is_none());

    for key in [
        "data/raw/tep-csv/faulty_training.csv",
        "data/processed/parquet/fault_free_training.parquet",
        "data/processed/tep_master.parquet",
        "data/processed/subsets/TEP_subset_N50.parquet",
        "data/processed/final/test_set_final.parquet",
        "models/tep_detector.json",
        "models/tep_diagnostician.json",
        "config/cache.yaml",
    ] {
        assert!(root.join(key).is_file(), "{key} missing");
    }

    let _ = std::fs::remove_dir_all(&source);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn missing_merge_inputs_are_fatal() {
    let source = temp_dir();
    // Only the testing files exist, so nothing feeds the merge.
    std::fs::write(source.join("faulty_testing.csv"), faulty_csv(&[1], 1)).unwrap();
    assert!(!source.join(FAULTY_TRAIN_FILE).exists());
    assert!(!source.join(NORMAL_TRAIN_FILE).exists());

    let store = MemoryStore::new();
    let err = run_pipeline(&store, &config(), &options(source.clone()), &SilentProgress)
        .unwrap_err();
    assert!(matches!(err, TepError::MissingArtifact { .. }), "{err}");

    let _ = std::fs::remove_dir_all(&source);
}

#[test]
fn training_csvs_alone_run_without_a_source() {
    let store = MemoryStore::new();
    let config = config();
    let layout = Layout::from(&config);
    store
        .save(&layout.raw_csv(NORMAL_TRAIN_FILE), normal_csv(10).as_bytes())
        .unwrap();
    store
        .save(&layout.raw_csv(FAULTY_TRAIN_FILE), faulty_csv(&[1, 2], 5).as_bytes())
        .unwrap();

    let options = options(PathBuf::from("/nonexistent/kagglehub/tep"));
    let summary = run_pipeline(&store, &config, &options, &SilentProgress).unwrap();

    assert!(summary.fetch.already_present());
    assert_eq!(summary.convert.converted.len(), 2);
    assert_eq!(summary.convert.missing.len(), 2);
    assert_eq!(summary.master_rows, 20 * ROWS_PER_RUN);
    assert_eq!(summary.train.state, CascadeState::DiagnosticianTrained);
}
