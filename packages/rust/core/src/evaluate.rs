//! Cascade evaluation on the archived test set.
//!
//! The detector sees every row; rows it flags as faulty are passed on to the
//! diagnostician, whose prediction becomes the final label.

use std::fmt;

use serde::Serialize;
use tracing::{info, instrument};

use tepdiag_shared::{Layout, ModelKind, Result, TepError};
use tepdiag_storage::{ArtifactStore, StoreExt};

use crate::frame::{feature_rows, series_i64};
use crate::loader::load_test_set;
use crate::model::FaultClassifier;
use crate::split::Dataset;

/// Binary detection metrics, fault (label > 0) being the positive class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub fpr: f64,
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_count: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Confusion-matrix metrics over fault numbers; any value above zero counts
/// as "fault".
pub fn compute_detection_metrics(predictions: &[i64], labels: &[i64]) -> Result<DetectionMetrics> {
    if predictions.len() != labels.len() {
        return Err(TepError::validation(format!(
            "{} predictions for {} labels",
            predictions.len(),
            labels.len()
        )));
    }

    let (mut tp, mut fp, mut tn, mut fn_count) = (0, 0, 0, 0);
    for (&pred, &label) in predictions.iter().zip(labels) {
        match (pred > 0, label > 0) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_count += 1,
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_count);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Ok(DetectionMetrics {
        accuracy: ratio(tp + tn, predictions.len()),
        precision,
        recall,
        f1,
        fpr: ratio(fp, fp + tn),
        tp,
        fp,
        tn,
        fn_count,
    })
}

impl fmt::Display for DetectionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "acc={:.4} prec={:.4} rec={:.4} f1={:.4} fpr={:.4} (tp={} fp={} tn={} fn={})",
            self.accuracy,
            self.precision,
            self.recall,
            self.f1,
            self.fpr,
            self.tp,
            self.fp,
            self.tn,
            self.fn_count,
        )
    }
}

/// Metrics for the whole cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeMetrics {
    pub detection: DetectionMetrics,
    /// Diagnostician accuracy on truly faulty rows, independent of the detector.
    pub diagnosis_accuracy: f64,
    /// Exact-label accuracy of the cascade output over all rows.
    pub cascade_accuracy: f64,
    pub rows: usize,
    /// Rows the detector flagged and the diagnostician labeled.
    pub diagnosed_rows: usize,
}

impl fmt::Display for CascadeMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "detector:      {}", self.detection)?;
        writeln!(f, "diagnostician: acc={:.4}", self.diagnosis_accuracy)?;
        write!(
            f,
            "cascade:       acc={:.4} ({} rows, {} diagnosed)",
            self.cascade_accuracy, self.rows, self.diagnosed_rows
        )
    }
}

/// Final labels: 0 where the detector sees normal operation, the
/// diagnostician's fault number elsewhere.
pub fn cascade_predict(
    detector: &FaultClassifier,
    diagnostician: &FaultClassifier,
    rows: &[Vec<f64>],
) -> Result<Vec<i64>> {
    let detected = detector.predict_rows(rows)?;

    let flagged: Vec<Vec<f64>> = rows
        .iter()
        .zip(&detected)
        .filter(|(_, d)| **d > 0)
        .map(|(row, _)| row.clone())
        .collect();
    let mut diagnoses = diagnostician.predict_rows(&flagged)?.into_iter();

    detected
        .into_iter()
        .map(|d| {
            if d > 0 {
                diagnoses
                    .next()
                    .ok_or_else(|| TepError::model("diagnostician returned too few predictions"))
            } else {
                Ok(0)
            }
        })
        .collect()
}

/// Evaluate both stages against a labeled dataset.
pub fn evaluate_dataset(
    detector: &FaultClassifier,
    diagnostician: &FaultClassifier,
    dataset: &Dataset,
) -> Result<CascadeMetrics> {
    if detector.feature_names() != diagnostician.feature_names() {
        return Err(TepError::validation(
            "detector and diagnostician were trained on different features",
        ));
    }

    let labels = series_i64(&dataset.labels)?;
    let rows = feature_rows(&dataset.features, detector.feature_names())?;

    let detected = detector.predict_rows(&rows)?;
    let detection = compute_detection_metrics(&detected, &labels)?;

    let (faulty_rows, faulty_labels): (Vec<Vec<f64>>, Vec<i64>) = rows
        .iter()
        .zip(&labels)
        .filter(|(_, label)| **label > 0)
        .map(|(row, label)| (row.clone(), *label))
        .unzip();
    let diagnosed = diagnostician.predict_rows(&faulty_rows)?;
    let correct = diagnosed
        .iter()
        .zip(&faulty_labels)
        .filter(|(p, l)| p == l)
        .count();

    let final_labels = cascade_predict(detector, diagnostician, &rows)?;
    let cascade_correct = final_labels
        .iter()
        .zip(&labels)
        .filter(|(p, l)| p == l)
        .count();

    Ok(CascadeMetrics {
        detection,
        diagnosis_accuracy: ratio(correct, faulty_labels.len()),
        cascade_accuracy: ratio(cascade_correct, labels.len()),
        rows: labels.len(),
        diagnosed_rows: detected.iter().filter(|d| **d > 0).count(),
    })
}

/// Load the archived test set and both models, then evaluate.
#[instrument(skip_all, fields(test_set = %layout.test_set().display()))]
pub fn evaluate<S: ArtifactStore + ?Sized>(store: &S, layout: &Layout) -> Result<CascadeMetrics> {
    let test = load_test_set(store, layout)?;
    let detector: FaultClassifier = store.load_json(&layout.model(ModelKind::Detector))?;
    let diagnostician: FaultClassifier =
        store.load_json(&layout.model(ModelKind::Diagnostician))?;

    let metrics = evaluate_dataset(&detector, &diagnostician, &test)?;
    info!(
        rows = metrics.rows,
        detection_accuracy = metrics.detection.accuracy,
        diagnosis_accuracy = metrics.diagnosis_accuracy,
        cascade_accuracy = metrics.cascade_accuracy,
        "evaluation complete"
    );
    Ok(metrics)
}
