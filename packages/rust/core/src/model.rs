//! Scaled random forest classifier, the building block of both cascade stages.

use std::fmt;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::{debug, instrument, warn};

use tepdiag_shared::{ForestParams, ModelKind, Result, TepError};

use crate::frame::feature_rows;

type Forest = RandomForestClassifier<f64, i64, DenseMatrix<f64>, Vec<i64>>;

/// Per-feature standardization: `(x - mean) / std`.
///
/// Uses the population standard deviation; constant features get a scale of
/// 1.0 so they map to zero instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let width = rows.first().map(Vec::len).unwrap_or_default();
        if rows.is_empty() || width == 0 {
            return Err(TepError::validation("cannot fit a scaler on an empty matrix"));
        }
        if rows.iter().any(|row| row.len() != width) {
            return Err(TepError::validation("ragged feature matrix"));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; width];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|acc| {
                let std = (acc / n).sqrt();
                if std > 0.0 { std } else { 1.0 }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.mean.len() {
                    return Err(TepError::validation(format!(
                        "expected {} features, got {}",
                        self.mean.len(),
                        row.len()
                    )));
                }
                Ok(row
                    .iter()
                    .zip(&self.mean)
                    .zip(&self.scale)
                    .map(|((v, m), s)| (v - m) / s)
                    .collect())
            })
            .collect()
    }
}

/// A fitted scaler + random forest for one cascade stage.
///
/// Remembers the feature column order it was trained with, so prediction
/// from a dataframe selects the same columns in the same order. Training data
/// with a single class yields a constant model with no forest.
#[derive(Serialize, Deserialize)]
pub struct FaultClassifier {
    kind: ModelKind,
    feature_names: Vec<String>,
    classes: Vec<i64>,
    scaler: StandardScaler,
    forest: Option<Forest>,
}

impl fmt::Debug for FaultClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultClassifier")
            .field("kind", &self.kind)
            .field("features", &self.feature_names.len())
            .field("classes", &self.classes)
            .finish_non_exhaustive()
    }
}

fn forest_parameters(params: &ForestParams) -> RandomForestClassifierParameters {
    let parameters = RandomForestClassifierParameters::default()
        .with_n_trees(params.n_trees)
        .with_min_samples_leaf(params.min_samples_leaf)
        .with_min_samples_split(params.min_samples_split)
        .with_seed(params.seed);
    match params.max_depth {
        Some(depth) => parameters.with_max_depth(depth),
        None => parameters,
    }
}

impl FaultClassifier {
    /// Fit on row-major features and integer labels.
    #[instrument(skip_all, fields(%kind, rows = rows.len(), n_trees = params.n_trees))]
    pub fn fit(
        kind: ModelKind,
        params: &ForestParams,
        feature_names: Vec<String>,
        rows: &[Vec<f64>],
        labels: &[i64],
    ) -> Result<Self> {
        if rows.is_empty() {
            return Err(TepError::validation(format!("no training rows for the {kind}")));
        }
        if rows.len() != labels.len() {
            return Err(TepError::validation(format!(
                "{} feature rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if rows[0].len() != feature_names.len() {
            return Err(TepError::validation(format!(
                "{} feature names for {} columns",
                feature_names.len(),
                rows[0].len()
            )));
        }

        let scaler = StandardScaler::fit(rows)?;

        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let forest = if classes.len() > 1 {
            let x = DenseMatrix::from_2d_vec(&scaler.transform(rows)?);
            let forest = Forest::fit(&x, &labels.to_vec(), forest_parameters(params))
                .map_err(TepError::model)?;
            debug!(classes = ?classes, "forest fitted");
            Some(forest)
        } else {
            warn!(%kind, class = classes[0], "single class in training data, model is constant");
            None
        };

        Ok(Self {
            kind,
            feature_names,
            classes,
            scaler,
            forest,
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Distinct labels seen during training, ascending.
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let scaled = self.scaler.transform(rows)?;
        match &self.forest {
            Some(forest) => forest
                .predict(&DenseMatrix::from_2d_vec(&scaled))
                .map_err(TepError::model),
            None => Ok(vec![self.classes[0]; scaled.len()]),
        }
    }

    /// Predict from a frame holding (at least) the training feature columns.
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Vec<i64>> {
        self.predict_rows(&feature_rows(df, &self.feature_names)?)
    }
}
