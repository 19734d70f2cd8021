//! Two-phase detect-then-diagnose training.
//!
//! Phase 1 fits the detector on every row with the binary label
//! `faultNumber > 0`. Phase 2 fits the diagnostician on faulty rows only,
//! predicting the fault number. Each phase is skipped when its model
//! artifact already exists, unless forced.

use polars::prelude::{DataFrame, Series};
use tracing::{info, instrument};

use tepdiag_shared::{Layout, ModelKind, ModelsConfig, Result, TepError};
use tepdiag_storage::{ArtifactStore, StoreExt};

use crate::frame::{feature_names, feature_rows, series_i64};
use crate::model::FaultClassifier;

/// Progress of the cascade, derived from which artifacts exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CascadeState {
    Untrained,
    DetectorTrained,
    DiagnosticianTrained,
}

/// What one phase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Trained { rows: usize, classes: Vec<i64> },
    Skipped,
}

impl PhaseOutcome {
    pub fn was_trained(&self) -> bool {
        matches!(self, Self::Trained { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainReport {
    pub detector: PhaseOutcome,
    pub diagnostician: PhaseOutcome,
    pub state: CascadeState,
}

/// Trains and persists the two cascade stages through an [`ArtifactStore`].
pub struct CascadeTrainer<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
    layout: &'a Layout,
    models: &'a ModelsConfig,
}

impl<'a, S: ArtifactStore + ?Sized> CascadeTrainer<'a, S> {
    pub fn new(store: &'a S, layout: &'a Layout, models: &'a ModelsConfig) -> Self {
        Self {
            store,
            layout,
            models,
        }
    }

    fn is_trained(&self, kind: ModelKind) -> bool {
        self.store.exists(&self.layout.model(kind))
    }

    pub fn state(&self) -> CascadeState {
        match (
            self.is_trained(ModelKind::Detector),
            self.is_trained(ModelKind::Diagnostician),
        ) {
            (true, true) => CascadeState::DiagnosticianTrained,
            (true, false) => CascadeState::DetectorTrained,
            _ => CascadeState::Untrained,
        }
    }

    /// Load a persisted stage.
    pub fn load(&self, kind: ModelKind) -> Result<FaultClassifier> {
        self.store.load_json(&self.layout.model(kind))
    }

    /// Run both phases over the training partition.
    #[instrument(skip_all, fields(rows = features.height(), force))]
    pub fn train(&self, features: &DataFrame, labels: &Series, force: bool) -> Result<TrainReport> {
        let train_detector = force || !self.is_trained(ModelKind::Detector);
        let train_diagnostician = force || !self.is_trained(ModelKind::Diagnostician);

        if !train_detector && !train_diagnostician {
            info!("both models present, skipping training");
            return Ok(TrainReport {
                detector: PhaseOutcome::Skipped,
                diagnostician: PhaseOutcome::Skipped,
                state: CascadeState::DiagnosticianTrained,
            });
        }

        let labels = series_i64(labels)?;
        if labels.len() != features.height() {
            return Err(TepError::validation(format!(
                "{} labels for {} feature rows",
                labels.len(),
                features.height()
            )));
        }
        if train_diagnostician && !labels.iter().any(|&label| label > 0) {
            return Err(TepError::validation(
                "no faulty rows in the training data; cannot train the diagnostician",
            ));
        }

        let names = feature_names(features);
        let rows = feature_rows(features, &names)?;

        let detector = if train_detector {
            let binary: Vec<i64> = labels.iter().map(|&l| i64::from(l > 0)).collect();
            self.fit_and_save(ModelKind::Detector, names.clone(), &rows, &binary)?
        } else {
            info!("detector present, skipping phase 1");
            PhaseOutcome::Skipped
        };

        let diagnostician = if train_diagnostician {
            let (faulty_rows, faulty_labels): (Vec<Vec<f64>>, Vec<i64>) = rows
                .into_iter()
                .zip(labels)
                .filter(|(_, label)| *label > 0)
                .unzip();
            self.fit_and_save(ModelKind::Diagnostician, names, &faulty_rows, &faulty_labels)?
        } else {
            info!("diagnostician present, skipping phase 2");
            PhaseOutcome::Skipped
        };

        Ok(TrainReport {
            detector,
            diagnostician,
            state: self.state(),
        })
    }

    fn fit_and_save(
        &self,
        kind: ModelKind,
        names: Vec<String>,
        rows: &[Vec<f64>],
        labels: &[i64],
    ) -> Result<PhaseOutcome> {
        let model = FaultClassifier::fit(kind, self.models.params(kind), names, rows, labels)?;
        let key = self.layout.model(kind);
        self.store.save_json(&key, &model)?;
        info!(%kind, path = %key.display(), rows = rows.len(), "model saved");

        Ok(PhaseOutcome::Trained {
            rows: rows.len(),
            classes: model.classes().to_vec(),
        })
    }
}
