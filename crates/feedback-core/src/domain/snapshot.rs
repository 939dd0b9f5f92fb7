//! Trained model snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::PredictError;
use crate::dataset::FeatureScaler;
use crate::fitting::LinearModel;

/// Evaluation metadata carried with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Held-out R² of the fit.
    pub accuracy: f64,
}

/// A complete trained model plus its evaluation metric.
///
/// Immutable once created. The orchestrator holds exactly one current
/// snapshot and replaces it wholesale; no history is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub snapshot_id: Uuid,
    pub model: LinearModel,
    pub scaler: FeatureScaler,
    pub feature_names: Vec<String>,
    pub target: String,
    pub metrics: ModelMetrics,
    pub trained_rows: usize,
    pub created_at: DateTime<Utc>,
    /// SHA-256 (hex) over the parameters, scaler, feature names and target.
    pub digest: String,
}

impl ModelSnapshot {
    pub fn new(
        model: LinearModel,
        scaler: FeatureScaler,
        feature_names: Vec<String>,
        target: String,
        accuracy: f64,
        trained_rows: usize,
    ) -> Self {
        let digest = parameter_digest(&model, &scaler, &feature_names, &target);
        Self {
            snapshot_id: Uuid::new_v4(),
            model,
            scaler,
            feature_names,
            target,
            metrics: ModelMetrics { accuracy },
            trained_rows,
            created_at: Utc::now(),
            digest,
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.metrics.accuracy
    }

    /// Predict the target for one record keyed by feature name.
    pub fn predict(&self, row: &Map<String, Value>) -> Result<f64, PredictError> {
        let mut raw = Vec::with_capacity(self.feature_names.len());
        for name in &self.feature_names {
            let value = row
                .get(name)
                .ok_or_else(|| PredictError::MissingFeature(name.clone()))?;
            let number = value
                .as_f64()
                .ok_or_else(|| PredictError::NonNumeric(name.clone()))?;
            raw.push(number);
        }
        Ok(self.model.predict(&self.scaler.transform(&raw)))
    }
}

fn parameter_digest(
    model: &LinearModel,
    scaler: &FeatureScaler,
    feature_names: &[String],
    target: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    for name in feature_names {
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
    }
    let numbers = std::iter::once(&model.intercept)
        .chain(&model.coefficients)
        .chain(&scaler.means)
        .chain(&scaler.scales);
    for v in numbers {
        hasher.update(v.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}
