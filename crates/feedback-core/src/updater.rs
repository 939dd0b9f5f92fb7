//! Model updater: turns approved feedback into a new snapshot.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::dataset::{DataProcessor, Table};
use crate::domain::error::{ConfigError, UpdateError};
use crate::domain::feedback::{signals, FeedbackEvent};
use crate::domain::snapshot::ModelSnapshot;
use crate::fitting::{LinearRegressionFitter, ModelFitter};

/// Settings for retraining from feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Target column used when the feedback names none.
    pub default_target: String,
    /// Share of rows held out for scoring, in (0, 1).
    pub test_fraction: f64,
    /// Feedback with fewer rows is rejected as insufficient.
    pub min_rows: usize,
    /// L2 penalty passed to the linear fitter.
    pub ridge: f64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            default_target: "target".to_string(),
            test_fraction: 0.2,
            min_rows: 5,
            ridge: 0.0,
        }
    }
}

impl UpdaterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_target.trim().is_empty() {
            return Err(ConfigError::InvalidUpdater(
                "default_target must not be empty".to_string(),
            ));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigError::InvalidUpdater(format!(
                "test_fraction {} must be in (0, 1)",
                self.test_fraction
            )));
        }
        if self.min_rows < 3 {
            return Err(ConfigError::InvalidUpdater(format!(
                "min_rows {} must be at least 3",
                self.min_rows
            )));
        }
        if !self.ridge.is_finite() || self.ridge < 0.0 {
            return Err(ConfigError::InvalidUpdater(format!(
                "ridge {} must be finite and non-negative",
                self.ridge
            )));
        }
        Ok(())
    }

    /// The linear fitter these settings describe.
    pub fn fitter(&self) -> LinearRegressionFitter {
        LinearRegressionFitter::new(self.test_fraction).with_ridge(self.ridge)
    }
}

/// Applies validated feedback to produce a new [`ModelSnapshot`].
///
/// The updater never touches the orchestrator; it only builds the candidate
/// snapshot, so a failure leaves the current model untouched.
pub struct ModelUpdater {
    fitter: Arc<dyn ModelFitter>,
    processor: DataProcessor,
    config: UpdaterConfig,
}

impl ModelUpdater {
    pub fn new(fitter: Arc<dyn ModelFitter>, config: UpdaterConfig) -> Self {
        Self {
            fitter,
            processor: DataProcessor::new(),
            config,
        }
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Retrain from the feedback's `data` rows.
    ///
    /// # Errors
    ///
    /// `InsufficientData` when the feedback carries no rows or fewer than
    /// `min_rows`; `MalformedData`/`MissingTarget` for bad tables; `Fit` and
    /// `ScoreUnavailable` from the fitter.
    pub async fn update_models(&self, feedback: &FeedbackEvent) -> Result<ModelSnapshot, UpdateError> {
        let data = feedback.signal(signals::DATA).ok_or_else(|| {
            UpdateError::InsufficientData("feedback carries no 'data' signal".to_string())
        })?;
        let table = Table::from_value(data)?;
        if table.len() < self.config.min_rows {
            return Err(UpdateError::InsufficientData(format!(
                "{} rows, need at least {}",
                table.len(),
                self.config.min_rows
            )));
        }

        let target = match feedback.signal(signals::TARGET) {
            None => self.config.default_target.as_str(),
            Some(Value::String(t)) if !t.trim().is_empty() => t.as_str(),
            Some(other) => {
                return Err(UpdateError::MalformedData(format!(
                    "target signal must be a column name, got {other}"
                )))
            }
        };

        debug!(rows = table.len(), target_column = %target, "retraining from feedback");
        train_snapshot(self.fitter.as_ref(), &self.processor, &table, target).await
    }
}

/// Split, preprocess, fit and package a snapshot.
pub(crate) async fn train_snapshot(
    fitter: &dyn ModelFitter,
    processor: &DataProcessor,
    table: &Table,
    target: &str,
) -> Result<ModelSnapshot, UpdateError> {
    let dataset = table.split_target(target)?;
    let (scaler, features) = processor.preprocess(&dataset);
    let outcome = fitter.fit(&features, &dataset.target).await?;
    if !outcome.score.is_finite() {
        return Err(UpdateError::ScoreUnavailable(format!(
            "fitter returned score {}",
            outcome.score
        )));
    }
    Ok(ModelSnapshot::new(
        outcome.model,
        scaler,
        dataset.feature_names,
        target.to_string(),
        outcome.score,
        outcome.train_rows,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| {
                    let x1 = i as f64;
                    let x2 = ((i * i) % 7) as f64;
                    json!({"x1": x1, "x2": x2, "price": 2.0 * x1 + 3.0 * x2 + 1.0})
                })
                .collect(),
        )
    }

    fn updater() -> ModelUpdater {
        let config = UpdaterConfig {
            default_target: "price".to_string(),
            ..UpdaterConfig::default()
        };
        ModelUpdater::new(Arc::new(config.fitter()), config)
    }

    #[tokio::test]
    async fn test_update_from_feedback() {
        let feedback = FeedbackEvent::default().with_signal("data", rows(20));
        let snap = updater().update_models(&feedback).await.unwrap();
        assert_eq!(snap.target, "price");
        assert_eq!(snap.feature_names, vec!["x1", "x2"]);
        assert!(snap.accuracy() > 0.999);
    }

    #[tokio::test]
    async fn test_target_override() {
        let feedback = FeedbackEvent::default()
            .with_signal("data", rows(20))
            .with_signal("target", json!("x1"));
        let snap = updater().update_models(&feedback).await.unwrap();
        assert_eq!(snap.target, "x1");
    }

    #[tokio::test]
    async fn test_missing_data_signal() {
        let err = updater()
            .update_models(&FeedbackEvent::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn test_empty_dataset() {
        let feedback = FeedbackEvent::default().with_signal("data", json!([]));
        let err = updater().update_models(&feedback).await.unwrap_err();
        assert!(matches!(err, UpdateError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn test_non_string_target_rejected() {
        let feedback = FeedbackEvent::default()
            .with_signal("data", rows(20))
            .with_signal("target", json!(7));
        let err = updater().update_models(&feedback).await.unwrap_err();
        assert!(matches!(err, UpdateError::MalformedData(_)));
    }

    #[test]
    fn test_config_validation() {
        assert!(UpdaterConfig::default().validate().is_ok());
        let bad = UpdaterConfig {
            test_fraction: 1.0,
            ..UpdaterConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = UpdaterConfig {
            min_rows: 2,
            ..UpdaterConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
