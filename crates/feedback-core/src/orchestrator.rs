//! AI model orchestrator: owner of the current model snapshot.
//!
//! Exactly one snapshot is current at any time. Replacement is a single
//! pointer swap under a write lock, so readers observe either the old or the
//! new snapshot, never a mix.
//!
//! A standalone orchestrator trains on demand. Once handed to a
//! [`FeedbackLoop`](crate::FeedbackLoop) it is owned by the loop, and the only
//! way to replace its snapshot is a permitted feedback update.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dataset::{DataProcessor, Table};
use crate::domain::error::{error_chain, PredictError};
use crate::domain::snapshot::ModelSnapshot;
use crate::fitting::ModelFitter;
use crate::metrics::METRICS;
use crate::obs::emit_training_finished;
use crate::updater::train_snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
}

/// Summary of one `train` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub status: TrainingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrainingResult {
    fn success(accuracy: f64) -> Self {
        Self {
            status: TrainingStatus::Success,
            metrics: Some(TrainingMetrics { accuracy }),
            error: None,
        }
    }

    fn failure(error: String) -> Self {
        Self {
            status: TrainingStatus::Failure,
            metrics: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TrainingStatus::Success
    }
}

pub struct AiModelOrchestrator {
    current: RwLock<Option<Arc<ModelSnapshot>>>,
    fitter: Arc<dyn ModelFitter>,
    processor: DataProcessor,
}

impl AiModelOrchestrator {
    pub fn new(fitter: Arc<dyn ModelFitter>) -> Self {
        Self {
            current: RwLock::new(None),
            fitter,
            processor: DataProcessor::new(),
        }
    }

    /// Train a fresh snapshot from a labeled table and make it current.
    ///
    /// Failures (empty data, missing target, fitting errors) are reported in
    /// the result and leave the previous snapshot in place. Use this to
    /// bootstrap a snapshot before the orchestrator joins a loop.
    pub async fn train(&self, data: &Table, target: &str) -> TrainingResult {
        let result = match train_snapshot(self.fitter.as_ref(), &self.processor, data, target).await {
            Ok(snapshot) => {
                let accuracy = snapshot.accuracy();
                self.install(snapshot);
                METRICS.inc_trainings();
                TrainingResult::success(accuracy)
            }
            Err(err) => TrainingResult::failure(error_chain(&err)),
        };
        emit_training_finished(target, &result);
        result
    }

    /// Replace the current snapshot in one step and return the new one.
    /// Inside a loop this is only reached with the commit lock held.
    pub(crate) fn install(&self, snapshot: ModelSnapshot) -> Arc<ModelSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub fn current(&self) -> Option<Arc<ModelSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn predict(&self, row: &Map<String, Value>) -> Result<f64, PredictError> {
        let snapshot = self.current().ok_or(PredictError::NoModel)?;
        snapshot.predict(row)
    }
}

impl std::fmt::Debug for AiModelOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiModelOrchestrator")
            .field("current", &self.current().map(|s| s.snapshot_id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::LinearRegressionFitter;
    use serde_json::json;

    fn orchestrator() -> AiModelOrchestrator {
        AiModelOrchestrator::new(Arc::new(LinearRegressionFitter::default()))
    }

    fn table(n: usize) -> Table {
        let rows = (0..n)
            .map(|i| {
                let x = i as f64;
                json!({"x": x, "y": 4.0 * x - 2.0}).as_object().cloned().unwrap()
            })
            .collect();
        Table::new(rows)
    }

    #[tokio::test]
    async fn test_train_installs_snapshot() {
        let orch = orchestrator();
        assert!(orch.current().is_none());
        let result = orch.train(&table(10), "y").await;
        assert!(result.is_success());
        assert!(result.metrics.unwrap().accuracy > 0.999);
        assert!(orch.current().is_some());

        let p = orch.predict(json!({"x": 3}).as_object().unwrap()).unwrap();
        assert!((p - 10.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_failed_train_keeps_previous() {
        let orch = orchestrator();
        orch.train(&table(10), "y").await;
        let before = orch.current().unwrap();

        let result = orch.train(&table(10), "missing").await;
        assert_eq!(result.status, TrainingStatus::Failure);
        assert!(result.error.unwrap().contains("missing"));
        assert_eq!(orch.current().unwrap().digest, before.digest);
    }

    #[tokio::test]
    async fn test_install_swaps_whole_snapshot() {
        let source = orchestrator();
        source.train(&table(10), "y").await;
        let trained = source.current().unwrap();

        let target = orchestrator();
        let installed = target.install((*trained).clone());
        assert_eq!(installed.digest, trained.digest);
        assert_eq!(target.current().unwrap().snapshot_id, trained.snapshot_id);
    }

    #[test]
    fn test_predict_without_model() {
        let orch = orchestrator();
        let err = orch.predict(json!({"x": 1}).as_object().unwrap()).unwrap_err();
        assert_eq!(err, PredictError::NoModel);
    }

    #[test]
    fn test_result_serde_shape() {
        let json = serde_json::to_value(TrainingResult::failure("boom".into())).unwrap();
        assert_eq!(json, json!({"status": "failure", "error": "boom"}));
        let json = serde_json::to_value(TrainingResult::success(0.5)).unwrap();
        assert_eq!(json, json!({"status": "success", "metrics": {"accuracy": 0.5}}));
    }
}
