use std::sync::Arc;

use feedback_core::{
    AiModelOrchestrator, LinearRegressionFitter, PredictError, Table, TrainingStatus,
};
use serde_json::{json, Map, Value};

fn orchestrator() -> AiModelOrchestrator {
    AiModelOrchestrator::new(Arc::new(LinearRegressionFitter::default()))
}

fn row(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

fn housing(n: usize) -> Table {
    Table::new(
        (0..n)
            .map(|i| {
                let rooms = (i % 5 + 1) as f64;
                let age = (i * 3 % 11) as f64;
                row(json!({"rooms": rooms, "age": age, "price": 50.0 * rooms - 2.0 * age + 100.0}))
            })
            .collect(),
    )
}

#[tokio::test]
async fn train_reports_accuracy_and_predicts() {
    let orch = orchestrator();
    let result = orch.train(&housing(30), "price").await;
    assert_eq!(result.status, TrainingStatus::Success);
    assert!(result.error.is_none());
    assert!(result.metrics.unwrap().accuracy > 0.999);

    let snapshot = orch.current().unwrap();
    assert_eq!(snapshot.feature_names, vec!["age", "rooms"]);
    assert_eq!(snapshot.digest.len(), 64);

    let p = orch.predict(&row(json!({"rooms": 3, "age": 4}))).unwrap();
    assert!((p - 242.0).abs() < 1e-6);
}

#[tokio::test]
async fn retraining_same_data_gives_same_digest() {
    let orch = orchestrator();
    orch.train(&housing(30), "price").await;
    let first = orch.current().unwrap();
    orch.train(&housing(30), "price").await;
    let second = orch.current().unwrap();
    assert_eq!(first.digest, second.digest);
    assert_ne!(first.snapshot_id, second.snapshot_id);
}

#[tokio::test]
async fn failures_keep_previous_snapshot() {
    let orch = orchestrator();
    assert!(orch.train(&housing(30), "price").await.is_success());
    let before = orch.current().unwrap();

    let empty = orch.train(&Table::new(Vec::new()), "price").await;
    assert_eq!(empty.status, TrainingStatus::Failure);

    let missing = orch.train(&housing(30), "rent").await;
    assert!(missing.error.unwrap().contains("rent"));

    let text = Table::new(vec![row(json!({"x": "a", "price": 1})); 10]);
    let malformed = orch.train(&text, "price").await;
    assert!(malformed.error.unwrap().contains("malformed"));

    let flat = Table::new(
        (0..10)
            .map(|i| row(json!({"x": i, "price": 7.0})))
            .collect(),
    );
    let unscored = orch.train(&flat, "price").await;
    assert!(unscored.error.unwrap().contains("score"));

    assert_eq!(orch.current().unwrap().digest, before.digest);
    assert_eq!(orch.current().unwrap().snapshot_id, before.snapshot_id);
}

#[tokio::test]
async fn predict_validates_input() {
    let orch = orchestrator();
    assert_eq!(
        orch.predict(&row(json!({"rooms": 1, "age": 1}))),
        Err(PredictError::NoModel)
    );

    orch.train(&housing(30), "price").await;
    assert_eq!(
        orch.predict(&row(json!({"rooms": 1}))),
        Err(PredictError::MissingFeature("age".to_string()))
    );
    assert_eq!(
        orch.predict(&row(json!({"rooms": 1, "age": "old"}))),
        Err(PredictError::NonNumeric("age".to_string()))
    );
}
