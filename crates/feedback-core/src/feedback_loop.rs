//! Feedback loop controller.
//!
//! Receives feedback events, gates them through the [`RiskManager`], applies
//! permitted updates via the [`ModelUpdater`], installs the result in the
//! [`AiModelOrchestrator`] and records when the last update happened.
//!
//! The assess → update → install sequence for one event runs under a single
//! async mutex, so at most one snapshot replacement is in flight and two
//! events can never both be approved against state the other is changing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::FeedbackConfig;
use crate::domain::error::{error_chain, FeedbackError, PredictError, Result};
use crate::domain::feedback::{ActionDescriptor, FeedbackEvent, ReceivedFeedback};
use crate::domain::snapshot::ModelSnapshot;
use crate::fitting::ModelFitter;
use crate::metrics::METRICS;
use crate::obs::{
    emit_feedback_denied, emit_feedback_received, emit_risk_assessed, emit_update_applied,
    emit_update_failed, feedback_span,
};
use crate::orchestrator::AiModelOrchestrator;
use crate::risk::{RiskAssessment, RiskManager};
use crate::updater::ModelUpdater;

/// Process-wide loop state. Only the loop writes it, and only after a
/// successful update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoopState {
    pub last_update_time: Option<DateTime<Utc>>,
}

/// Whether an event is currently between assessment and install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Updating,
}

/// What happened to one feedback event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    /// The gate permitted the event and the new snapshot is current.
    Applied {
        snapshot_id: Uuid,
        accuracy: f64,
        applied_at: DateTime<Utc>,
    },
    /// A policy rejection. Nothing changed.
    Denied(RiskAssessment),
    /// The update faulted. Nothing changed.
    Failed { error: String },
}

impl FeedbackOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

pub struct FeedbackLoop {
    risk: Arc<RiskManager>,
    updater: ModelUpdater,
    orchestrator: AiModelOrchestrator,
    clock: Arc<dyn Clock>,
    state: Mutex<LoopState>,
}

impl FeedbackLoop {
    /// The loop takes ownership of `orchestrator`; train it beforehand to
    /// start from a bootstrap snapshot.
    pub fn new(
        risk: Arc<RiskManager>,
        updater: ModelUpdater,
        orchestrator: AiModelOrchestrator,
    ) -> Self {
        Self {
            risk,
            updater,
            orchestrator,
            clock: Arc::new(SystemClock),
            state: Mutex::new(LoopState::default()),
        }
    }

    /// Wire a loop from configuration. The updater and the orchestrator share
    /// `fitter`.
    pub fn from_config(config: &FeedbackConfig, fitter: Arc<dyn ModelFitter>) -> Result<Self> {
        config.validate()?;
        let risk = Arc::new(config.risk_manager()?);
        let updater = ModelUpdater::new(Arc::clone(&fitter), config.updater.clone());
        let orchestrator = AiModelOrchestrator::new(fitter);
        Ok(Self::new(risk, updater, orchestrator))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The current snapshot: the bootstrap one, or whatever the last permitted
    /// update installed.
    pub fn current(&self) -> Option<Arc<ModelSnapshot>> {
        self.orchestrator.current()
    }

    pub fn predict(&self, row: &Map<String, Value>) -> std::result::Result<f64, PredictError> {
        self.orchestrator.predict(row)
    }

    pub fn risk_manager(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    /// Standalone risk opinion. Never commits anything.
    pub fn assess_risk(&self, action: &ActionDescriptor) -> RiskAssessment {
        let assessment = self.risk.assess_risk(action);
        emit_risk_assessed(action.category.as_deref(), &assessment);
        assessment
    }

    /// `true` exactly when the event passed the gate and its update is now
    /// the current snapshot.
    pub async fn process_feedback(&self, feedback: FeedbackEvent) -> bool {
        self.process_feedback_detailed(feedback).await.is_applied()
    }

    /// Like [`process_feedback`](Self::process_feedback) but tells denials and
    /// faults apart.
    pub async fn process_feedback_detailed(&self, feedback: FeedbackEvent) -> FeedbackOutcome {
        let received = ReceivedFeedback::new(feedback, self.clock.now());
        let span = feedback_span(&received.feedback_id);
        self.process_received(received).instrument(span).await
    }

    pub async fn state(&self) -> LoopState {
        *self.state.lock().await
    }

    /// Waits for any in-flight update before reading.
    pub async fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.state().await.last_update_time
    }

    pub fn phase(&self) -> LoopPhase {
        match self.state.try_lock() {
            Ok(_) => LoopPhase::Idle,
            Err(_) => LoopPhase::Updating,
        }
    }

    async fn process_received(&self, received: ReceivedFeedback) -> FeedbackOutcome {
        METRICS.inc_feedback_received();
        emit_feedback_received(&received.feedback_id, received.event.len(), received.received_at);

        let mut state = self.state.lock().await;
        match self.gated_update(&received.event).await {
            Ok(snapshot) => {
                let snapshot = self.orchestrator.install(snapshot);
                let now = self.clock.now();
                let applied_at = state.last_update_time.map_or(now, |prev| prev.max(now));
                state.last_update_time = Some(applied_at);

                METRICS.inc_updates_applied();
                emit_update_applied(
                    &received.feedback_id,
                    &snapshot.snapshot_id,
                    snapshot.accuracy(),
                    applied_at,
                );
                FeedbackOutcome::Applied {
                    snapshot_id: snapshot.snapshot_id,
                    accuracy: snapshot.accuracy(),
                    applied_at,
                }
            }
            Err(FeedbackError::RiskDenied { reason, detail }) => {
                Self::denied(&received, RiskAssessment::from_denial(reason, detail))
            }
            Err(fault) => {
                let error = error_chain(&fault);
                METRICS.inc_update_failures();
                emit_update_failed(&received.feedback_id, &error);
                FeedbackOutcome::Failed { error }
            }
        }
    }

    /// Assess, then retrain only on permit. Must run under the state lock.
    async fn gated_update(&self, event: &FeedbackEvent) -> Result<ModelSnapshot> {
        let assessment = self.assess_risk(&event.action());
        if let Some(reason) = assessment.reason {
            return Err(FeedbackError::RiskDenied {
                reason,
                detail: assessment.detail,
            });
        }
        Ok(self.updater.update_models(event).await?)
    }

    fn denied(received: &ReceivedFeedback, assessment: RiskAssessment) -> FeedbackOutcome {
        METRICS.inc_feedback_denied();
        emit_feedback_denied(&received.feedback_id, &assessment);
        FeedbackOutcome::Denied(assessment)
    }
}

impl std::fmt::Debug for FeedbackLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackLoop")
            .field("phase", &self.phase())
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::compliance::ComplianceChecker;
    use crate::fitting::LinearRegressionFitter;
    use crate::risk::{DenyReason, RiskConfig};
    use crate::updater::UpdaterConfig;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn rows(n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| {
                    let x = i as f64;
                    json!({"x": x, "target": 3.0 * x + 1.0})
                })
                .collect(),
        )
    }

    fn feedback_loop(clock: Arc<ManualClock>) -> FeedbackLoop {
        let fitter: Arc<dyn ModelFitter> = Arc::new(LinearRegressionFitter::default());
        let risk = RiskManager::new(
            RiskConfig::default().with_threshold("trade_size", 1000.0),
            ComplianceChecker::permissive(),
        );
        FeedbackLoop::new(
            Arc::new(risk),
            ModelUpdater::new(Arc::clone(&fitter), UpdaterConfig::default()),
            AiModelOrchestrator::new(fitter),
        )
        .with_clock(clock)
    }

    fn event(magnitude: f64) -> FeedbackEvent {
        FeedbackEvent::default()
            .with_signal("category", json!("trade_size"))
            .with_signal("magnitude", json!(magnitude))
            .with_signal("data", rows(12))
    }

    #[tokio::test]
    async fn test_applied_records_clock_time() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 9, 30, 0).unwrap();
        let clock = Arc::new(ManualClock::new(t0));
        let fl = feedback_loop(Arc::clone(&clock));

        let outcome = fl.process_feedback_detailed(event(500.0)).await;
        assert!(outcome.is_applied());
        assert_eq!(fl.last_update_time().await, Some(t0));
        assert_eq!(fl.phase(), LoopPhase::Idle);
    }

    #[tokio::test]
    async fn test_denied_reports_reason() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let fl = feedback_loop(clock);
        let outcome = fl.process_feedback_detailed(event(1500.0)).await;
        match outcome {
            FeedbackOutcome::Denied(a) => assert_eq!(a.reason, Some(DenyReason::ThresholdExceeded)),
            other => panic!("expected denial, got {other:?}"),
        }
        assert_eq!(fl.last_update_time().await, None);
        assert!(fl.current().is_none());
    }

    #[tokio::test]
    async fn test_update_fault_is_failed_outcome() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let fl = feedback_loop(clock);
        let ev = FeedbackEvent::default()
            .with_signal("category", json!("trade_size"))
            .with_signal("magnitude", json!(10));
        let outcome = fl.process_feedback_detailed(ev).await;
        match outcome {
            FeedbackOutcome::Failed { error } => assert!(error.contains("insufficient data")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_from_config_reports_configuration_error() {
        let mut config = FeedbackConfig::default();
        config.updater.test_fraction = 2.0;
        let fitter: Arc<dyn ModelFitter> = Arc::new(LinearRegressionFitter::default());
        let err = FeedbackLoop::from_config(&config, fitter).unwrap_err();
        assert!(matches!(err, FeedbackError::Configuration(_)));
        assert!(error_chain(&err).contains("test_fraction"));
    }

    #[test]
    fn test_outcome_serde_shape() {
        let json = serde_json::to_value(FeedbackOutcome::Failed {
            error: "boom".into(),
        })
        .unwrap();
        assert_eq!(json, json!({"outcome": "failed", "error": "boom"}));
    }
}
