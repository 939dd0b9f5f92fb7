//! Structured observability hooks for feedback loop events.
//!
//! Every event carries a stable `event = "..."` key so log pipelines can
//! filter on it. Denials are logged at `info!` (warn for an unconfigured
//! category, which usually means a config gap); faults at `error!` with the
//! full cause chain.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::orchestrator::TrainingResult;
use crate::risk::{DenyReason, RiskAssessment};

/// Span tagged with the feedback id; instrument one `process_feedback` call
/// with it so nested logs inherit the id.
pub fn feedback_span(feedback_id: &Uuid) -> tracing::Span {
    tracing::info_span!("feedback", feedback_id = %feedback_id)
}

pub fn emit_feedback_received(feedback_id: &Uuid, signal_count: usize, received_at: DateTime<Utc>) {
    info!(
        event = "feedback.received",
        feedback_id = %feedback_id,
        signals = signal_count,
        received_at = %received_at,
    );
}

pub fn emit_risk_assessed(category: Option<&str>, assessment: &RiskAssessment) {
    info!(
        event = "risk.assessed",
        category = category.unwrap_or("<none>"),
        permitted = assessment.is_permitted(),
        reason = assessment.reason.map(DenyReason::as_str).unwrap_or(""),
    );
}

pub fn emit_feedback_denied(feedback_id: &Uuid, assessment: &RiskAssessment) {
    let reason = assessment.reason.map(DenyReason::as_str).unwrap_or("");
    let detail = assessment.detail.as_deref().unwrap_or("");
    if assessment.reason == Some(DenyReason::UnconfiguredCategory) {
        warn!(event = "feedback.denied", feedback_id = %feedback_id, reason, detail);
    } else {
        info!(event = "feedback.denied", feedback_id = %feedback_id, reason, detail);
    }
}

pub fn emit_update_applied(
    feedback_id: &Uuid,
    snapshot_id: &Uuid,
    accuracy: f64,
    applied_at: DateTime<Utc>,
) {
    info!(
        event = "update.applied",
        feedback_id = %feedback_id,
        snapshot_id = %snapshot_id,
        accuracy,
        applied_at = %applied_at,
    );
}

/// `error` is the already-rendered cause chain.
pub fn emit_update_failed(feedback_id: &Uuid, error: &str) {
    error!(event = "update.failed", feedback_id = %feedback_id, error);
}

pub fn emit_training_finished(target: &str, result: &TrainingResult) {
    match (&result.metrics, &result.error) {
        (Some(m), _) => info!(
            event = "training.finished",
            target_column = target,
            success = true,
            accuracy = m.accuracy,
        ),
        (None, error) => error!(
            event = "training.finished",
            target_column = target,
            success = false,
            error = error.as_deref().unwrap_or("unknown"),
        ),
    }
}

pub fn emit_market_data_fetched(data_type: &str, endpoint: &str, fields: usize) {
    info!(event = "market_data.fetched", data_type, endpoint, fields);
}

pub fn emit_market_data_fetch_failed(data_type: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "market_data.fetch_failed", data_type, reason = %reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_span_create() {
        let id = Uuid::new_v4();
        let span = feedback_span(&id);
        let _entered = span.enter();
        emit_feedback_received(&id, 3, Utc::now());
    }
}
