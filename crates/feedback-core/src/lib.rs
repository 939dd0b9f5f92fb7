//! Feedback Core Library
//!
//! Risk-gated feedback loop for predictive market models: feedback events
//! are assessed against risk thresholds and compliance rules, and only
//! permitted events retrain the current model snapshot.

pub mod clock;
pub mod compliance;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod feedback_loop;
pub mod fitting;
pub mod market_data;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod risk;
pub mod telemetry;
pub mod updater;
pub mod worker;

pub use domain::{
    error_chain, signals, ActionDescriptor, ConfigError, FeedbackError, FeedbackEvent, FitError,
    ModelMetrics, ModelSnapshot, PredictError, ReceivedFeedback, Result, UpdateError, WorkerError,
};

pub use clock::{Clock, ManualClock, SystemClock};
pub use compliance::{ComplianceChecker, ComplianceRule, ComplianceRules, ComplianceViolation};
pub use config::FeedbackConfig;
pub use dataset::{DataProcessor, Dataset, FeatureScaler, Table};
pub use feedback_loop::{FeedbackLoop, FeedbackOutcome, LoopPhase, LoopState};
pub use fitting::{FitOutcome, LinearModel, LinearRegressionFitter, ModelFitter};
pub use market_data::{FeedbackSource, MarketDataCollector, MarketDataConfig};
pub use orchestrator::{AiModelOrchestrator, TrainingMetrics, TrainingResult, TrainingStatus};
pub use risk::{DenyReason, RiskAssessment, RiskConfig, RiskManager, Verdict};
pub use updater::{ModelUpdater, UpdaterConfig};
pub use worker::{spawn_worker, FeedbackSender, FeedbackWorker, PendingOutcome};

/// Crate version, reported by the binaries.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
