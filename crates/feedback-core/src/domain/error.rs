//! Error taxonomy for the feedback loop.
//!
//! Policy rejections ([`FeedbackError::RiskDenied`]) are expected and frequent;
//! faults ([`UpdateError`], [`ConfigError`]) carry their underlying cause so the
//! loop boundary can log the full chain before converting to an outcome.

use crate::risk::DenyReason;

/// Errors produced by a model-fitting collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("need at least {required} rows to fit, got {actual}")]
    NotEnoughRows { required: usize, actual: usize },

    #[error("feature matrix has {rows} rows but target has {targets} values")]
    DimensionMismatch { rows: usize, targets: usize },

    #[error("normal equations are singular (collinear or constant features)")]
    Singular,

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Errors raised while deriving a new model snapshot from feedback.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("insufficient data to retrain: {0}")]
    InsufficientData(String),

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("target column '{0}' not present in data")]
    MissingTarget(String),

    #[error("model fit failed")]
    Fit(#[from] FitError),

    #[error("score could not be computed: {0}")]
    ScoreUnavailable(String),
}

/// Invalid or unreadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid risk threshold for category '{category}': {value}")]
    InvalidThreshold { category: String, value: f64 },

    #[error("invalid compliance pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid compliance bound: {0}")]
    InvalidBound(f64),

    #[error("invalid updater configuration: {0}")]
    InvalidUpdater(String),

    #[error("invalid market data endpoint for '{data_type}': {endpoint}")]
    InvalidEndpoint { data_type: String, endpoint: String },

    #[error("market data timeout must be positive, got {0}s")]
    InvalidTimeout(u64),

    #[error("failed to build http client: {0}")]
    HttpClient(String),

    #[error("failed to read config {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: String, message: String },
}

/// Errors from querying the current model.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PredictError {
    #[error("no trained model is available")]
    NoModel,

    #[error("input is missing feature '{0}'")]
    MissingFeature(String),

    #[error("feature '{0}' is not numeric")]
    NonNumeric(String),
}

/// Errors from the single-consumer feedback worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("feedback worker has shut down")]
    Closed,

    #[error("feedback worker task failed: {0}")]
    Join(String),
}

/// Top-level feedback loop errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("risk denied: {reason}")]
    RiskDenied {
        reason: DenyReason,
        detail: Option<String>,
    },

    #[error("model update failed")]
    Update(#[from] UpdateError),

    #[error("configuration error")]
    Configuration(#[from] ConfigError),
}

impl FeedbackError {
    /// Whether this is a policy rejection rather than a fault.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::RiskDenied { .. } | Self::InvalidAction(_))
    }
}

/// Result type for feedback loop operations.
pub type Result<T> = std::result::Result<T, FeedbackError>;

/// Render an error and all of its sources as `outer: inner: root`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
