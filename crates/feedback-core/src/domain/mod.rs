//! Domain models for the feedback loop.
//!
//! - `FeedbackEvent`: signals describing observed market outcomes
//! - `ActionDescriptor`: the risk-relevant view of a proposed action
//! - `ModelSnapshot`: the currently active trained model
//! - error taxonomy shared by every component

pub mod error;
pub mod feedback;
pub mod snapshot;

pub use error::{
    error_chain, ConfigError, FeedbackError, FitError, PredictError, Result, UpdateError,
    WorkerError,
};
pub use feedback::{signals, ActionDescriptor, FeedbackEvent, ReceivedFeedback};
pub use snapshot::{ModelMetrics, ModelSnapshot};
