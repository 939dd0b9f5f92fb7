//! Feedback events and the action descriptors derived from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::{FeedbackError, Result};

/// Signal names the loop reads from a [`FeedbackEvent`].
pub mod signals {
    /// Risk category, looked up in `risk_thresholds`.
    pub const CATEGORY: &str = "category";
    /// Risk-relevant magnitude compared against the category threshold.
    pub const MAGNITUDE: &str = "magnitude";
    /// Asset class inspected by compliance.
    pub const ASSET_CLASS: &str = "asset_class";
    /// Free-form trading pattern label inspected by compliance.
    pub const PATTERN: &str = "pattern";
    /// Array of row objects used for retraining.
    pub const DATA: &str = "data";
    /// Overrides the configured target column.
    pub const TARGET: &str = "target";
}

/// An external signal describing observed market outcomes.
///
/// A mapping of signal names to JSON values. Arrival metadata is assigned by
/// the loop (see [`ReceivedFeedback`]); the event itself is never mutated
/// after it is handed to the loop.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackEvent {
    signals: BTreeMap<String, Value>,
}

impl FeedbackEvent {
    pub fn new(signals: BTreeMap<String, Value>) -> Self {
        Self { signals }
    }

    /// Build an event from a JSON object. Returns `None` for any other value.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self {
                signals: map.into_iter().collect(),
            }),
            _ => None,
        }
    }

    /// Add a signal (builder pattern).
    pub fn with_signal(mut self, name: impl Into<String>, value: Value) -> Self {
        self.signals.insert(name.into(), value);
        self
    }

    pub fn signal(&self, name: &str) -> Option<&Value> {
        self.signals.get(name)
    }

    pub fn signals(&self) -> &BTreeMap<String, Value> {
        &self.signals
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Derive the view the risk manager inspects.
    pub fn action(&self) -> ActionDescriptor {
        ActionDescriptor::from_feedback(self)
    }
}

/// A feedback event stamped by the loop on arrival.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceivedFeedback {
    pub feedback_id: Uuid,
    pub received_at: DateTime<Utc>,
    pub event: FeedbackEvent,
}

impl ReceivedFeedback {
    pub fn new(event: FeedbackEvent, received_at: DateTime<Utc>) -> Self {
        Self {
            feedback_id: Uuid::new_v4(),
            received_at,
            event,
        }
    }
}

/// The fields of a proposed action that risk assessment inspects.
///
/// Every field is optional so that malformed input can be represented and
/// rejected by the gate instead of failing at construction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub magnitude: Option<f64>,
    #[serde(default)]
    pub asset_class: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl ActionDescriptor {
    pub fn new(category: impl Into<String>, magnitude: f64) -> Self {
        Self {
            category: Some(category.into()),
            magnitude: Some(magnitude),
            asset_class: None,
            pattern: None,
        }
    }

    pub fn with_asset_class(mut self, asset_class: impl Into<String>) -> Self {
        self.asset_class = Some(asset_class.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Read the action fields out of a feedback event.
    ///
    /// Signals of the wrong JSON type are dropped, which later surfaces as an
    /// `invalid_action` denial.
    pub fn from_feedback(event: &FeedbackEvent) -> Self {
        let text = |name: &str| {
            event
                .signal(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            category: text(signals::CATEGORY),
            magnitude: event.signal(signals::MAGNITUDE).and_then(Value::as_f64),
            asset_class: text(signals::ASSET_CLASS),
            pattern: text(signals::PATTERN),
        }
    }

    /// Return `(category, magnitude)` if the descriptor is well formed.
    pub fn validated(&self) -> Result<(&str, f64)> {
        let category = match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => {
                return Err(FeedbackError::InvalidAction(
                    "category is missing or empty".to_string(),
                ))
            }
        };
        let magnitude = self
            .magnitude
            .ok_or_else(|| FeedbackError::InvalidAction("magnitude is missing".to_string()))?;
        if !magnitude.is_finite() {
            return Err(FeedbackError::InvalidAction(format!(
                "magnitude {magnitude} is not finite"
            )));
        }
        Ok((category, magnitude))
    }
}
