//! Risk gate.
//!
//! Evaluates an [`ActionDescriptor`] against per-category thresholds and the
//! [`ComplianceChecker`] to produce a [`RiskAssessment`], the permit/deny
//! decision that blocks or allows a model update.
//!
//! Checks run in a fixed order so that each denial carries a distinct reason:
//!
//! 1. malformed descriptor → `invalid_action`
//! 2. category without a configured threshold → `unconfigured_category`
//! 3. `|magnitude| >= threshold` → `threshold_exceeded`
//! 4. compliance failure → `compliance_violation`
//!
//! A missing threshold is never read as "no limit".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::compliance::ComplianceChecker;
use crate::domain::error::ConfigError;
use crate::domain::feedback::ActionDescriptor;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-category numeric limits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub risk_thresholds: BTreeMap<String, f64>,
}

impl RiskConfig {
    /// Add or replace a category threshold (builder pattern).
    pub fn with_threshold(mut self, category: impl Into<String>, limit: f64) -> Self {
        self.risk_thresholds.insert(category.into(), limit);
        self
    }

    /// Thresholds must be finite and non-negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (category, value) in &self.risk_thresholds {
            if !value.is_finite() || *value < 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    category: category.clone(),
                    value: *value,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Permit,
    Deny,
}

/// Why an action was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    InvalidAction,
    UnconfiguredCategory,
    ThresholdExceeded,
    ComplianceViolation,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidAction => "invalid_action",
            Self::UnconfiguredCategory => "unconfigured_category",
            Self::ThresholdExceeded => "threshold_exceeded",
            Self::ComplianceViolation => "compliance_violation",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one risk assessment. Created fresh per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub verdict: Verdict,
    /// Set exactly when `verdict` is `Deny`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// Human-readable explanation of the denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RiskAssessment {
    fn permit() -> Self {
        Self {
            verdict: Verdict::Permit,
            reason: None,
            detail: None,
        }
    }

    pub(crate) fn deny(reason: DenyReason, detail: impl Into<String>) -> Self {
        Self::from_denial(reason, Some(detail.into()))
    }

    pub(crate) fn from_denial(reason: DenyReason, detail: Option<String>) -> Self {
        Self {
            verdict: Verdict::Deny,
            reason: Some(reason),
            detail,
        }
    }

    pub fn is_permitted(&self) -> bool {
        self.verdict == Verdict::Permit
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Read-only gate combining thresholds and compliance.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    compliance: ComplianceChecker,
}

impl RiskManager {
    pub fn new(config: RiskConfig, compliance: ComplianceChecker) -> Self {
        Self { config, compliance }
    }

    pub fn threshold_for(&self, category: &str) -> Option<f64> {
        self.config.risk_thresholds.get(category).copied()
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Assess a proposed action. Never fails; malformed input is a denial.
    pub fn assess_risk(&self, action: &ActionDescriptor) -> RiskAssessment {
        let (category, magnitude) = match action.validated() {
            Ok(fields) => fields,
            Err(err) => return RiskAssessment::deny(DenyReason::InvalidAction, err.to_string()),
        };

        let Some(threshold) = self.threshold_for(category) else {
            return RiskAssessment::deny(
                DenyReason::UnconfiguredCategory,
                format!("no risk threshold configured for category '{category}'"),
            );
        };

        // RiskConfig::validate is not on this path; a NaN or negative limit
        // is treated like a missing one.
        if !threshold.is_finite() || threshold < 0.0 {
            return RiskAssessment::deny(
                DenyReason::UnconfiguredCategory,
                format!("risk threshold for '{category}' is not a usable limit ({threshold})"),
            );
        }

        if magnitude.abs() >= threshold {
            return RiskAssessment::deny(
                DenyReason::ThresholdExceeded,
                format!("magnitude {magnitude} >= threshold {threshold} for '{category}'"),
            );
        }

        if let Some(violation) = self.compliance.first_violation(action) {
            return RiskAssessment::deny(DenyReason::ComplianceViolation, violation.reason);
        }

        RiskAssessment::permit()
    }
}
