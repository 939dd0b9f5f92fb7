//! Compliance checker: static ethical and policy rules.
//!
//! Evaluates an [`ActionDescriptor`] against a fixed [`ComplianceRules`] set
//! configured at construction. The checker is a pure, deterministic predicate:
//! it holds no mutable state and may be shared freely across threads.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::feedback::ActionDescriptor;

/// Policy rule set consulted by [`ComplianceChecker`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceRules {
    /// Categories that are never permitted (case-insensitive).
    pub prohibited_categories: Vec<String>,
    /// Asset classes that are never permitted (case-insensitive).
    pub prohibited_asset_classes: Vec<String>,
    /// Regular expressions matched against the action's `pattern` label.
    pub prohibited_patterns: Vec<String>,
    /// Absolute ethical bound on magnitude, independent of risk thresholds.
    pub max_abs_magnitude: Option<f64>,
}

impl ComplianceRules {
    /// Standard rules: manipulative-trading patterns and sanctioned assets.
    ///
    /// | Rule              | Values                                        |
    /// |-------------------|-----------------------------------------------|
    /// | categories        | insider_information                           |
    /// | asset classes     | sanctioned                                    |
    /// | patterns          | spoofing, layering, wash trading, pump & dump |
    pub fn standard() -> Self {
        Self {
            prohibited_categories: vec!["insider_information".to_string()],
            prohibited_asset_classes: vec!["sanctioned".to_string()],
            prohibited_patterns: vec![
                "(?i)spoof".to_string(),
                "(?i)layering".to_string(),
                r"(?i)wash[\s_-]*trad".to_string(),
                r"(?i)pump[\s_-]*(and|&)?[\s_-]*dump".to_string(),
            ],
            max_abs_magnitude: None,
        }
    }

    pub fn with_prohibited_category(mut self, category: impl Into<String>) -> Self {
        self.prohibited_categories.push(category.into());
        self
    }

    pub fn with_prohibited_asset_class(mut self, asset_class: impl Into<String>) -> Self {
        self.prohibited_asset_classes.push(asset_class.into());
        self
    }

    pub fn with_prohibited_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.prohibited_patterns.push(pattern.into());
        self
    }

    pub fn with_max_abs_magnitude(mut self, bound: f64) -> Self {
        self.max_abs_magnitude = Some(bound);
        self
    }

    /// Check that patterns compile and the bound is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        compile_patterns(&self.prohibited_patterns)?;
        if let Some(bound) = self.max_abs_magnitude {
            if !bound.is_finite() || bound < 0.0 {
                return Err(ConfigError::InvalidBound(bound));
            }
        }
        Ok(())
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// Which compliance rule an action broke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComplianceRule {
    ProhibitedCategory { category: String },
    ProhibitedAssetClass { asset_class: String },
    ProhibitedPattern { pattern: String },
    EthicalBound { bound: f64 },
}

/// A single compliance violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceViolation {
    pub rule: ComplianceRule,
    pub reason: String,
}

/// Stateless predicate over a fixed rule set.
#[derive(Debug, Clone)]
pub struct ComplianceChecker {
    rules: ComplianceRules,
    patterns: Vec<Regex>,
}

impl ComplianceChecker {
    /// Build a checker, compiling the rule set's patterns once.
    pub fn new(rules: ComplianceRules) -> Result<Self, ConfigError> {
        rules.validate()?;
        let patterns = compile_patterns(&rules.prohibited_patterns)?;
        Ok(Self { rules, patterns })
    }

    /// A checker with no rules; permits everything.
    pub fn permissive() -> Self {
        Self {
            rules: ComplianceRules::default(),
            patterns: Vec::new(),
        }
    }

    pub fn rules(&self) -> &ComplianceRules {
        &self.rules
    }

    /// `false` if the action matches any prohibited rule.
    pub fn check(&self, action: &ActionDescriptor) -> bool {
        self.first_violation(action).is_none()
    }

    /// The first rule the action breaks, in rule-set order: category, asset
    /// class, pattern, ethical bound.
    pub fn first_violation(&self, action: &ActionDescriptor) -> Option<ComplianceViolation> {
        if let Some(category) = action.category.as_deref() {
            if contains_ignore_case(&self.rules.prohibited_categories, category) {
                return Some(ComplianceViolation {
                    rule: ComplianceRule::ProhibitedCategory {
                        category: category.to_string(),
                    },
                    reason: format!("category '{category}' is prohibited"),
                });
            }
        }

        if let Some(asset_class) = action.asset_class.as_deref() {
            if contains_ignore_case(&self.rules.prohibited_asset_classes, asset_class) {
                return Some(ComplianceViolation {
                    rule: ComplianceRule::ProhibitedAssetClass {
                        asset_class: asset_class.to_string(),
                    },
                    reason: format!("asset class '{asset_class}' is prohibited"),
                });
            }
        }

        if let Some(label) = action.pattern.as_deref() {
            if let Some(re) = self.patterns.iter().find(|re| re.is_match(label)) {
                return Some(ComplianceViolation {
                    rule: ComplianceRule::ProhibitedPattern {
                        pattern: re.as_str().to_string(),
                    },
                    reason: format!("pattern '{label}' matches prohibited /{}/", re.as_str()),
                });
            }
        }

        if let (Some(bound), Some(magnitude)) = (self.rules.max_abs_magnitude, action.magnitude) {
            if magnitude.abs() > bound {
                return Some(ComplianceViolation {
                    rule: ComplianceRule::EthicalBound { bound },
                    reason: format!("magnitude {magnitude} exceeds absolute bound {bound}"),
                });
            }
        }

        None
    }
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    let value = value.trim();
    list.iter().any(|item| item.trim().eq_ignore_ascii_case(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> ComplianceChecker {
        ComplianceChecker::new(ComplianceRules::standard()).unwrap()
    }

    #[test]
    fn test_clean_action_passes() {
        let action = ActionDescriptor::new("trade_size", 100.0).with_asset_class("equity");
        assert!(standard().check(&action));
    }

    #[test]
    fn test_prohibited_category_case_insensitive() {
        let action = ActionDescriptor::new("Insider_Information", 1.0);
        let v = standard().first_violation(&action).unwrap();
        assert!(matches!(v.rule, ComplianceRule::ProhibitedCategory { .. }));
    }

    #[test]
    fn test_prohibited_asset_class() {
        let action = ActionDescriptor::new("trade_size", 1.0).with_asset_class("SANCTIONED");
        assert!(!standard().check(&action));
    }

    #[test]
    fn test_manipulative_patterns() {
        let checker = standard();
        for label in ["spoofing", "Wash Trading", "pump-and-dump", "order layering"] {
            let action = ActionDescriptor::new("trade_size", 1.0).with_pattern(label);
            assert!(!checker.check(&action), "{label} should be prohibited");
        }
        let action = ActionDescriptor::new("trade_size", 1.0).with_pattern("market making");
        assert!(checker.check(&action));
    }

    #[test]
    fn test_ethical_bound() {
        let checker =
            ComplianceChecker::new(ComplianceRules::default().with_max_abs_magnitude(10.0)).unwrap();
        assert!(checker.check(&ActionDescriptor::new("fx", 10.0)));
        assert!(!checker.check(&ActionDescriptor::new("fx", -10.5)));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = ComplianceChecker::new(ComplianceRules::default().with_prohibited_pattern("(["))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_permissive_allows_everything() {
        let action = ActionDescriptor::new("insider_information", 1e12).with_pattern("spoof");
        assert!(ComplianceChecker::permissive().check(&action));
    }

    #[test]
    fn test_serde_roundtrip() {
        let rules = ComplianceRules::standard().with_max_abs_magnitude(5.0);
        let json = serde_json::to_string(&rules).unwrap();
        let back: ComplianceRules = serde_json::from_str(&json).unwrap();
        assert_eq!(rules, back);
    }
}
