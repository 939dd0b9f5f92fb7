//! Feedback loop configuration.
//!
//! One [`FeedbackConfig`] carries every section the loop and its
//! collaborators read. Files are JSON or TOML, chosen by extension:
//!
//! ```toml
//! [risk.risk_thresholds]
//! trade_size = 1000.0
//!
//! [compliance]
//! prohibited_asset_classes = ["sanctioned"]
//! prohibited_patterns = ["(?i)spoof"]
//!
//! [updater]
//! default_target = "price"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compliance::{ComplianceChecker, ComplianceRules};
use crate::domain::error::ConfigError;
use crate::market_data::MarketDataConfig;
use crate::risk::{RiskConfig, RiskManager};
use crate::updater::UpdaterConfig;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub risk: RiskConfig,
    pub compliance: ComplianceRules,
    pub updater: UpdaterConfig,
    pub market_data: MarketDataConfig,
}

impl FeedbackConfig {
    /// Read and validate a `.json` or `.toml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            toml::from_str::<Self>(&text).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<Self>(&text).map_err(|e| e.to_string())
        };
        let config = parsed.map_err(|message| ConfigError::Parse {
            path: display,
            message,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline json>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline toml>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate()?;
        self.compliance.validate()?;
        self.updater.validate()?;
        self.market_data.validate()?;
        Ok(())
    }

    /// Build the risk gate these settings describe.
    pub fn risk_manager(&self) -> Result<RiskManager, ConfigError> {
        let compliance = ComplianceChecker::new(self.compliance.clone())?;
        Ok(RiskManager::new(self.risk.clone(), compliance))
    }
}
