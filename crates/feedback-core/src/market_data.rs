//! Market data collector.
//!
//! Fetches feedback-shaped JSON payloads from configured HTTP endpoints.
//! Retry, backoff and polling cadence belong to the caller.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::domain::error::ConfigError;
use crate::domain::feedback::FeedbackEvent;
use crate::obs::{emit_market_data_fetch_failed, emit_market_data_fetched};

/// Key in `api_keys` used when no per-data-type key exists.
pub const DEFAULT_API_KEY: &str = "key";

/// Data sources and credentials for [`MarketDataCollector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Data type (e.g. `price`, `volume`) to endpoint URL.
    pub data_sources: BTreeMap<String, String>,
    /// Data type, or [`DEFAULT_API_KEY`], to API key.
    pub api_keys: BTreeMap<String, String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            data_sources: BTreeMap::new(),
            api_keys: BTreeMap::new(),
            timeout_secs: 10,
        }
    }
}

impl MarketDataConfig {
    pub fn with_source(mut self, data_type: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.data_sources.insert(data_type.into(), endpoint.into());
        self
    }

    pub fn with_api_key(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_keys.insert(name.into(), key.into());
        self
    }

    /// Endpoints must be absolute http(s) URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }
        for (data_type, endpoint) in &self.data_sources {
            let ok = reqwest::Url::parse(endpoint)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !ok {
                return Err(ConfigError::InvalidEndpoint {
                    data_type: data_type.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
        Ok(())
    }

    fn api_key_for(&self, data_type: &str) -> Option<&str> {
        self.api_keys
            .get(data_type)
            .or_else(|| self.api_keys.get(DEFAULT_API_KEY))
            .map(String::as_str)
    }
}

/// Anything that can produce feedback events on demand.
#[async_trait]
pub trait FeedbackSource: Send + Sync {
    /// Fetch one payload of the given type. `None` means nothing usable was
    /// retrieved; the reason is logged.
    async fn fetch_data(&self, data_type: &str) -> Option<FeedbackEvent>;
}

/// HTTP-backed [`FeedbackSource`].
pub struct MarketDataCollector {
    config: MarketDataConfig,
    http_client: reqwest::Client,
    clock: Arc<dyn Clock>,
    last_fetch_time: Mutex<Option<DateTime<Utc>>>,
}

impl MarketDataCollector {
    pub fn new(config: MarketDataConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("feedback-core/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            clock: Arc::new(SystemClock),
            last_fetch_time: Mutex::new(None),
        })
    }

    /// Use `clock` for request timestamps and `last_fetch_time`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MarketDataConfig {
        &self.config
    }

    /// Time of the last successful fetch, if any.
    pub fn last_fetch_time(&self) -> Option<DateTime<Utc>> {
        *self
            .last_fetch_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn request(&self, endpoint: &str, data_type: &str) -> Result<Value, reqwest::Error> {
        let mut query = vec![("timestamp", self.clock.now().to_rfc3339())];
        if let Some(key) = self.config.api_key_for(data_type) {
            query.push(("api_key", key.to_string()));
        }
        self.http_client
            .get(endpoint)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    }
}

#[async_trait]
impl FeedbackSource for MarketDataCollector {
    async fn fetch_data(&self, data_type: &str) -> Option<FeedbackEvent> {
        let Some(endpoint) = self.config.data_sources.get(data_type) else {
            emit_market_data_fetch_failed(data_type, &"no source configured");
            return None;
        };

        let body = match self.request(endpoint, data_type).await {
            Ok(body) => body,
            Err(err) => {
                emit_market_data_fetch_failed(data_type, &err);
                return None;
            }
        };

        let Some(event) = FeedbackEvent::from_value(body) else {
            emit_market_data_fetch_failed(data_type, &"response body is not a JSON object");
            return None;
        };

        *self
            .last_fetch_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(self.clock.now());
        emit_market_data_fetched(data_type, endpoint, event.len());
        Some(event)
    }
}

impl std::fmt::Debug for MarketDataCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataCollector")
            .field("data_sources", &self.config.data_sources)
            .field("last_fetch_time", &self.last_fetch_time())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_endpoints() {
        let ok = MarketDataConfig::default().with_source("price", "https://api.example.com/price");
        assert!(ok.validate().is_ok());

        let bad = MarketDataConfig::default().with_source("price", "not a url");
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        let ftp = MarketDataConfig::default().with_source("price", "ftp://example.com/x");
        assert!(ftp.validate().is_err());

        let zero = MarketDataConfig {
            timeout_secs: 0,
            ..MarketDataConfig::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::InvalidTimeout(0))));
    }

    #[test]
    fn test_api_key_falls_back_to_default() {
        let cfg = MarketDataConfig::default()
            .with_api_key("key", "shared")
            .with_api_key("volume", "vol-only");
        assert_eq!(cfg.api_key_for("price"), Some("shared"));
        assert_eq!(cfg.api_key_for("volume"), Some("vol-only"));
        assert_eq!(MarketDataConfig::default().api_key_for("price"), None);
    }

    #[tokio::test]
    async fn test_unconfigured_type_returns_none() {
        let collector = MarketDataCollector::new(MarketDataConfig::default()).unwrap();
        assert!(collector.fetch_data("price").await.is_none());
        assert!(collector.last_fetch_time().is_none());
    }
}
