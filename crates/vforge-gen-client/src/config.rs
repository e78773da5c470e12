//! Generator client configuration.

use std::time::Duration;

use crate::error::{GenError, GenResult};
use crate::retry::RetryPolicy;

/// Default model identifier sent with every submission.
pub const DEFAULT_MODEL: &str = "wan2.6-t2v";

/// Seconds between status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Base wall-clock budget for one shot, before the quality mode's
/// timeout multiplier is applied.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 300;

/// Client configuration for the video generator.
#[derive(Debug, Clone)]
pub struct GenConfig {
    /// Generator base URL
    pub base_url: String,
    /// API key sent as a bearer token, when the deployment requires one
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Interval between status polls
    pub poll_interval: Duration,
    /// Base per-shot poll budget
    pub poll_timeout: Duration,
    /// Backoff schedule for retryable submission failures
    pub retry: RetryPolicy,
}

impl GenConfig {
    /// Create config from environment variables.
    pub fn from_env() -> GenResult<Self> {
        let base_url = std::env::var("GEN_BASE_URL")
            .map_err(|_| GenError::config("GEN_BASE_URL must be set to reach the generator"))?;

        if base_url.is_empty() {
            return Err(GenError::config("GEN_BASE_URL cannot be empty"));
        }

        let poll_interval_secs: u64 = std::env::var("GEN_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let poll_timeout_secs: u64 = std::env::var("GEN_POLL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var("GEN_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("GEN_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            poll_interval: Duration::from_secs(poll_interval_secs),
            poll_timeout: Duration::from_secs(poll_timeout_secs),
            retry: RetryPolicy::default(),
        })
    }

    /// Config pointed at an explicit URL, with defaults elsewhere.
    pub fn for_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_url_defaults() {
        let config = GenConfig::for_url("http://localhost:9000/");
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }
}
