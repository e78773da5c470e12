//! Text-understanding service configuration.

use std::time::Duration;

use crate::error::{MlError, MlResult};

/// Client configuration for the text-understanding service.
#[derive(Debug, Clone)]
pub struct MlConfig {
    /// Service base URL, e.g. `http://localhost:8100`
    pub base_url: String,
    /// Request timeout. Intent parsing is a model call and can be slow.
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl MlConfig {
    /// Create config from environment variables.
    pub fn from_env() -> MlResult<Self> {
        let base_url = std::env::var("ML_BASE_URL")
            .map_err(|_| MlError::config("ML_BASE_URL must be set to reach the text service"))?;

        if base_url.is_empty() {
            return Err(MlError::config("ML_BASE_URL cannot be empty"));
        }

        let timeout_secs: u64 = std::env::var("ML_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(5),
        })
    }

    /// Config pointed at an explicit URL, with default timeouts.
    pub fn for_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
