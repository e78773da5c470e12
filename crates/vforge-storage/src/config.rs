//! Asset store configuration.

use std::path::PathBuf;

use vforge_models::policy::JOB_RETENTION_DAYS;

use crate::error::StorageResult;

/// Configuration for the local asset store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory the static file server exposes
    pub root: PathBuf,
    /// URL prefix under which `root` is served, e.g. `/static` or a CDN base
    pub url_prefix: String,
    /// Days to keep assets and metadata before the retention sweep removes them
    pub retention_days: i64,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let root = std::env::var("STATIC_ROOT").unwrap_or_else(|_| "./static".to_string());
        let url_prefix = std::env::var("STATIC_URL_PREFIX").unwrap_or_else(|_| "/static".to_string());
        let retention_days: i64 = std::env::var("RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(JOB_RETENTION_DAYS);

        Ok(Self {
            root: PathBuf::from(root),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
            retention_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        // from_env falls back to defaults when nothing is set; retention
        // mirrors the job retention policy.
        let config = StorageConfig {
            root: PathBuf::from("./static"),
            url_prefix: "/static".to_string(),
            retention_days: JOB_RETENTION_DAYS,
        };
        assert_eq!(config.retention_days, 30);
    }
}
