//! Job store error types.

use thiserror::Error;
use vforge_models::InvalidTransition;

/// Result type for job store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while reading or writing job records.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    /// A stored row failed to decode back into its model type.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self::NotFound(job_id.into())
    }

    pub fn corrupt_record(msg: impl Into<String>) -> Self {
        Self::CorruptRecord(msg.into())
    }

    /// True when the caller asked for a record that does not exist, as
    /// opposed to an infrastructure failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}
