//! Text-understanding service error types.

use thiserror::Error;

/// Result type for text-understanding service operations.
pub type MlResult<T> = Result<T, MlError>;

/// Errors that can occur when talking to the text-understanding service.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Intent parse failed: {0}")]
    ParseError(String),

    #[error("Plan instantiation failed: {0}")]
    InstantiationError(String),

    #[error("Service returned {status}: {message}")]
    ServiceError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn instantiation_error(msg: impl Into<String>) -> Self {
        Self::InstantiationError(msg.into())
    }

    /// Check if the failure is worth retrying on a later request.
    pub fn is_retryable(&self) -> bool {
        match self {
            MlError::Network(_) => true,
            MlError::ServiceError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
