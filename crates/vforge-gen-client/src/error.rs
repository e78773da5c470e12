//! Generator error types and transient/fatal classification.

use thiserror::Error;

use vforge_models::ErrorClass;

/// Result type for generator operations.
pub type GenResult<T> = Result<T, GenError>;

/// Failure reasons that are worth retrying when they appear in a
/// generator-reported error message.
const TRANSIENT_KEYWORDS: &[&str] = &[
    "timeout",
    "connection",
    "network",
    "temporary",
    "rate limit",
    "throttl",
    "unavailable",
    "overload",
];

/// Errors from the video generator and its transport.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Generator returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Task {task_id} failed: {reason}")]
    TaskFailed { task_id: String, reason: String },

    #[error("Task {task_id} still running after {waited_s}s")]
    PollTimeout { task_id: String, waited_s: u64 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GenError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// HTTP 5xx and 429 are transient; 4xx other than 429 means the request
    /// itself is wrong and will fail again. Generator-reported failure
    /// reasons are scanned for transient keywords, so a content-policy
    /// rejection stays fatal while a capacity blip does not.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenError::Network(_) => true,
            GenError::Api { status, .. } => *status >= 500 || *status == 429,
            GenError::TaskFailed { reason, .. } => {
                let reason = reason.to_lowercase();
                TRANSIENT_KEYWORDS.iter().any(|k| reason.contains(k))
            }
            GenError::PollTimeout { .. } => true,
            GenError::Config(_) | GenError::InvalidResponse(_) => false,
        }
    }

    /// Classification recorded alongside per-shot errors.
    pub fn class(&self) -> ErrorClass {
        if self.is_retryable() {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_5xx_and_429_are_retryable() {
        let server = GenError::Api {
            status: 503,
            message: "down".into(),
        };
        let limited = GenError::Api {
            status: 429,
            message: "slow down".into(),
        };
        let bad = GenError::Api {
            status: 400,
            message: "bad size".into(),
        };
        assert!(server.is_retryable());
        assert!(limited.is_retryable());
        assert!(!bad.is_retryable());
    }

    #[test]
    fn test_auth_failures_are_fatal() {
        let err = GenError::Api {
            status: 401,
            message: "bad key".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_transient_failure_reasons() {
        let transient = GenError::TaskFailed {
            task_id: "t1".into(),
            reason: "Internal timeout while rendering".into(),
        };
        let policy = GenError::TaskFailed {
            task_id: "t2".into(),
            reason: "content policy violation".into(),
        };
        assert!(transient.is_retryable());
        assert!(!policy.is_retryable());
    }

    #[test]
    fn test_poll_timeout_is_retryable() {
        let err = GenError::PollTimeout {
            task_id: "t1".into(),
            waited_s: 300,
        };
        assert!(err.is_retryable());
        assert_eq!(err.class(), ErrorClass::Retryable);
    }
}
