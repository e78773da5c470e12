//! API error types.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vforge_pipeline::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{detail}")]
    NotFound { code: &'static str, detail: String },

    #[error("{detail}")]
    Conflict { code: &'static str, detail: String },

    #[error("{detail}")]
    Unprocessable { code: &'static str, detail: String },

    #[error("Too many requests, retry in {retry_after_s}s")]
    RateLimited { retry_after_s: u64 },

    #[error("Too many active jobs: {active} of {limit} slots in use")]
    TooManyActive { active: u32, limit: u32 },

    #[error("Admission checks unavailable: {0}")]
    GateUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound {
            code: "NOT_FOUND",
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Unprocessable {
            code: "VALIDATION_ERROR",
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited { .. } | ApiError::TooManyActive { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::GateUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound { code, .. }
            | ApiError::Conflict { code, .. }
            | ApiError::Unprocessable { code, .. } => code,
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::TooManyActive { .. } => "TOO_MANY_ACTIVE_JOBS",
            ApiError::GateUnavailable(_) => "GATE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let detail = e.to_string();
        match e {
            PipelineError::JobNotFound(_) => ApiError::NotFound {
                code: "JOB_NOT_FOUND",
                detail,
            },
            PipelineError::ShotNotFound { .. } => ApiError::NotFound {
                code: "SHOT_NOT_FOUND",
                detail,
            },
            PipelineError::WrongState { .. } => ApiError::Conflict {
                code: "NOT_SUCCEEDED",
                detail,
            },
            PipelineError::NotRenderable { .. } => ApiError::Conflict {
                code: "NOT_RENDERABLE",
                detail,
            },
            PipelineError::NoPlan(_) => ApiError::Conflict {
                code: "NO_PLAN",
                detail,
            },
            PipelineError::ClarificationRequired(_) => ApiError::Unprocessable {
                code: "CLARIFICATION_REQUIRED",
                detail,
            },
            PipelineError::Validation(_) => ApiError::Unprocessable {
                code: "VALIDATION_ERROR",
                detail,
            },
            PipelineError::InvalidSeeds(_) => ApiError::Unprocessable {
                code: "INVALID_SEEDS",
                detail,
            },
            PipelineError::NoPreviewAssets(_) => ApiError::Unprocessable {
                code: "NO_PREVIEW_ASSETS",
                detail,
            },
            // Malformed model output is the user's prompt not working out,
            // not an outage.
            PipelineError::Ml(ml) if !ml.is_retryable() => ApiError::Unprocessable {
                code: "VALIDATION_ERROR",
                detail,
            },
            _ => ApiError::Internal(detail),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::validation(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::GateUnavailable(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            detail,
            code: self.code().to_string(),
        };

        match self {
            ApiError::RateLimited { retry_after_s } => (
                status,
                [(header::RETRY_AFTER, retry_after_s.to_string())],
                Json(body),
            )
                .into_response(),
            _ => (status, Json(body)).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vforge_models::{JobId, JobState};

    #[test]
    fn test_pipeline_errors_map_to_expected_statuses() {
        let cases: Vec<(PipelineError, StatusCode, &str)> = vec![
            (
                PipelineError::JobNotFound(JobId::new()),
                StatusCode::NOT_FOUND,
                "JOB_NOT_FOUND",
            ),
            (
                PipelineError::ShotNotFound {
                    job_id: JobId::new(),
                    shot_id: 3,
                },
                StatusCode::NOT_FOUND,
                "SHOT_NOT_FOUND",
            ),
            (
                PipelineError::WrongState {
                    job_id: JobId::new(),
                    required: JobState::Succeeded,
                    actual: JobState::Running,
                },
                StatusCode::CONFLICT,
                "NOT_SUCCEEDED",
            ),
            (
                PipelineError::NotRenderable {
                    job_id: JobId::new(),
                    reason: "job already has generated assets".to_string(),
                },
                StatusCode::CONFLICT,
                "NOT_RENDERABLE",
            ),
            (
                PipelineError::ClarificationRequired("add detail".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "CLARIFICATION_REQUIRED",
            ),
            (
                PipelineError::Validation("unsupported resolution".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
            ),
            (
                PipelineError::InvalidSeeds("shot 2 has no candidate".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_SEEDS",
            ),
            (
                PipelineError::NoPreviewAssets(JobId::new()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "NO_PREVIEW_ASSETS",
            ),
            (
                PipelineError::Catalog("bad template".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];

        for (pipeline_error, status, code) in cases {
            let api_error = ApiError::from(pipeline_error);
            assert_eq!(api_error.status_code(), status);
            assert_eq!(api_error.code(), code);
        }
    }

    #[test]
    fn test_admission_denials_are_429() {
        let rate = ApiError::RateLimited { retry_after_s: 12 };
        assert_eq!(rate.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rate.code(), "RATE_LIMITED");

        let busy = ApiError::TooManyActive {
            active: 5,
            limit: 5,
        };
        assert_eq!(busy.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(busy.code(), "TOO_MANY_ACTIVE_JOBS");
    }

    #[test]
    fn test_gate_unavailable_is_503() {
        let error = ApiError::GateUnavailable("redis down".to_string());
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.code(), "GATE_UNAVAILABLE");
    }
}
