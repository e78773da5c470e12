//! Pipeline error types.

use thiserror::Error;

use vforge_db::DbError;
use vforge_ml_client::MlError;
use vforge_models::{JobError, JobErrorKind, JobId, JobState};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("Shot {shot_id} not found in job {job_id}")]
    ShotNotFound { job_id: JobId, shot_id: u32 },

    #[error("Job {job_id} is {actual}, operation requires {required}")]
    WrongState {
        job_id: JobId,
        required: JobState,
        actual: JobState,
    },

    #[error("Job {0} has no compiled plan")]
    NoPlan(JobId),

    #[error("Job {job_id} cannot be rendered: {reason}")]
    NotRenderable { job_id: JobId, reason: String },

    #[error("Clarification required: {0}")]
    ClarificationRequired(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job {0} has no preview assets to finalize")]
    NoPreviewAssets(JobId),

    #[error("Invalid seed selection: {0}")]
    InvalidSeeds(String),

    #[error("Template catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Intent service error: {0}")]
    Ml(#[from] MlError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Terminal error to attach to a job this failure is sinking.
    pub fn job_error(&self) -> JobError {
        let kind = match self {
            PipelineError::ClarificationRequired(_) => JobErrorKind::Clarification,
            PipelineError::Validation(_) => JobErrorKind::Validation,
            PipelineError::Ml(e) if !e.is_retryable() => JobErrorKind::Validation,
            PipelineError::Ml(_) => JobErrorKind::Internal,
            PipelineError::Db(_) => JobErrorKind::Persistence,
            _ => JobErrorKind::Internal,
        };
        JobError::new(kind, self.to_string())
    }
}
