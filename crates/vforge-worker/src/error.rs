//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] vforge_pipeline::PipelineError),

    #[error("Queue error: {0}")]
    Queue(#[from] vforge_queue::QueueError),

    #[error("Database error: {0}")]
    Db(#[from] vforge_db::DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] vforge_storage::StorageError),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }
}
