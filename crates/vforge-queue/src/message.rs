//! Message types for the render queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vforge_models::JobId;

/// Which pipeline entry point a queued message drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderOp {
    /// Run preview generation for every planned shot.
    Generate,
    /// Re-render the selected seeds at delivery resolution.
    Finalize,
    /// Run generation for a freshly created revision job.
    ReviseGenerate,
    /// Re-render a single shot with a fresh seed.
    RegenerateShot,
}

impl RenderOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderOp::Generate => "generate",
            RenderOp::Finalize => "finalize",
            RenderOp::ReviseGenerate => "revise_generate",
            RenderOp::RegenerateShot => "regenerate_shot",
        }
    }
}

impl std::fmt::Display for RenderOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work handed from the API to a worker.
///
/// Every operation acts on a job record that already exists in the store;
/// the message carries only the coordinates, never the job payload itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderMessage {
    /// Job the operation acts on.
    pub job_id: JobId,
    /// Pipeline entry point to run.
    pub op: RenderOp,
    /// Target shot for shot-scoped operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot_id: Option<u32>,
    /// When the message was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl RenderMessage {
    /// Message that runs preview generation for a job.
    pub fn generate(job_id: JobId) -> Self {
        Self {
            job_id,
            op: RenderOp::Generate,
            shot_id: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Message that finalizes a job's selected seeds.
    pub fn finalize(job_id: JobId) -> Self {
        Self {
            job_id,
            op: RenderOp::Finalize,
            shot_id: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Message that runs generation for a revision job.
    pub fn revise_generate(job_id: JobId) -> Self {
        Self {
            job_id,
            op: RenderOp::ReviseGenerate,
            shot_id: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Message that regenerates a single shot.
    pub fn regenerate_shot(job_id: JobId, shot_id: u32) -> Self {
        Self {
            job_id,
            op: RenderOp::RegenerateShot,
            shot_id: Some(shot_id),
            enqueued_at: Utc::now(),
        }
    }

    /// Deduplication key; repeat dispatches of the same operation collapse
    /// while one is in flight.
    pub fn idempotency_key(&self) -> String {
        match self.shot_id {
            Some(shot_id) => format!("{}:{}:{}", self.job_id, self.op, shot_id),
            None => format!("{}:{}", self.job_id, self.op),
        }
    }
}
