//! Job aggregate and its state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::asset::ShotAsset;
use crate::intent::Intent;
use crate::plan::ShotPlan;
use crate::quality::QualityMode;
use crate::request::ShotRequest;
use crate::template::TemplateId;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// The only legal moves are the forward edges plus the
/// `Succeeded -> Running` re-entry used by finalize and shot regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Record exists, nothing admitted yet
    #[default]
    Created,
    /// Admitted and planned (or queued for planning)
    Submitted,
    /// A pipeline run is actively mutating this job
    Running,
    /// Settled with assets; may re-enter Running
    Succeeded,
    /// Settled with an error; terminal
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    /// States reachable from this one.
    pub fn successors(&self) -> &'static [JobState] {
        match self {
            JobState::Created => &[JobState::Submitted, JobState::Failed],
            JobState::Submitted => &[JobState::Running, JobState::Failed],
            JobState::Running => &[JobState::Succeeded, JobState::Failed],
            JobState::Succeeded => &[JobState::Running],
            JobState::Failed => &[],
        }
    }

    pub fn can_transition(&self, to: JobState) -> bool {
        self.successors().contains(&to)
    }

    /// True when no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Failed)
    }

    /// True when a run has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = JobStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(JobState::Created),
            "submitted" => Ok(JobState::Submitted),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            _ => Err(JobStateParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown job state: {0}")]
pub struct JobStateParseError(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Illegal job state transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// One entry in a job's immutable transition history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StateTransition {
    pub from_state: JobState,
    pub to_state: JobState,
    pub at: DateTime<Utc>,
    /// Causal label, e.g. `generation_started`.
    pub label: String,
}

/// Whether a failure was worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient; the adapter retried until attempts ran out.
    Retryable,
    /// Permanent; retrying would repeat the same rejection.
    Fatal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Retryable => "retryable",
            ErrorClass::Fatal => "fatal",
        }
    }
}

/// A recorded per-shot failure. Sibling shots keep running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotError {
    pub shot_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub class: ErrorClass,
    pub message: String,
}

/// Machine-readable category of a job-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// Parameter or payload validation rejected the request.
    Validation,
    /// No template cleared the confidence floor.
    Clarification,
    /// Shot generation could not meet the success policy.
    Generation,
    /// The run exceeded its wall-clock budget.
    Timeout,
    /// Record or asset persistence failed mid-run.
    Persistence,
    /// Anything that escaped the pipeline.
    Internal,
}

impl JobErrorKind {
    /// Stable API error code.
    pub fn code(&self) -> &'static str {
        match self {
            JobErrorKind::Validation => "VALIDATION_ERROR",
            JobErrorKind::Clarification => "CLARIFICATION_REQUIRED",
            JobErrorKind::Generation => "GENERATION_ERROR",
            JobErrorKind::Timeout => "JOB_TIMEOUT",
            JobErrorKind::Persistence => "PERSISTENCE_ERROR",
            JobErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Terminal error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub detail: String,
}

impl JobError {
    pub fn new(kind: JobErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// The aggregate root: one user request and everything produced for it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub job_id: JobId,

    /// Client identity used for admission control.
    pub client_id: String,

    pub state: JobState,

    /// Immutable, timestamped transition history.
    #[serde(default)]
    pub state_transitions: Vec<StateTransition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shot_plan: Option<ShotPlan>,

    /// Compiled requests, one per (shot, candidate seed).
    #[serde(default)]
    pub shot_requests: Vec<ShotRequest>,

    /// Assets produced so far; grows incrementally while Running.
    #[serde(default)]
    pub shot_assets: Vec<ShotAsset>,

    /// Per-shot failures recorded during generation runs.
    #[serde(default)]
    pub shot_errors: Vec<ShotError>,

    /// Chosen candidate seed per shot, set by finalize.
    #[serde(default)]
    pub selected_seeds: HashMap<u32, i64>,

    /// Task handles issued by the external generator.
    #[serde(default)]
    pub external_task_ids: Vec<String>,

    pub quality_mode: QualityMode,

    /// Working resolution, wire format.
    pub resolution: String,

    #[serde(default)]
    pub total_duration_s: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Parent job when this job was created by a revision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_of: Option<JobId>,

    /// Fields a revision targets (camera, narration, ...).
    #[serde(default)]
    pub targeted_fields: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a job in `Created` with an opening history entry.
    pub fn new(
        client_id: impl Into<String>,
        quality_mode: QualityMode,
        resolution: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new(),
            client_id: client_id.into(),
            state: JobState::Created,
            state_transitions: vec![StateTransition {
                from_state: JobState::Created,
                to_state: JobState::Created,
                at: now,
                label: "job_created".to_string(),
            }],
            intent: None,
            template_id: None,
            shot_plan: None,
            shot_requests: Vec::new(),
            shot_assets: Vec::new(),
            shot_errors: Vec::new(),
            selected_seeds: HashMap::new(),
            external_task_ids: Vec::new(),
            quality_mode,
            resolution: resolution.into(),
            total_duration_s: 0.0,
            error: None,
            revision_of: None,
            targeted_fields: Vec::new(),
            created_at: now,
            updated_at: now,
            submitted_at: None,
            running_at: None,
            finished_at: None,
        }
    }

    /// Move to `to`, appending a labelled history entry.
    ///
    /// Rejects edges outside the state graph; the caller decides whether
    /// that is a guard (API 409) or a bug.
    pub fn transition(
        &mut self,
        to: JobState,
        label: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        if !self.state.can_transition(to) {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }

        let now = Utc::now();
        self.state_transitions.push(StateTransition {
            from_state: self.state,
            to_state: to,
            at: now,
            label: label.into(),
        });

        match to {
            JobState::Submitted => self.submitted_at = Some(now),
            JobState::Running => self.running_at = Some(now),
            JobState::Succeeded | JobState::Failed => self.finished_at = Some(now),
            JobState::Created => {}
        }

        self.state = to;
        self.updated_at = now;
        Ok(())
    }

    /// Fail the job from any non-terminal state.
    pub fn fail(&mut self, error: JobError, label: impl Into<String>) {
        self.error = Some(error);
        // Failed is reachable from every non-terminal state except Succeeded;
        // a settled job that fails a later run keeps its assets and state.
        if self.state.can_transition(JobState::Failed) {
            let _ = self.transition(JobState::Failed, label);
        } else {
            self.updated_at = Utc::now();
        }
    }

    /// Record (or replace) a produced asset, keyed by (shot_id, seed).
    pub fn record_asset(&mut self, asset: ShotAsset) {
        if let Some(existing) = self
            .shot_assets
            .iter_mut()
            .find(|a| a.shot_id == asset.shot_id && a.seed == asset.seed)
        {
            *existing = asset;
        } else {
            self.shot_assets.push(asset);
        }
        self.updated_at = Utc::now();
    }

    /// Replace every asset for one shot with a single new one.
    pub fn replace_shot_assets(&mut self, asset: ShotAsset) {
        self.shot_assets.retain(|a| a.shot_id != asset.shot_id);
        self.shot_assets.push(asset);
        self.updated_at = Utc::now();
    }

    pub fn record_shot_error(&mut self, error: ShotError) {
        self.shot_errors.push(error);
        self.updated_at = Utc::now();
    }

    /// Assets produced for one shot (any seed), in recorded order.
    pub fn assets_for_shot(&self, shot_id: u32) -> Vec<&ShotAsset> {
        self.shot_assets
            .iter()
            .filter(|a| a.shot_id == shot_id)
            .collect()
    }

    /// Number of planned shots with at least one asset.
    pub fn shots_with_assets(&self) -> usize {
        let Some(plan) = &self.shot_plan else {
            return 0;
        };
        plan.shots
            .iter()
            .filter(|s| self.shot_assets.iter().any(|a| a.shot_id == s.shot_id))
            .count()
    }

    pub fn planned_shot_count(&self) -> usize {
        self.shot_plan.as_ref().map(|p| p.shots.len()).unwrap_or(0)
    }

    pub fn is_revision(&self) -> bool {
        self.revision_of.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("203.0.113.9", QualityMode::Balanced, "1280*720")
    }

    #[test]
    fn test_forward_transitions() {
        let mut job = job();
        assert_eq!(job.state, JobState::Created);

        job.transition(JobState::Submitted, "planning_complete").unwrap();
        job.transition(JobState::Running, "generation_started").unwrap();
        job.transition(JobState::Succeeded, "generation_complete").unwrap();

        assert_eq!(job.state, JobState::Succeeded);
        assert!(job.submitted_at.is_some());
        assert!(job.running_at.is_some());
        assert!(job.finished_at.is_some());
        // job_created plus the three moves
        assert_eq!(job.state_transitions.len(), 4);
    }

    #[test]
    fn test_no_shortcut_to_succeeded() {
        let mut job = job();
        let err = job.transition(JobState::Succeeded, "nope").unwrap_err();
        assert_eq!(err.from, JobState::Created);
        assert_eq!(err.to, JobState::Succeeded);
        assert_eq!(job.state, JobState::Created);
    }

    #[test]
    fn test_succeeded_reenters_running() {
        let mut job = job();
        job.transition(JobState::Submitted, "planning_complete").unwrap();
        job.transition(JobState::Running, "generation_started").unwrap();
        job.transition(JobState::Succeeded, "generation_complete").unwrap();

        job.transition(JobState::Running, "finalization_started").unwrap();
        assert_eq!(job.state, JobState::Running);

        assert!(job.transition(JobState::Submitted, "nope").is_err());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut job = job();
        job.fail(
            JobError::new(JobErrorKind::Validation, "duration out of range"),
            "validation_failed",
        );
        assert_eq!(job.state, JobState::Failed);
        assert!(job.state.is_terminal());
        assert!(job.transition(JobState::Running, "nope").is_err());
    }

    #[test]
    fn test_history_is_append_only() {
        let mut job = job();
        job.transition(JobState::Submitted, "planning_complete").unwrap();
        let before = job.state_transitions.clone();

        job.transition(JobState::Running, "generation_started").unwrap();
        assert_eq!(&job.state_transitions[..before.len()], &before[..]);
    }

    #[test]
    fn test_record_asset_upserts_by_shot_and_seed() {
        let mut job = job();
        let asset = |shot_id, seed, url: &str| ShotAsset {
            shot_id,
            seed,
            model_task_id: "task".into(),
            raw_video_url: "raw".into(),
            video_url: url.into(),
            audio_url: None,
            video_path: "/tmp/v.mp4".into(),
            audio_path: None,
            duration_s: 3.0,
            resolution: "1280*720".into(),
        };

        job.record_asset(asset(1, 555, "a"));
        job.record_asset(asset(1, 777, "b"));
        job.record_asset(asset(1, 555, "c"));

        assert_eq!(job.shot_assets.len(), 2);
        assert_eq!(job.assets_for_shot(1).len(), 2);
        let replaced = job
            .shot_assets
            .iter()
            .find(|a| a.seed == 555)
            .unwrap();
        assert_eq!(replaced.video_url, "c");
    }
}
