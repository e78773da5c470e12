//! Job inspection handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use vforge_db::DEFAULT_LIST_LIMIT;
use vforge_models::{Job, JobId, JobState, QualityMode, TemplateId};

use crate::error::{ApiError, ApiResult};
use crate::identity::ClientIdentity;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    /// Filter by lifecycle state (`submitted`, `running`, ...).
    pub state: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Compact listing entry; the full record comes from the detail route.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub state: JobState,
    pub quality_mode: QualityMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    pub total_duration_s: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            state: job.state,
            quality_mode: job.quality_mode,
            template_id: job.template_id,
            total_duration_s: job.total_duration_s,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobPage {
    pub jobs: Vec<JobSummary>,
    pub count: usize,
    pub limit: i64,
    pub offset: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Fetch the full job record, including any assets produced so far.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> ApiResult<Json<Job>> {
    let job = state
        .orchestrator
        .store()
        .get_job(&job_id)
        .await
        .map_err(|e| {
            warn!(job_id = %job_id, error = %e, "failed to load job");
            ApiError::internal("failed to load job")
        })?
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))?;

    Ok(Json(job))
}

/// List the calling client's jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    ClientIdentity(client_id): ClientIdentity,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobPage>> {
    let state_filter = match query.state.as_deref() {
        Some(raw) => Some(
            raw.parse::<JobState>()
                .map_err(|e| ApiError::validation(e.to_string()))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let jobs = state
        .orchestrator
        .store()
        .list_jobs(&client_id, state_filter, limit, offset)
        .await
        .map_err(|e| {
            warn!(client_id = %client_id, error = %e, "failed to list jobs");
            ApiError::internal("failed to list jobs")
        })?;

    let jobs: Vec<JobSummary> = jobs.into_iter().map(JobSummary::from).collect();

    Ok(Json(JobPage {
        count: jobs.len(),
        jobs,
        limit,
        offset,
    }))
}
