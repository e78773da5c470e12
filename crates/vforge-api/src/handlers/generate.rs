//! Generation and planning handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use vforge_models::{JobId, JobState, QualityMode, ShotPlan, TemplateId};
use vforge_pipeline::{JobRequest, PlannedJob};
use vforge_queue::{Admission, RenderMessage};

use crate::error::{ApiError, ApiResult};
use crate::identity::ClientIdentity;
use crate::metrics;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct GenerationRequest {
    /// Natural-language description of the video to produce.
    #[validate(length(
        min = 1,
        max = 2000,
        message = "user_prompt must be 1-2000 characters"
    ))]
    pub user_prompt: String,

    #[serde(default)]
    pub quality_mode: QualityMode,

    /// `x` or `*` separated, e.g. `1280x720`.
    #[serde(default = "default_resolution")]
    pub resolution: String,

    /// Overrides the duration the intent parser would infer.
    #[validate(range(
        min = 2.0,
        max = 15.0,
        message = "duration_preference_s must be 2-15 seconds"
    ))]
    pub duration_preference_s: Option<f64>,
}

fn default_resolution() -> String {
    "1280x720".to_string()
}

impl GenerationRequest {
    fn into_job_request(self, client_id: String) -> JobRequest {
        JobRequest {
            client_id,
            prompt: self.user_prompt,
            quality_mode: self.quality_mode,
            resolution: self.resolution,
            duration_preference_s: self.duration_preference_s,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub job_id: JobId,
    pub state: JobState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub job_id: JobId,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    pub confidence: f64,
    pub match_strategy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shot_plan: Option<ShotPlan>,
    pub total_duration_s: f64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Plan a job and queue it for preview generation.
pub async fn generate(
    State(state): State<AppState>,
    ClientIdentity(client_id): ClientIdentity,
    Json(request): Json<GenerationRequest>,
) -> ApiResult<(StatusCode, Json<GenerationResponse>)> {
    request.validate()?;
    admit(&state, &client_id).await?;

    let job = match state
        .orchestrator
        .prepare_generate(request.into_job_request(client_id.clone()))
        .await
    {
        Ok(job) => job,
        Err(e) => {
            release_quietly(&state, &client_id).await;
            return Err(e.into());
        }
    };

    let message = RenderMessage::generate(job.job_id.clone());
    if let Err(e) = enqueue(&state, &message).await {
        release_quietly(&state, &client_id).await;
        return Err(e);
    }

    info!(job_id = %job.job_id, client_id = %client_id, "generation accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerationResponse {
            job_id: job.job_id,
            state: job.state,
            message: "Job accepted; preview generation queued".to_string(),
        }),
    ))
}

/// Run planning inline and return the shot plan without generating.
pub async fn plan(
    State(state): State<AppState>,
    ClientIdentity(client_id): ClientIdentity,
    Json(request): Json<GenerationRequest>,
) -> ApiResult<Json<PlanResponse>> {
    request.validate()?;
    admit(&state, &client_id).await?;

    let planned = state
        .orchestrator
        .plan_only(request.into_job_request(client_id.clone()))
        .await;
    // Planning never holds a slot past the response.
    release_quietly(&state, &client_id).await;

    let PlannedJob {
        job,
        confidence,
        strategy,
    } = planned?;

    Ok(Json(PlanResponse {
        job_id: job.job_id,
        state: job.state,
        template_id: job.template_id,
        confidence,
        match_strategy: strategy.as_str().to_string(),
        shot_plan: job.shot_plan,
        total_duration_s: job.total_duration_s,
    }))
}

/// Queue preview generation for a previously planned job.
pub async fn render(
    State(state): State<AppState>,
    ClientIdentity(client_id): ClientIdentity,
    Path(job_id): Path<JobId>,
) -> ApiResult<(StatusCode, Json<GenerationResponse>)> {
    // Guard first so a job that cannot render never burns quota.
    let job = state.orchestrator.prepare_render(&job_id).await?;
    admit(&state, &client_id).await?;

    let message = RenderMessage::generate(job.job_id.clone());
    if let Err(e) = enqueue(&state, &message).await {
        release_quietly(&state, &client_id).await;
        return Err(e);
    }

    info!(job_id = %job.job_id, client_id = %client_id, "render accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerationResponse {
            job_id: job.job_id,
            state: job.state,
            message: "Render queued from existing plan".to_string(),
        }),
    ))
}

// ============================================================================
// Admission helpers
// ============================================================================

/// Run both admission checks, converting denials into API errors.
pub(crate) async fn admit(state: &AppState, client_id: &str) -> ApiResult<()> {
    let admission = state.gate.admit(client_id).await.map_err(|e| {
        warn!(error = %e, "admission gate unreachable");
        ApiError::GateUnavailable("admission checks are unavailable".to_string())
    })?;

    match admission {
        Admission::Admitted => Ok(()),
        Admission::RateLimited { retry_after_s } => {
            metrics::record_admission_denial("rate_limited");
            Err(ApiError::RateLimited { retry_after_s })
        }
        Admission::TooManyActive { active, limit } => {
            metrics::record_admission_denial("too_many_active");
            Err(ApiError::TooManyActive { active, limit })
        }
    }
}

/// Give back a concurrency slot without letting a second failure mask
/// the first.
pub(crate) async fn release_quietly(state: &AppState, client_id: &str) {
    if let Err(e) = state.gate.release(client_id).await {
        warn!(client_id = %client_id, error = %e, "failed to release admission slot");
    }
}

/// Enqueue a render message, collapsing duplicates silently.
pub(crate) async fn enqueue(state: &AppState, message: &RenderMessage) -> ApiResult<()> {
    match state.queue.enqueue(message).await {
        Ok(Some(_)) => {
            metrics::record_job_enqueued(message.op.as_str());
            Ok(())
        }
        Ok(None) => {
            info!(
                job_id = %message.job_id,
                op = message.op.as_str(),
                "duplicate enqueue collapsed"
            );
            Ok(())
        }
        Err(e) => {
            warn!(job_id = %message.job_id, error = %e, "enqueue failed");
            Err(ApiError::internal("failed to queue job"))
        }
    }
}
