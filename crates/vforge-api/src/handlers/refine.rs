//! Post-generation refinement handlers: shot edits, regeneration,
//! finalize and revision.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use vforge_models::policy::FINAL_RESOLUTION;
use vforge_models::{JobId, JobState, Shot};
use vforge_queue::RenderMessage;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

use super::generate::enqueue;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ShotEditRequest {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "visual_prompt must be 1-1000 characters"
    ))]
    pub visual_prompt: Option<String>,

    #[validate(length(max = 500, message = "narration must be at most 500 characters"))]
    pub narration: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShotRegenerateResponse {
    pub job_id: JobId,
    pub shot_id: u32,
    pub state: JobState,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    /// Chosen preview seed per shot id.
    #[serde(default)]
    pub selected_seeds: HashMap<u32, i64>,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub job_id: JobId,
    pub state: JobState,
    /// Output resolution of the finalized assets.
    pub resolution: String,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviseRequest {
    /// What to change relative to the parent job.
    #[validate(length(min = 5, max = 500, message = "feedback must be 5-500 characters"))]
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct ReviseResponse {
    pub job_id: JobId,
    pub parent_job_id: JobId,
    pub state: JobState,
    pub targeted_fields: Vec<String>,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Apply edits to one planned shot and recompile its requests.
pub async fn update_shot(
    State(state): State<AppState>,
    Path((job_id, shot_id)): Path<(JobId, u32)>,
    Json(request): Json<ShotEditRequest>,
) -> ApiResult<Json<Shot>> {
    request.validate()?;
    if request.visual_prompt.is_none() && request.narration.is_none() {
        return Err(ApiError::validation(
            "at least one of visual_prompt or narration is required",
        ));
    }

    let shot = state
        .orchestrator
        .edit_shot(&job_id, shot_id, request.visual_prompt, request.narration)
        .await?;

    Ok(Json(shot))
}

/// Queue regeneration of a single shot, with optional edits applied first.
pub async fn regenerate_shot(
    State(state): State<AppState>,
    Path((job_id, shot_id)): Path<(JobId, u32)>,
    request: Option<Json<ShotEditRequest>>,
) -> ApiResult<(StatusCode, Json<ShotRegenerateResponse>)> {
    let edits = request.map(|Json(r)| r).unwrap_or_default();
    edits.validate()?;

    let job = state
        .orchestrator
        .prepare_regenerate(&job_id, shot_id, edits.visual_prompt, edits.narration)
        .await?;

    let message = RenderMessage::regenerate_shot(job.job_id.clone(), shot_id);
    enqueue(&state, &message).await?;

    info!(job_id = %job.job_id, shot_id = shot_id, "shot regeneration accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(ShotRegenerateResponse {
            job_id: job.job_id,
            shot_id,
            state: job.state,
            message: "Shot regeneration queued".to_string(),
        }),
    ))
}

/// Queue the final high-resolution render for the selected previews.
pub async fn finalize_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(request): Json<FinalizeRequest>,
) -> ApiResult<(StatusCode, Json<FinalizeResponse>)> {
    let job = state
        .orchestrator
        .prepare_finalize(&job_id, &request.selected_seeds)
        .await?;

    let message = RenderMessage::finalize(job.job_id.clone());
    enqueue(&state, &message).await?;

    info!(job_id = %job.job_id, "finalize accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(FinalizeResponse {
            job_id: job.job_id,
            state: job.state,
            resolution: FINAL_RESOLUTION.to_string(),
            message: "Final render queued".to_string(),
        }),
    ))
}

/// Create a revision job from natural-language feedback and queue it.
pub async fn revise_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(request): Json<ReviseRequest>,
) -> ApiResult<(StatusCode, Json<ReviseResponse>)> {
    request.validate()?;

    let job = state
        .orchestrator
        .prepare_revise(&job_id, &request.feedback)
        .await?;

    let message = RenderMessage::revise_generate(job.job_id.clone());
    enqueue(&state, &message).await?;

    info!(
        job_id = %job.job_id,
        parent_job_id = %job_id,
        "revision accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ReviseResponse {
            job_id: job.job_id,
            parent_job_id: job_id,
            state: job.state,
            targeted_fields: job.targeted_fields,
            message: "Revision queued".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_request_accepts_string_keys() {
        let request: FinalizeRequest =
            serde_json::from_str(r#"{"selected_seeds": {"1": 42, "2": 1337}}"#).unwrap();
        assert_eq!(request.selected_seeds.get(&1), Some(&42));
        assert_eq!(request.selected_seeds.get(&2), Some(&1337));

        let empty: FinalizeRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.selected_seeds.is_empty());
    }

    #[test]
    fn test_revise_feedback_length_bounds() {
        let short = ReviseRequest {
            feedback: "more".to_string(),
        };
        assert!(short.validate().is_err());

        let ok = ReviseRequest {
            feedback: "make the second shot slower and warmer".to_string(),
        };
        assert!(ok.validate().is_ok());
    }
}
