//! Planning workflows: intent parsing, template matching, compilation.

use tracing::info;

use vforge_models::policy::{is_supported_resolution, PREVIEW_RESOLUTION};
use vforge_models::{
    compile_requests, to_wire_size, validate_plan, Intent, Job, JobId, JobState, QualityMode,
    ShotPlan, ShotRequest, Template,
};

use crate::error::{PipelineError, PipelineResult};
use crate::matcher::MatchStrategy;
use crate::metrics;

use super::Orchestrator;

/// A new top-level request, shared by the plan-only and generate flows.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub client_id: String,
    pub prompt: String,
    pub quality_mode: QualityMode,
    /// Requested output resolution, `x` or `*` separated.
    pub resolution: String,
    /// Overrides whatever duration the intent parser inferred.
    pub duration_preference_s: Option<f64>,
}

/// A job that finished planning, plus match details the job record
/// does not carry.
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub job: Job,
    pub confidence: f64,
    pub strategy: MatchStrategy,
}

/// Everything planning produces before it is persisted.
struct PlanArtifacts {
    intent: Intent,
    template: Template,
    confidence: f64,
    strategy: MatchStrategy,
    plan: ShotPlan,
    requests: Vec<ShotRequest>,
    total_duration_s: f64,
}

impl Orchestrator {
    /// Run the plan-only workflow to completion.
    ///
    /// The job walks CREATED -> SUBMITTED -> RUNNING -> SUCCEEDED without
    /// ever touching the generator; a SUCCEEDED plan-only job can later be
    /// rendered. Planning failures sink into the job as FAILED.
    pub async fn plan_only(&self, request: JobRequest) -> PipelineResult<PlannedJob> {
        let job = self.create_job(&request).await?;
        self.store
            .update_state(&job.job_id, JobState::Submitted, "planning_submitted")
            .await?;
        self.store
            .update_state(&job.job_id, JobState::Running, "planning_started")
            .await?;

        let artifacts = match self.build_plan(&request, &job).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                self.sink_failure(&job.job_id, &e, "planning_failed", "plan")
                    .await?;
                return Err(e);
            }
        };
        self.persist_artifacts(&job, &artifacts).await?;

        let job = self
            .store
            .update_state(&job.job_id, JobState::Succeeded, "planning_complete")
            .await?;
        self.snapshot_metadata(&job).await;
        metrics::record_job_outcome("plan", "succeeded");

        Ok(PlannedJob {
            job,
            confidence: artifacts.confidence,
            strategy: artifacts.strategy,
        })
    }

    /// Planning half of the generate workflow.
    ///
    /// Leaves the job SUBMITTED with compiled requests; the caller enqueues
    /// it for the worker. Planning failures sink into the job as FAILED.
    pub async fn prepare_generate(&self, request: JobRequest) -> PipelineResult<Job> {
        let job = self.create_job(&request).await?;
        self.store
            .update_state(&job.job_id, JobState::Submitted, "workflow_submitted")
            .await?;

        let artifacts = match self.build_plan(&request, &job).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                self.sink_failure(&job.job_id, &e, "planning_failed", "generate")
                    .await?;
                return Err(e);
            }
        };
        self.persist_artifacts(&job, &artifacts).await?;

        self.require_job(&job.job_id).await
    }

    /// Guard a render request for a previously planned job.
    ///
    /// Returns the job ready for enqueueing, without changing its state.
    pub async fn prepare_render(&self, job_id: &JobId) -> PipelineResult<Job> {
        let job = self.require_job(job_id).await?;

        match job.state {
            JobState::Running => {
                return Err(PipelineError::NotRenderable {
                    job_id: job_id.clone(),
                    reason: "generation is already running".to_string(),
                })
            }
            JobState::Failed => {
                return Err(PipelineError::NotRenderable {
                    job_id: job_id.clone(),
                    reason: "job has failed".to_string(),
                })
            }
            _ => {}
        }
        if job.shot_requests.is_empty() {
            return Err(PipelineError::NoPlan(job_id.clone()));
        }
        if !job.shot_assets.is_empty() {
            return Err(PipelineError::NotRenderable {
                job_id: job_id.clone(),
                reason: "job already has generated assets".to_string(),
            });
        }

        Ok(job)
    }

    async fn create_job(&self, request: &JobRequest) -> PipelineResult<Job> {
        let resolution = to_wire_size(&request.resolution);
        if !is_supported_resolution(&resolution) {
            return Err(PipelineError::Validation(format!(
                "unsupported resolution: {}",
                request.resolution
            )));
        }

        let job = Job::new(request.client_id.clone(), request.quality_mode, resolution);
        self.store.create_job(&job).await?;
        info!(
            job_id = %job.job_id,
            quality_mode = %job.quality_mode,
            resolution = %job.resolution,
            "job created"
        );
        Ok(job)
    }

    /// Parse, match, instantiate, validate, compile.
    async fn build_plan(&self, request: &JobRequest, job: &Job) -> PipelineResult<PlanArtifacts> {
        let mut intent = self
            .intents
            .parse_intent(&request.prompt, request.quality_mode)
            .await?;
        if let Some(duration) = request.duration_preference_s {
            intent.duration_preference_s = duration;
        }
        intent.quality_mode = request.quality_mode;

        let matched = match self.matcher.match_intent(&intent, &self.catalog).await {
            Some(matched) => matched,
            None => {
                metrics::record_template_match_miss();
                return Err(PipelineError::ClarificationRequired(
                    "no template matched the request confidently enough; \
                     add detail about the topic, style, or mood"
                        .to_string(),
                ));
            }
        };
        metrics::record_template_match(matched.strategy.as_str());
        info!(
            job_id = %job.job_id,
            template_id = %matched.template.template_id,
            confidence = matched.confidence,
            strategy = matched.strategy.as_str(),
            "template matched"
        );

        let mut plan = self
            .intents
            .instantiate_plan(&intent, &matched.template)
            .await?;
        plan.normalize(&matched.template);

        let violations = validate_plan(&plan, &matched.template, request.quality_mode, &job.resolution);
        if !violations.is_empty() {
            return Err(PipelineError::Validation(violations.join("; ")));
        }

        let candidates = request.quality_mode.profile().preview_seeds;
        let requests = compile_requests(
            &intent,
            &plan,
            &matched.template,
            &self.config.model,
            PREVIEW_RESOLUTION,
            candidates,
        );
        let total_duration_s = plan.duration_s;

        Ok(PlanArtifacts {
            intent,
            confidence: matched.confidence,
            strategy: matched.strategy,
            template: matched.template,
            plan,
            requests,
            total_duration_s,
        })
    }

    async fn persist_artifacts(&self, job: &Job, artifacts: &PlanArtifacts) -> PipelineResult<()> {
        self.store
            .set_plan_artifacts(
                &job.job_id,
                &artifacts.intent,
                &artifacts.template.template_id,
                &artifacts.plan,
                &artifacts.requests,
                artifacts.total_duration_s,
            )
            .await?;
        Ok(())
    }
}
