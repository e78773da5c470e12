//! Rendering workflows: shot fan-out, finalization, single-shot regeneration.

use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use vforge_media::MediaError;
use vforge_models::policy::FINAL_RESOLUTION;
use vforge_models::{
    compile_shot, draw_seed, ErrorClass, Job, JobError, JobErrorKind, JobId, JobState, ShotAsset,
    ShotError, ShotRequest,
};
use vforge_storage::{regen_suffix, FINAL_SUFFIX};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics;

use super::Orchestrator;

/// Transition labels for one render flavor.
struct RunLabels {
    started: &'static str,
    complete: &'static str,
    failed: &'static str,
    /// Metrics label for the workflow.
    operation: &'static str,
}

/// What one fan-out over requests produced.
struct BatchOutcome {
    produced: Vec<ShotAsset>,
    failures: Vec<ShotError>,
}

impl Orchestrator {
    /// Execute generation for a planned job. Worker-side.
    pub async fn run_generate(&self, job_id: &JobId) -> PipelineResult<Job> {
        self.execute_render(
            job_id,
            RunLabels {
                started: "generation_started",
                complete: "generation_complete",
                failed: "generation_failed",
                operation: "generate",
            },
        )
        .await
    }

    /// Execute generation for a revision job. Worker-side.
    pub async fn run_revise_generate(&self, job_id: &JobId) -> PipelineResult<Job> {
        self.execute_render(
            job_id,
            RunLabels {
                started: "revision_started",
                complete: "revision_complete",
                failed: "revision_failed",
                operation: "revise",
            },
        )
        .await
    }

    /// Re-render the selected seeds at final resolution. Worker-side.
    ///
    /// Every selected shot must succeed; a partial finalization would
    /// silently mix preview and final footage.
    pub async fn run_finalize(&self, job_id: &JobId) -> PipelineResult<Job> {
        let job = self.require_job(job_id).await?;
        if job.selected_seeds.is_empty() {
            return Err(PipelineError::InvalidSeeds(
                "no seed selection recorded".to_string(),
            ));
        }

        let mut selected: Vec<(u32, i64)> =
            job.selected_seeds.iter().map(|(s, v)| (*s, *v)).collect();
        selected.sort_unstable();

        let mut requests = Vec::with_capacity(selected.len());
        for (shot_id, seed) in &selected {
            let base = job
                .shot_requests
                .iter()
                .find(|r| r.shot_id == *shot_id)
                .ok_or_else(|| {
                    PipelineError::InvalidSeeds(format!("shot {shot_id} has no compiled request"))
                })?;
            let mut request = base.clone();
            request.params.size = FINAL_RESOLUTION.to_string();
            request.params.seed = *seed;
            requests.push(request);
        }

        let job = self
            .store
            .update_state(job_id, JobState::Running, "finalization_started")
            .await?;
        let outcome = self
            .run_shot_batch(&job, &requests, Some(FINAL_SUFFIX), true)
            .await?;

        let produced: HashSet<u32> = outcome.produced.iter().map(|a| a.shot_id).collect();
        let job = if produced.len() == selected.len() {
            self.store
                .update_state(job_id, JobState::Succeeded, "finalization_complete")
                .await?
        } else {
            let detail = format!(
                "finalization produced {} of {} selected shots{}",
                produced.len(),
                selected.len(),
                failed_shot_list(&outcome.failures)
            );
            self.store
                .fail_job(
                    job_id,
                    &JobError::new(JobErrorKind::Generation, detail),
                    "finalization_failed",
                )
                .await?
        };
        self.snapshot_metadata(&job).await;
        metrics::record_job_outcome(
            "finalize",
            if job.state == JobState::Succeeded {
                "succeeded"
            } else {
                "failed"
            },
        );
        Ok(job)
    }

    /// Regenerate one shot of a SUCCEEDED job at its output resolution,
    /// replacing that shot's assets. Worker-side.
    ///
    /// A failed regeneration keeps the previous assets and returns the job
    /// to SUCCEEDED; only the shot error record says what went wrong.
    pub async fn run_regenerate(&self, job_id: &JobId, shot_id: u32) -> PipelineResult<Job> {
        let job = self.require_job(job_id).await?;
        let intent = job
            .intent
            .clone()
            .ok_or_else(|| PipelineError::NoPlan(job_id.clone()))?;
        let plan = job
            .shot_plan
            .clone()
            .ok_or_else(|| PipelineError::NoPlan(job_id.clone()))?;
        let template = self.template_for(&job)?.clone();
        let shot = plan
            .shot(shot_id)
            .ok_or_else(|| PipelineError::ShotNotFound {
                job_id: job_id.clone(),
                shot_id,
            })?;

        let request = compile_shot(
            &intent,
            &plan,
            &template,
            shot,
            &self.config.model,
            &job.resolution,
            draw_seed(),
        );

        let job = self
            .store
            .update_state(job_id, JobState::Running, "shot_regeneration_started")
            .await?;
        let suffix = regen_suffix(Utc::now().timestamp());
        let outcome = self
            .run_shot_batch(&job, std::slice::from_ref(&request), Some(&suffix), true)
            .await?;

        let job = if outcome.failures.is_empty() {
            // The stored requests now describe the shot as actually rendered.
            let mut requests: Vec<ShotRequest> = job
                .shot_requests
                .iter()
                .filter(|r| r.shot_id != shot_id)
                .cloned()
                .collect();
            requests.push(request);
            requests.sort_by_key(|r| r.shot_id);
            self.store
                .set_plan_artifacts(
                    job_id,
                    &intent,
                    &template.template_id,
                    &plan,
                    &requests,
                    job.total_duration_s,
                )
                .await?;
            metrics::record_job_outcome("regenerate", "succeeded");
            self.store
                .update_state(job_id, JobState::Succeeded, "shot_regeneration_complete")
                .await?
        } else {
            warn!(
                job_id = %job_id,
                shot_id = shot_id,
                "shot regeneration failed, keeping previous assets"
            );
            metrics::record_job_outcome("regenerate", "failed");
            self.store
                .update_state(job_id, JobState::Succeeded, "shot_regeneration_failed")
                .await?
        };
        self.snapshot_metadata(&job).await;
        Ok(job)
    }

    /// Shared body of the generate and revise render flavors.
    async fn execute_render(&self, job_id: &JobId, labels: RunLabels) -> PipelineResult<Job> {
        let job = self.require_job(job_id).await?;
        if job.shot_requests.is_empty() {
            // A planless job on the queue can never make progress.
            let e = PipelineError::NoPlan(job_id.clone());
            self.sink_failure(job_id, &e, labels.failed, labels.operation)
                .await?;
            return Err(e);
        }

        let job = self
            .store
            .update_state(job_id, JobState::Running, labels.started)
            .await?;
        let outcome = self
            .run_shot_batch(&job, &job.shot_requests, None, false)
            .await?;

        let planned = job.planned_shot_count();
        let produced: HashSet<u32> = outcome.produced.iter().map(|a| a.shot_id).collect();
        let job = if self.config.success_policy.is_met(produced.len(), planned) {
            self.store
                .update_state(job_id, JobState::Succeeded, labels.complete)
                .await?
        } else {
            let detail = format!(
                "{} of {planned} shots produced assets{}",
                produced.len(),
                failed_shot_list(&outcome.failures)
            );
            self.store
                .fail_job(
                    job_id,
                    &JobError::new(JobErrorKind::Generation, detail),
                    labels.failed,
                )
                .await?
        };
        self.snapshot_metadata(&job).await;
        metrics::record_job_outcome(
            labels.operation,
            if job.state == JobState::Succeeded {
                "succeeded"
            } else {
                "failed"
            },
        );
        info!(
            job_id = %job_id,
            state = %job.state,
            shots = produced.len(),
            planned = planned,
            "render settled"
        );
        Ok(job)
    }

    /// Fan requests out to the generator under bounded concurrency.
    ///
    /// Each produced asset is persisted as it lands, so a partially
    /// successful batch leaves partial results queryable. Failures are
    /// recorded per shot and returned for the caller to settle the job.
    async fn run_shot_batch(
        &self,
        job: &Job,
        requests: &[ShotRequest],
        suffix: Option<&str>,
        replace: bool,
    ) -> PipelineResult<BatchOutcome> {
        let semaphore = Semaphore::new(self.config.shot_concurrency.max(1));
        let budget = self.generator.poll_budget(job.quality_mode);

        let futures: Vec<_> = requests
            .iter()
            .map(|request| {
                let semaphore = &semaphore;
                async move {
                    let _permit = semaphore.acquire().await.map_err(|_| ShotError {
                        shot_id: request.shot_id,
                        seed: Some(request.params.seed),
                        class: ErrorClass::Fatal,
                        message: "shot worker pool closed".to_string(),
                    })?;
                    self.generate_one(job, request, budget, suffix, replace)
                        .await
                }
            })
            .collect();

        let results = join_all(futures).await;

        let mut produced = Vec::new();
        let mut failures = Vec::new();
        let mut task_ids = Vec::new();
        for result in results {
            match result {
                Ok(asset) => {
                    task_ids.push(asset.model_task_id.clone());
                    produced.push(asset);
                }
                Err(shot_error) => {
                    metrics::record_shot_failure(shot_error.class.as_str());
                    warn!(
                        job_id = %job.job_id,
                        shot_id = shot_error.shot_id,
                        class = shot_error.class.as_str(),
                        error = %shot_error.message,
                        "shot failed"
                    );
                    self.store.record_shot_error(&job.job_id, &shot_error).await?;
                    failures.push(shot_error);
                }
            }
        }
        self.store
            .append_external_task_ids(&job.job_id, &task_ids)
            .await?;

        Ok(BatchOutcome { produced, failures })
    }

    /// Generate one shot request end to end: submit, poll, download,
    /// demux, persist.
    async fn generate_one(
        &self,
        job: &Job,
        request: &ShotRequest,
        budget: Duration,
        batch_suffix: Option<&str>,
        replace: bool,
    ) -> Result<ShotAsset, ShotError> {
        let shot_id = request.shot_id;
        let seed = request.params.seed;
        metrics::record_shot_attempt();
        let started = Instant::now();

        let outcome = self
            .generator
            .generate(request, budget)
            .await
            .map_err(|e| ShotError {
                shot_id,
                seed: Some(seed),
                class: e.class(),
                message: e.to_string(),
            })?;

        // Candidate files carry the seed so sibling previews of one shot
        // never collide on disk.
        let seed_suffix;
        let suffix = match batch_suffix {
            Some(s) => s,
            None => {
                seed_suffix = format!("seed{seed}");
                &seed_suffix
            }
        };
        let dest = self
            .assets
            .shot_destinations(&job.job_id, shot_id, job.created_at, Some(suffix));

        let split = self
            .media
            .ingest_shot(&outcome.video_url, &dest, request.params.duration as f64)
            .await
            .map_err(|e| ShotError {
                shot_id,
                seed: Some(seed),
                class: media_error_class(&e),
                message: e.to_string(),
            })?;

        let asset = ShotAsset {
            shot_id,
            seed,
            model_task_id: outcome.task_id,
            raw_video_url: outcome.video_url,
            video_path: dest.video_path.display().to_string(),
            audio_path: split.audio_path.as_ref().map(|p| p.display().to_string()),
            video_url: dest.video_url,
            audio_url: split.audio_path.is_some().then_some(dest.audio_url),
            duration_s: split.duration_s,
            resolution: request.params.size.clone(),
        };

        let persisted = if replace {
            self.store.replace_shot_assets(&job.job_id, &asset).await
        } else {
            self.store.upsert_shot_asset(&job.job_id, &asset).await
        };
        persisted.map_err(|e| ShotError {
            shot_id,
            seed: Some(seed),
            class: ErrorClass::Retryable,
            message: format!("asset persistence failed: {e}"),
        })?;

        metrics::record_shot_generation_seconds(started.elapsed().as_secs_f64());
        info!(
            job_id = %job.job_id,
            shot_id = shot_id,
            seed = seed,
            duration_s = split.duration_s,
            "shot asset stored"
        );
        Ok(asset)
    }
}

/// Whether a media failure is worth another delivery attempt.
fn media_error_class(error: &MediaError) -> ErrorClass {
    match error {
        MediaError::Timeout(_) | MediaError::Http(_) | MediaError::DownloadFailed { .. } => {
            ErrorClass::Retryable
        }
        _ => ErrorClass::Fatal,
    }
}

fn failed_shot_list(failures: &[ShotError]) -> String {
    let shots: BTreeSet<u32> = failures.iter().map(|e| e.shot_id).collect();
    if shots.is_empty() {
        return String::new();
    }
    let ids: Vec<String> = shots.iter().map(|s| s.to_string()).collect();
    format!(" (failed shots: {})", ids.join(", "))
}
