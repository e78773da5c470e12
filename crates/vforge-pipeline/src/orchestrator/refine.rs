//! Refinement workflows: seed selection, plan edits, revisions.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use vforge_ml_client::FeedbackDelta;
use vforge_models::policy::PREVIEW_RESOLUTION;
use vforge_models::validate::TARGETABLE_FIELDS;
use vforge_models::{
    compile_shot, draw_seed, validate_plan, validate_refinement, Intent, Job, JobId, JobState,
    Shot, ShotRequest,
};

use crate::error::{PipelineError, PipelineResult};

use super::Orchestrator;

impl Orchestrator {
    /// Record the client's seed choices ahead of finalization.
    ///
    /// Every selection must point at an existing preview candidate; a
    /// finalize run should never discover a dangling seed.
    pub async fn prepare_finalize(
        &self,
        job_id: &JobId,
        selected_seeds: &HashMap<u32, i64>,
    ) -> PipelineResult<Job> {
        let job = self.require_job(job_id).await?;
        if job.state != JobState::Succeeded {
            return Err(PipelineError::WrongState {
                job_id: job_id.clone(),
                required: JobState::Succeeded,
                actual: job.state,
            });
        }
        if job.shot_requests.is_empty() {
            return Err(PipelineError::NoPlan(job_id.clone()));
        }
        if job.shot_assets.is_empty() {
            return Err(PipelineError::NoPreviewAssets(job_id.clone()));
        }
        if selected_seeds.is_empty() {
            return Err(PipelineError::InvalidSeeds(
                "selection must name at least one shot".to_string(),
            ));
        }
        for (shot_id, seed) in selected_seeds {
            let assets = job.assets_for_shot(*shot_id);
            if assets.is_empty() {
                return Err(PipelineError::InvalidSeeds(format!(
                    "shot {shot_id} has no preview assets"
                )));
            }
            if !assets.iter().any(|a| a.seed == *seed) {
                return Err(PipelineError::InvalidSeeds(format!(
                    "shot {shot_id} produced no candidate with seed {seed}"
                )));
            }
        }

        self.store.set_selected_seeds(job_id, selected_seeds).await?;
        self.require_job(job_id).await
    }

    /// Edit one shot of an existing plan and recompile its requests.
    ///
    /// Allowed in any state; the job's state machine is untouched. Other
    /// shots keep their compiled requests (and pinned seeds) verbatim.
    pub async fn edit_shot(
        &self,
        job_id: &JobId,
        shot_id: u32,
        visual: Option<String>,
        narration: Option<String>,
    ) -> PipelineResult<Shot> {
        let job = self.require_job(job_id).await?;
        let intent = job
            .intent
            .clone()
            .ok_or_else(|| PipelineError::NoPlan(job_id.clone()))?;
        let mut plan = job
            .shot_plan
            .clone()
            .ok_or_else(|| PipelineError::NoPlan(job_id.clone()))?;
        let template = self.template_for(&job)?.clone();

        {
            let shot = plan
                .shot_mut(shot_id)
                .ok_or_else(|| PipelineError::ShotNotFound {
                    job_id: job_id.clone(),
                    shot_id,
                })?;
            if let Some(visual) = visual {
                shot.visual = visual;
            }
            if let Some(narration) = narration {
                shot.audio.narration = narration;
            }
        }

        let mut requests: Vec<ShotRequest> = job
            .shot_requests
            .iter()
            .filter(|r| r.shot_id != shot_id)
            .cloned()
            .collect();
        let candidates = job.quality_mode.profile().preview_seeds.max(1);
        if let Some(shot) = plan.shot(shot_id) {
            for _ in 0..candidates {
                requests.push(compile_shot(
                    &intent,
                    &plan,
                    &template,
                    shot,
                    &self.config.model,
                    PREVIEW_RESOLUTION,
                    draw_seed(),
                ));
            }
        }
        requests.sort_by_key(|r| r.shot_id);

        self.store
            .set_plan_artifacts(
                job_id,
                &intent,
                &template.template_id,
                &plan,
                &requests,
                plan.duration_s,
            )
            .await?;
        info!(job_id = %job_id, shot_id = shot_id, "shot plan edited");

        plan.shot(shot_id)
            .cloned()
            .ok_or_else(|| PipelineError::ShotNotFound {
                job_id: job_id.clone(),
                shot_id,
            })
    }

    /// Guard a single-shot regeneration request, applying optional edits
    /// first. Returns the job ready for enqueueing.
    pub async fn prepare_regenerate(
        &self,
        job_id: &JobId,
        shot_id: u32,
        visual: Option<String>,
        narration: Option<String>,
    ) -> PipelineResult<Job> {
        let job = self.require_job(job_id).await?;
        if job.state != JobState::Succeeded {
            return Err(PipelineError::WrongState {
                job_id: job_id.clone(),
                required: JobState::Succeeded,
                actual: job.state,
            });
        }
        let plan = job
            .shot_plan
            .as_ref()
            .ok_or_else(|| PipelineError::NoPlan(job_id.clone()))?;
        if plan.shot(shot_id).is_none() {
            return Err(PipelineError::ShotNotFound {
                job_id: job_id.clone(),
                shot_id,
            });
        }

        if visual.is_some() || narration.is_some() {
            self.edit_shot(job_id, shot_id, visual, narration).await?;
        }
        self.require_job(job_id).await
    }

    /// Derive a revision job from a SUCCEEDED parent.
    ///
    /// Feedback is parsed into per-field modifications and applied to a
    /// copy of the parent's intent; the plan is re-instantiated and only
    /// shots that actually changed are recompiled with fresh seeds.
    /// Unchanged shots reuse the parent's compiled requests verbatim, so
    /// their footage is reproducible. The child is returned SUBMITTED,
    /// ready for enqueueing; no child is created when validation fails.
    pub async fn prepare_revise(&self, parent_id: &JobId, feedback: &str) -> PipelineResult<Job> {
        let parent = self.require_job(parent_id).await?;
        if parent.state != JobState::Succeeded {
            return Err(PipelineError::WrongState {
                job_id: parent_id.clone(),
                required: JobState::Succeeded,
                actual: parent.state,
            });
        }

        let violations = validate_refinement(feedback, &[]);
        if !violations.is_empty() {
            return Err(PipelineError::Validation(violations.join("; ")));
        }

        let parent_intent = parent
            .intent
            .clone()
            .ok_or_else(|| PipelineError::NoPlan(parent_id.clone()))?;
        let parent_plan = parent
            .shot_plan
            .clone()
            .ok_or_else(|| PipelineError::NoPlan(parent_id.clone()))?;
        let template = self.template_for(&parent)?.clone();

        let delta = match self.intents.parse_feedback(feedback, &parent_intent).await {
            Ok(delta) => delta,
            Err(e) => {
                warn!(
                    job_id = %parent_id,
                    error = %e,
                    "feedback parsing failed, targeting every field"
                );
                FeedbackDelta::fallback(feedback)
            }
        };
        let targeted = known_targeted_fields(&delta);

        let intent = apply_feedback(&parent_intent, &targeted, &delta.modifications);
        let mut plan = self.intents.instantiate_plan(&intent, &template).await?;
        plan.normalize(&template);

        let violations = validate_plan(&plan, &template, parent.quality_mode, &parent.resolution);
        if !violations.is_empty() {
            return Err(PipelineError::Validation(violations.join("; ")));
        }

        let candidates = parent.quality_mode.profile().preview_seeds.max(1);
        let mut requests = Vec::new();
        let mut recompiled = 0usize;
        for shot in &plan.shots {
            let unchanged = parent_plan
                .shot(shot.shot_id)
                .map(|parent_shot| parent_shot == shot)
                .unwrap_or(false);
            if unchanged {
                let reused: Vec<ShotRequest> = parent
                    .shot_requests
                    .iter()
                    .filter(|r| r.shot_id == shot.shot_id)
                    .cloned()
                    .collect();
                if !reused.is_empty() {
                    requests.extend(reused);
                    continue;
                }
            }
            recompiled += 1;
            for _ in 0..candidates {
                requests.push(compile_shot(
                    &intent,
                    &plan,
                    &template,
                    shot,
                    &self.config.model,
                    PREVIEW_RESOLUTION,
                    draw_seed(),
                ));
            }
        }

        let mut child = Job::new(
            parent.client_id.clone(),
            parent.quality_mode,
            parent.resolution.clone(),
        );
        child.revision_of = Some(parent.job_id.clone());
        child.targeted_fields = targeted.clone();
        self.store.create_job(&child).await?;
        self.store
            .set_plan_artifacts(
                &child.job_id,
                &intent,
                &template.template_id,
                &plan,
                &requests,
                plan.duration_s,
            )
            .await?;
        let child = self
            .store
            .update_state(&child.job_id, JobState::Submitted, "revision_submitted")
            .await?;

        info!(
            job_id = %child.job_id,
            parent_job_id = %parent_id,
            targeted_fields = ?targeted,
            recompiled_shots = recompiled,
            total_shots = plan.shots.len(),
            "revision created"
        );
        Ok(child)
    }
}

/// Targeted fields recognized by the compiler, deduplicated in order.
fn known_targeted_fields(delta: &FeedbackDelta) -> Vec<String> {
    let mut seen = HashSet::new();
    delta
        .targeted_fields
        .iter()
        .filter(|f| TARGETABLE_FIELDS.contains(&f.as_str()))
        .filter(|f| seen.insert(f.as_str()))
        .cloned()
        .collect()
}

/// Fold feedback modifications into a copy of the parent intent.
///
/// Camera direction has no dedicated intent field, so it lands in the
/// optimized prompt where the shot compiler picks it up. Raw unparsed
/// feedback (the fallback delta) travels the same way and lets the
/// instantiation service read it in context.
fn apply_feedback(
    parent: &Intent,
    targeted: &[String],
    modifications: &HashMap<String, String>,
) -> Intent {
    let mut intent = parent.clone();
    for field in targeted {
        match field.as_str() {
            "camera" => {
                if let Some(v) = modifications
                    .get("camera")
                    .or_else(|| modifications.get("camera_motion"))
                {
                    append_prompt_line(&mut intent, &format!("Camera direction: {v}"));
                }
            }
            "narration" => {
                if let Some(v) = modifications
                    .get("narration_tone")
                    .or_else(|| modifications.get("narration"))
                {
                    intent.audio.narration_tone = v.clone();
                }
            }
            "lighting" => {
                if let Some(v) = modifications.get("lighting") {
                    intent.style.lighting = v.clone();
                }
            }
            "emotion" => {
                if let Some(v) = modifications.get("emotion") {
                    let curve: Vec<String> = v
                        .split(',')
                        .map(|e| e.trim().to_string())
                        .filter(|e| !e.is_empty())
                        .collect();
                    if !curve.is_empty() {
                        intent.emotion_curve = curve;
                    }
                }
            }
            "pacing" => {
                if let Some(v) = modifications
                    .get("duration")
                    .or_else(|| modifications.get("pacing"))
                {
                    match v.trim().parse::<f64>() {
                        Ok(duration) if duration > 0.0 => {
                            intent.duration_preference_s = duration
                        }
                        _ => warn!(value = %v, "unparsable pacing modification ignored"),
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(raw) = modifications.get("feedback") {
        append_prompt_line(&mut intent, &format!("Revision feedback: {raw}"));
    }
    intent
}

fn append_prompt_line(intent: &mut Intent, line: &str) {
    if !intent.optimized_prompt.is_empty() {
        intent.optimized_prompt.push('\n');
    }
    intent.optimized_prompt.push_str(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_intent() -> Intent {
        let mut intent = Intent::new("city nights", 12.0);
        intent.optimized_prompt = "Neon streets after rain".to_string();
        intent.style.lighting = "sodium glow".to_string();
        intent.emotion_curve = vec!["moody".to_string()];
        intent
    }

    #[test]
    fn test_apply_feedback_routes_each_field() {
        let targeted: Vec<String> = ["camera", "narration", "lighting", "emotion", "pacing"]
            .iter()
            .map(|f| f.to_string())
            .collect();
        let mods = HashMap::from([
            ("camera".to_string(), "slow dolly in".to_string()),
            ("narration_tone".to_string(), "urgent".to_string()),
            ("lighting".to_string(), "cold blue".to_string()),
            ("emotion".to_string(), "tense, relieved".to_string()),
            ("duration".to_string(), "9.5".to_string()),
        ]);

        let intent = apply_feedback(&base_intent(), &targeted, &mods);

        assert!(intent
            .optimized_prompt
            .contains("Camera direction: slow dolly in"));
        assert_eq!(intent.audio.narration_tone, "urgent");
        assert_eq!(intent.style.lighting, "cold blue");
        assert_eq!(intent.emotion_curve, vec!["tense", "relieved"]);
        assert_eq!(intent.duration_preference_s, 9.5);
    }

    #[test]
    fn test_apply_feedback_keeps_untargeted_fields() {
        let targeted = vec!["lighting".to_string()];
        let mods = HashMap::from([
            ("lighting".to_string(), "dawn haze".to_string()),
            ("narration_tone".to_string(), "urgent".to_string()),
        ]);

        let parent = base_intent();
        let intent = apply_feedback(&parent, &targeted, &mods);

        assert_eq!(intent.style.lighting, "dawn haze");
        assert_eq!(intent.audio.narration_tone, parent.audio.narration_tone);
        assert_eq!(intent.emotion_curve, parent.emotion_curve);
        assert_eq!(intent.duration_preference_s, parent.duration_preference_s);
    }

    #[test]
    fn test_apply_feedback_ignores_unparsable_pacing() {
        let targeted = vec!["pacing".to_string()];
        let mods = HashMap::from([("pacing".to_string(), "a bit faster".to_string())]);

        let parent = base_intent();
        let intent = apply_feedback(&parent, &targeted, &mods);

        assert_eq!(intent.duration_preference_s, parent.duration_preference_s);
    }

    #[test]
    fn test_apply_feedback_fallback_carries_raw_feedback() {
        let delta = FeedbackDelta::fallback("make the whole thing feel warmer");
        let targeted = known_targeted_fields(&delta);
        assert_eq!(targeted.len(), TARGETABLE_FIELDS.len());

        let intent = apply_feedback(&base_intent(), &targeted, &delta.modifications);
        assert!(intent
            .optimized_prompt
            .contains("Revision feedback: make the whole thing feel warmer"));
    }

    #[test]
    fn test_known_targeted_fields_filters_and_deduplicates() {
        let delta = FeedbackDelta {
            targeted_fields: vec![
                "camera".to_string(),
                "soundtrack".to_string(),
                "camera".to_string(),
                "pacing".to_string(),
            ],
            modifications: HashMap::new(),
        };
        assert_eq!(
            known_targeted_fields(&delta),
            vec!["camera".to_string(), "pacing".to_string()]
        );
    }
}
