//! Parameter validation against policy and template constraints.
//!
//! Returns human-readable violations; an empty list means the plan may
//! proceed to compilation. Any non-empty list is a hard stop before the
//! first external generation call.

use crate::plan::ShotPlan;
use crate::policy::{self, MAX_SHOT_DURATION_S, MIN_SHOT_DURATION_S};
use crate::quality::QualityMode;
use crate::template::Template;

/// Fields a revision is allowed to target.
pub const TARGETABLE_FIELDS: &[&str] =
    &["camera", "narration", "lighting", "emotion", "pacing"];

/// Minimum free-text feedback length for a revision.
pub const MIN_FEEDBACK_LEN: usize = 5;

/// Maximum free-text feedback length for a revision.
pub const MAX_FEEDBACK_LEN: usize = 500;

/// Check a normalized plan against the template's constraints, the quality
/// mode's limits and global policy. Ordering matters only for readability
/// of the returned list.
pub fn validate_plan(
    plan: &ShotPlan,
    template: &Template,
    mode: QualityMode,
    resolution: &str,
) -> Vec<String> {
    let mut violations = Vec::new();
    let profile = mode.profile();
    let tolerance = profile.strictness.duration_tolerance();

    let [min_total, max_total] = template.constraints.duration_s_range;
    let lo = min_total * (1.0 - tolerance);
    let hi = max_total * (1.0 + tolerance);
    if plan.duration_s < lo || plan.duration_s > hi {
        violations.push(format!(
            "total duration {:.1}s outside template range {:.1}-{:.1}s ({} tolerance {:.0}%)",
            plan.duration_s,
            min_total,
            max_total,
            mode,
            tolerance * 100.0
        ));
    }

    if plan.shots.is_empty() {
        violations.push("plan has no shots".to_string());
    }
    if plan.shots.len() > profile.max_shots {
        violations.push(format!(
            "{} shots exceeds the {} mode limit of {}",
            plan.shots.len(),
            mode,
            profile.max_shots
        ));
    }

    let shot_max = MAX_SHOT_DURATION_S.min(profile.max_shot_duration_s);
    for shot in &plan.shots {
        if shot.duration_s < MIN_SHOT_DURATION_S || shot.duration_s > shot_max {
            violations.push(format!(
                "shot {} duration {:.1}s outside {:.0}-{:.0}s",
                shot.shot_id, shot.duration_s, MIN_SHOT_DURATION_S, shot_max
            ));
        }
    }

    if !policy::is_supported_resolution(resolution) {
        violations.push(format!(
            "resolution {} not supported (expected one of {})",
            resolution,
            policy::SUPPORTED_RESOLUTIONS.join(", ")
        ));
    } else if !template.constraints.allowed_sizes.is_empty()
        && !template
            .constraints
            .allowed_sizes
            .iter()
            .any(|s| s == resolution)
    {
        violations.push(format!(
            "resolution {} not allowed by template {}",
            resolution, template.template_id
        ));
    }

    violations
}

/// Check revision inputs: feedback length and targeted-field names.
pub fn validate_refinement(feedback: &str, targeted_fields: &[String]) -> Vec<String> {
    let mut violations = Vec::new();

    let len = feedback.trim().len();
    if len < MIN_FEEDBACK_LEN {
        violations.push(format!(
            "feedback too short ({} chars, minimum {})",
            len, MIN_FEEDBACK_LEN
        ));
    }
    if len > MAX_FEEDBACK_LEN {
        violations.push(format!(
            "feedback too long ({} chars, maximum {})",
            len, MAX_FEEDBACK_LEN
        ));
    }

    for field in targeted_fields {
        if !TARGETABLE_FIELDS.contains(&field.as_str()) {
            violations.push(format!(
                "unknown targeted field '{}' (expected one of {})",
                field,
                TARGETABLE_FIELDS.join(", ")
            ));
        }
    }

    violations
}
