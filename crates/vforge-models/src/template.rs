//! Template catalog entries: tags, constraints and shot skeletons.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::plan::SubtitlePolicy;

/// Identifier for a catalog template (a slug, e.g. `sleep_wind_down`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Narrative role of a skeleton slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkeletonRole {
    /// Opening beat that earns attention.
    Hook,
    /// Middle beat that explains or develops.
    Mechanism,
    /// Closing beat that resolves.
    Payoff,
}

impl SkeletonRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkeletonRole::Hook => "hook",
            SkeletonRole::Mechanism => "mechanism",
            SkeletonRole::Payoff => "payoff",
        }
    }
}

/// Audio scaffolding for one skeleton slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioTemplate {
    /// Sound-effect direction (e.g. "soft rain, distant thunder").
    #[serde(default)]
    pub sfx: String,

    /// Narration scaffold with `{topic}`-style placeholders.
    #[serde(default)]
    pub narration_template: String,
}

/// One slot of a template's shot structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotSkeleton {
    /// 1-based position in the template.
    pub shot_id: u32,

    pub role: SkeletonRole,

    /// Target duration in seconds (within global shot bounds).
    pub duration_s: f64,

    /// Camera framing hint (e.g. "slow push-in, medium close-up").
    #[serde(default)]
    pub camera: String,

    /// Visual prompt scaffold with placeholders.
    #[serde(default)]
    pub visual_template: String,

    #[serde(default)]
    pub audio_template: AudioTemplate,

    /// Per-slot override of the template subtitle policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_policy: Option<SubtitlePolicy>,
}

/// Keyword tag sets used by the matcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateTags {
    #[serde(default)]
    pub topic: Vec<String>,
    #[serde(default)]
    pub tone: Vec<String>,
    #[serde(default)]
    pub style: Vec<String>,
    #[serde(default)]
    pub emotion: Vec<String>,

    /// Subtitle policy this template was authored for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_policy: Option<SubtitlePolicy>,
}

/// Numeric and categorical constraints a plan must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateConstraints {
    /// Inclusive [min, max] total duration in seconds.
    pub duration_s_range: [f64; 2],

    /// Resolutions this template supports, wire format.
    #[serde(default)]
    pub allowed_sizes: Vec<String>,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Whether generated shots carry the provider watermark by default.
    #[serde(default)]
    pub watermark_default: bool,
}

fn default_fps() -> u32 {
    24
}

/// A reusable content skeleton: tags for matching, constraints for
/// validation, and ordered shot slots for instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Template {
    pub template_id: TemplateId,

    /// Version string, dotted (e.g. "1.0").
    pub version: String,

    #[serde(default)]
    pub tags: TemplateTags,

    pub constraints: TemplateConstraints,

    pub shot_skeletons: Vec<ShotSkeleton>,

    /// Base negative prompt every compiled request starts from.
    #[serde(default)]
    pub negative_prompt_base: String,
}

impl Template {
    /// Sum of the skeletons' target durations.
    pub fn skeleton_total_duration_s(&self) -> f64 {
        self.shot_skeletons.iter().map(|s| s.duration_s).sum()
    }

    /// Skeleton at a 1-based shot id.
    pub fn skeleton(&self, shot_id: u32) -> Option<&ShotSkeleton> {
        self.shot_skeletons.iter().find(|s| s.shot_id == shot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_template() -> Template {
        Template {
            template_id: TemplateId::from_string("sleep_wind_down"),
            version: "1.0".to_string(),
            tags: TemplateTags {
                topic: vec!["sleep".into(), "insomnia".into()],
                tone: vec!["calm".into()],
                style: vec!["soft focus".into()],
                emotion: vec!["tension".into(), "release".into()],
                subtitle_policy: Some(SubtitlePolicy::None),
            },
            constraints: TemplateConstraints {
                duration_s_range: [6.0, 12.0],
                allowed_sizes: vec!["1280*720".into(), "1920*1080".into()],
                fps: 24,
                watermark_default: false,
            },
            shot_skeletons: vec![
                ShotSkeleton {
                    shot_id: 1,
                    role: SkeletonRole::Hook,
                    duration_s: 3.0,
                    camera: "slow push-in".into(),
                    visual_template: "a dim bedroom, {topic}".into(),
                    audio_template: AudioTemplate::default(),
                    subtitle_policy: None,
                },
                ShotSkeleton {
                    shot_id: 2,
                    role: SkeletonRole::Payoff,
                    duration_s: 6.0,
                    camera: "static wide".into(),
                    visual_template: "calm breathing under covers".into(),
                    audio_template: AudioTemplate::default(),
                    subtitle_policy: None,
                },
            ],
            negative_prompt_base: "harsh light".to_string(),
        }
    }

    #[test]
    fn test_skeleton_lookup() {
        let template = sample_template();
        assert_eq!(template.skeleton(2).unwrap().role, SkeletonRole::Payoff);
        assert!(template.skeleton(9).is_none());
    }

    #[test]
    fn test_skeleton_total() {
        assert!((sample_template().skeleton_total_duration_s() - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_template_json_round_trip() {
        let template = sample_template();
        let json = serde_json::to_string(&template).unwrap();
        let back: Template = serde_json::from_str(&json).unwrap();
        assert_eq!(back.template_id, template.template_id);
        assert_eq!(back.shot_skeletons.len(), 2);
    }
}
