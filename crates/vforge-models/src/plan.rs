//! Shot plans: a template instantiated for one intent.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::template::{Template, TemplateId};

/// Whether burned-in text is allowed in generated shots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitlePolicy {
    /// No text, subtitles, watermarks or logos anywhere in frame.
    #[default]
    None,
    /// The generator may render captions.
    Allowed,
}

impl SubtitlePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitlePolicy::None => "none",
            SubtitlePolicy::Allowed => "allowed",
        }
    }
}

/// Audio content for one shot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotAudio {
    /// Sound-effect direction.
    #[serde(default)]
    pub sfx: String,

    /// Narration line spoken over the shot.
    #[serde(default)]
    pub narration: String,
}

/// One independently generated segment of the piece.
///
/// The instantiation service fills these from skeleton scaffolds; field
/// aliases absorb the duration key variants it is known to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Shot {
    /// 1-based position; 0 means "unassigned" until normalization.
    #[serde(default)]
    pub shot_id: u32,

    #[serde(default, alias = "duration", alias = "length_s")]
    pub duration_s: f64,

    /// Camera framing (e.g. "slow push-in, medium close-up").
    #[serde(default)]
    pub camera: String,

    /// Visual prompt for this shot.
    #[serde(default)]
    pub visual: String,

    /// Camera motion (e.g. "drift left", "locked off").
    #[serde(default)]
    pub camera_motion: String,

    #[serde(default)]
    pub audio: ShotAudio,
}

/// Global rendering hints carried by the plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlobalStyle {
    /// Preferred resolution, wire format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
}

/// A template instantiated for one intent: the ordered set of shots the
/// generator will be asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotPlan {
    #[serde(default)]
    pub template_id: Option<TemplateId>,

    #[serde(default)]
    pub template_version: Option<String>,

    /// Total duration in seconds; recomputed from shots on normalization.
    #[serde(default)]
    pub duration_s: f64,

    #[serde(default)]
    pub subtitle_policy: Option<SubtitlePolicy>,

    pub shots: Vec<Shot>,

    #[serde(default)]
    pub global_style: GlobalStyle,
}

impl ShotPlan {
    /// Resolved subtitle policy (defaults to `none` when never declared).
    pub fn policy(&self) -> SubtitlePolicy {
        self.subtitle_policy.unwrap_or_default()
    }

    /// Shot at a 1-based id.
    pub fn shot(&self, shot_id: u32) -> Option<&Shot> {
        self.shots.iter().find(|s| s.shot_id == shot_id)
    }

    /// Mutable shot at a 1-based id.
    pub fn shot_mut(&mut self, shot_id: u32) -> Option<&mut Shot> {
        self.shots.iter_mut().find(|s| s.shot_id == shot_id)
    }

    /// Repair an instantiated plan against its template.
    ///
    /// The instantiation service is an LLM boundary: ids come back missing
    /// or duplicated, durations come back zero or under different keys, and
    /// template bookkeeping is often dropped. Normalization guarantees:
    ///
    /// - shot ids are a contiguous 1-based sequence in plan order
    /// - every duration is positive, falling back to the skeleton value
    /// - `duration_s` equals the sum of shot durations
    /// - template id/version and subtitle policy are backfilled
    pub fn normalize(&mut self, template: &Template) {
        let needs_renumber = self
            .shots
            .iter()
            .enumerate()
            .any(|(i, s)| s.shot_id != (i as u32) + 1);

        for (i, shot) in self.shots.iter_mut().enumerate() {
            let position = (i as u32) + 1;
            if needs_renumber {
                shot.shot_id = position;
            }

            if shot.duration_s <= 0.0 {
                if let Some(skeleton) = template.skeleton(position) {
                    shot.duration_s = skeleton.duration_s;
                }
            }
            if shot.camera.is_empty() {
                if let Some(skeleton) = template.skeleton(position) {
                    shot.camera = skeleton.camera.clone();
                }
            }
        }

        self.duration_s = self.shots.iter().map(|s| s.duration_s).sum();

        if self.template_id.is_none() {
            self.template_id = Some(template.template_id.clone());
        }
        if self.template_version.is_none() {
            self.template_version = Some(template.version.clone());
        }
        if self.subtitle_policy.is_none() {
            self.subtitle_policy =
                Some(template.tags.subtitle_policy.unwrap_or_default());
        }
    }
}
