//! Structured intent produced by the text-understanding service.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::plan::SubtitlePolicy;
use crate::quality::QualityMode;

/// Visual style hints extracted from the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StyleHints {
    #[serde(default)]
    pub visual: String,
    #[serde(default)]
    pub color_tone: String,
    #[serde(default)]
    pub lighting: String,
}

/// Scene hints extracted from the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneHints {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub time_of_day: String,
    #[serde(default)]
    pub weather: String,
}

/// A recurring character the shots must keep consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Audio requirements for the whole piece.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioSpec {
    /// Narration language (e.g. "en", "zh").
    #[serde(default)]
    pub narration_language: String,

    /// Narration delivery tone (e.g. "calm", "energetic").
    #[serde(default)]
    pub narration_tone: String,

    /// Sound-effect hints.
    #[serde(default)]
    pub sfx_hints: Vec<String>,
}

/// Structured representation of a user's request.
///
/// Produced once per job (or per revision) by the intent parser and
/// immutable afterwards. The shape is validated at the service boundary;
/// downstream components never re-check it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Intent {
    /// Subject of the piece (e.g. "insomnia relief").
    pub topic: String,

    /// Goal label (e.g. "educate", "soothe", "promote").
    #[serde(default)]
    pub intent: String,

    /// LLM-optimized creative brief.
    #[serde(default)]
    pub optimized_prompt: String,

    #[serde(default)]
    pub style: StyleHints,

    #[serde(default)]
    pub scene: SceneHints,

    #[serde(default)]
    pub characters: Vec<Character>,

    /// Ordered emotion labels the piece should move through.
    #[serde(default)]
    pub emotion_curve: Vec<String>,

    #[serde(default)]
    pub subtitle_policy: SubtitlePolicy,

    #[serde(default)]
    pub audio: AudioSpec,

    /// Requested total duration in seconds.
    pub duration_preference_s: f64,

    #[serde(default)]
    pub quality_mode: QualityMode,
}

impl Intent {
    /// Minimal intent for a topic and duration; remaining fields default.
    pub fn new(topic: impl Into<String>, duration_preference_s: f64) -> Self {
        Self {
            topic: topic.into(),
            intent: String::new(),
            optimized_prompt: String::new(),
            style: StyleHints::default(),
            scene: SceneHints::default(),
            characters: Vec::new(),
            emotion_curve: Vec::new(),
            subtitle_policy: SubtitlePolicy::default(),
            audio: AudioSpec::default(),
            duration_preference_s,
            quality_mode: QualityMode::default(),
        }
    }
}
