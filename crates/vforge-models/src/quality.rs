//! Quality mode definitions.
//!
//! Quality modes control the preview/finalize trade-off for a job:
//!
//! - `Fast`: single preview candidate, short shots, loose validation
//! - `Balanced`: two candidates per shot, standard validation
//! - `High`: three candidates per shot, long shots, strict validation

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Quality mode for a generation job.
///
/// Controls candidate count, shot limits, validation strictness and the
/// per-shot generation timeout scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    /// One preview candidate per shot, loose validation. Fastest turnaround.
    Fast,

    /// Two preview candidates per shot, standard validation.
    #[default]
    Balanced,

    /// Three preview candidates per shot, strict validation. Best quality.
    High,
}

/// Validation strictness attached to a quality mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    Loose,
    Standard,
    Strict,
}

impl Strictness {
    /// Fractional tolerance applied to template duration bounds.
    pub fn duration_tolerance(&self) -> f64 {
        match self {
            Strictness::Loose => 0.20,
            Strictness::Standard => 0.10,
            Strictness::Strict => 0.05,
        }
    }
}

/// Per-mode policy values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeProfile {
    /// Preview candidates generated per shot.
    pub preview_seeds: u32,
    /// Maximum number of shots in a plan.
    pub max_shots: usize,
    /// Maximum duration of a single shot in seconds.
    pub max_shot_duration_s: f64,
    /// Validation strictness.
    pub strictness: Strictness,
    /// Multiplier applied to the per-shot generation timeout.
    pub timeout_multiplier: f64,
}

impl QualityMode {
    /// All available quality modes.
    pub const ALL: &'static [QualityMode] =
        &[QualityMode::Fast, QualityMode::Balanced, QualityMode::High];

    /// Returns the mode name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityMode::Fast => "fast",
            QualityMode::Balanced => "balanced",
            QualityMode::High => "high",
        }
    }

    /// Policy profile for this mode.
    pub fn profile(&self) -> ModeProfile {
        match self {
            QualityMode::Fast => ModeProfile {
                preview_seeds: 1,
                max_shots: 3,
                max_shot_duration_s: 10.0,
                strictness: Strictness::Loose,
                timeout_multiplier: 0.8,
            },
            QualityMode::Balanced => ModeProfile {
                preview_seeds: 2,
                max_shots: 6,
                max_shot_duration_s: 12.0,
                strictness: Strictness::Standard,
                timeout_multiplier: 1.0,
            },
            QualityMode::High => ModeProfile {
                preview_seeds: 3,
                max_shots: 8,
                max_shot_duration_s: 15.0,
                strictness: Strictness::Strict,
                timeout_multiplier: 1.5,
            },
        }
    }

    /// Word budget for narration lines, `None` meaning keep full text.
    pub fn narration_word_budget(&self) -> Option<usize> {
        match self {
            QualityMode::Fast => Some(8),
            QualityMode::Balanced => Some(14),
            QualityMode::High => None,
        }
    }
}

impl fmt::Display for QualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QualityMode {
    type Err = QualityModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(QualityMode::Fast),
            "balanced" => Ok(QualityMode::Balanced),
            "high" => Ok(QualityMode::High),
            _ => Err(QualityModeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown quality mode: {0}")]
pub struct QualityModeParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("fast".parse::<QualityMode>().unwrap(), QualityMode::Fast);
        assert_eq!("Balanced".parse::<QualityMode>().unwrap(), QualityMode::Balanced);
        assert_eq!("high".parse::<QualityMode>().unwrap(), QualityMode::High);
        assert!("ultra".parse::<QualityMode>().is_err());
    }

    #[test]
    fn test_profile_ordering() {
        let fast = QualityMode::Fast.profile();
        let balanced = QualityMode::Balanced.profile();
        let high = QualityMode::High.profile();

        assert!(fast.preview_seeds < balanced.preview_seeds);
        assert!(balanced.preview_seeds < high.preview_seeds);
        assert!(fast.max_shots < balanced.max_shots);
        assert!(fast.max_shot_duration_s < high.max_shot_duration_s);
    }

    #[test]
    fn test_tolerance_narrows_with_strictness() {
        assert!(
            Strictness::Loose.duration_tolerance() > Strictness::Standard.duration_tolerance()
        );
        assert!(
            Strictness::Standard.duration_tolerance() > Strictness::Strict.duration_tolerance()
        );
    }

    #[test]
    fn test_narration_budget() {
        assert_eq!(QualityMode::Fast.narration_word_budget(), Some(8));
        assert_eq!(QualityMode::High.narration_word_budget(), None);
    }
}
