//! Generated shot assets.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The stored output of one successful generation call.
///
/// Assets accumulate on the job as shots complete, in any order; readers
/// key by `shot_id` (and `seed`, for preview candidates), never by
/// position in the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotAsset {
    pub shot_id: u32,

    /// Seed the candidate was generated with.
    pub seed: i64,

    /// Task handle at the external generator.
    pub model_task_id: String,

    /// Source URL the generator served the raw media from.
    pub raw_video_url: String,

    /// Public URL of the processed video stream.
    pub video_url: String,

    /// Public URL of the extracted audio stream; absent after the
    /// single-stream demux fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    /// Local path of the stored video file.
    pub video_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,

    /// Measured duration in seconds.
    pub duration_s: f64,

    /// Resolution in wire format.
    pub resolution: String,
}

impl ShotAsset {
    /// True when demuxing fell back to the combined stream.
    pub fn is_video_only(&self) -> bool {
        self.audio_url.is_none()
    }
}
