//! Global generation policy: duration bounds, resolutions, admission limits,
//! seed range and the job success policy.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Minimum duration of a single shot in seconds.
pub const MIN_SHOT_DURATION_S: f64 = 2.0;

/// Maximum duration of a single shot in seconds.
pub const MAX_SHOT_DURATION_S: f64 = 15.0;

/// Resolution used for preview candidates (generator wire format).
pub const PREVIEW_RESOLUTION: &str = "1280*720";

/// Resolution used for finalized shots (generator wire format).
pub const FINAL_RESOLUTION: &str = "1920*1080";

/// Resolutions the external generator accepts, in wire format.
pub const SUPPORTED_RESOLUTIONS: &[&str] =
    &["1280*720", "720*1280", "1920*1080", "1080*1920"];

/// Sliding-window admission cap per client.
pub const RATE_LIMIT_PER_MIN: u32 = 10;

/// Length of the admission window in seconds.
pub const RATE_LIMIT_WINDOW_S: u64 = 60;

/// Maximum simultaneously running jobs per client.
pub const MAX_CONCURRENT_JOBS_PER_CLIENT: u32 = 5;

/// Jobs stuck in RUNNING longer than this are swept to FAILED.
pub const JOB_TIMEOUT_MINUTES: i64 = 20;

/// Assets and metadata older than this are deleted by retention cleanup.
pub const JOB_RETENTION_DAYS: i64 = 30;

/// Inclusive lower bound for generation seeds.
pub const SEED_MIN: i64 = 1;

/// Exclusive upper bound for generation seeds (2^31 - 1).
pub const SEED_MAX: i64 = 2_147_483_647;

/// Decides whether a finished generation run counts as a success.
///
/// Per-shot failures are always recorded; this policy only controls the
/// final SUCCEEDED/FAILED decision once every shot has settled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case", tag = "policy", content = "value")]
pub enum SuccessPolicy {
    /// Every planned shot must have produced at least one asset.
    #[default]
    RequireAll,

    /// At least this fraction of planned shots must have produced an asset.
    MinCoverage(f64),
}

impl SuccessPolicy {
    /// Returns true when `shots_with_assets` out of `planned_shots`
    /// satisfies the policy.
    pub fn is_met(&self, shots_with_assets: usize, planned_shots: usize) -> bool {
        if planned_shots == 0 {
            return false;
        }
        match self {
            SuccessPolicy::RequireAll => shots_with_assets >= planned_shots,
            SuccessPolicy::MinCoverage(fraction) => {
                (shots_with_assets as f64) / (planned_shots as f64) >= *fraction
            }
        }
    }
}

/// Returns true when `resolution` (wire format) is accepted by the generator.
pub fn is_supported_resolution(resolution: &str) -> bool {
    SUPPORTED_RESOLUTIONS.contains(&resolution)
}
