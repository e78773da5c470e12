//! Worker metrics recorded through the `metrics` facade.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const RENDER_OPS_TOTAL: &str = "vforge_render_ops_total";
    pub const STALE_JOBS_SWEPT_TOTAL: &str = "vforge_stale_jobs_swept_total";
}

/// Record a consumed render op reaching a queue outcome.
pub fn record_op_outcome(op: &str, outcome: &str) {
    let labels = [("op", op.to_string()), ("outcome", outcome.to_string())];
    counter!(names::RENDER_OPS_TOTAL, &labels).increment(1);
}

/// Record jobs the stale sweep marked failed.
pub fn record_stale_jobs_swept(count: u64) {
    counter!(names::STALE_JOBS_SWEPT_TOTAL).increment(count);
}
