//! Pipeline metrics recorded through the `metrics` facade.
//!
//! Without an installed recorder these are no-ops; the API binary
//! installs the Prometheus exporter and serves the scrape endpoint.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "vforge_jobs_total";
    pub const SHOT_ATTEMPTS_TOTAL: &str = "vforge_shot_attempts_total";
    pub const SHOT_FAILURES_TOTAL: &str = "vforge_shot_failures_total";
    pub const TEMPLATE_MATCHES_TOTAL: &str = "vforge_template_matches_total";
    pub const TEMPLATE_MATCH_MISSES_TOTAL: &str = "vforge_template_match_misses_total";
    pub const SHOT_GENERATION_DURATION_SECONDS: &str = "vforge_shot_generation_duration_seconds";
}

/// Record a job settling, labelled by operation and outcome.
pub fn record_job_outcome(operation: &str, outcome: &str) {
    let labels = [
        ("operation", operation.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
}

/// Record one shot generation attempt.
pub fn record_shot_attempt() {
    counter!(names::SHOT_ATTEMPTS_TOTAL).increment(1);
}

/// Record a failed shot attempt, labelled by error class.
pub fn record_shot_failure(class: &str) {
    let labels = [("class", class.to_string())];
    counter!(names::SHOT_FAILURES_TOTAL, &labels).increment(1);
}

/// Record a template match, labelled by strategy.
pub fn record_template_match(strategy: &str) {
    let labels = [("strategy", strategy.to_string())];
    counter!(names::TEMPLATE_MATCHES_TOTAL, &labels).increment(1);
}

/// Record a request no template could be matched to.
pub fn record_template_match_miss() {
    counter!(names::TEMPLATE_MATCH_MISSES_TOTAL).increment(1);
}

/// Record wall-clock seconds one shot spent in submit/poll/ingest.
pub fn record_shot_generation_seconds(duration_secs: f64) {
    histogram!(names::SHOT_GENERATION_DURATION_SECONDS).record(duration_secs);
}
