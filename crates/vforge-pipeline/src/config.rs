//! Pipeline configuration.

use std::path::PathBuf;

use vforge_gen_client::config::DEFAULT_MODEL;
use vforge_models::SuccessPolicy;

/// Default confidence floor below which a template match is rejected.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Default number of shots generated concurrently within one job.
pub const DEFAULT_SHOT_CONCURRENCY: usize = 3;

/// Configuration for the orchestrator and template matcher.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model identifier compiled into every shot request.
    pub model: String,
    /// Confidence floor for template matching.
    pub min_confidence: f64,
    /// Bounded concurrency for per-shot generation within a job.
    pub shot_concurrency: usize,
    /// When a finished run counts as SUCCEEDED.
    pub success_policy: SuccessPolicy,
    /// Directory holding template JSON files.
    pub template_dir: PathBuf,
    /// Whether the matcher should try the embedding service at all.
    pub embeddings_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            shot_concurrency: DEFAULT_SHOT_CONCURRENCY,
            success_policy: SuccessPolicy::default(),
            template_dir: PathBuf::from("./templates"),
            embeddings_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let success_policy = std::env::var("SUCCESS_MIN_COVERAGE")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .map(SuccessPolicy::MinCoverage)
            .unwrap_or_default();

        Self {
            model: std::env::var("GEN_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            min_confidence: std::env::var("TEMPLATE_MATCH_MIN_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            shot_concurrency: std::env::var("SHOT_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SHOT_CONCURRENCY),
            success_policy,
            template_dir: std::env::var("TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./templates")),
            embeddings_enabled: std::env::var("EMBEDDINGS_ENABLED")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }
}
