//! Injectable seams over the external services.
//!
//! The orchestrator talks to traits, not clients, so workflows can be
//! exercised with in-process doubles. The real clients implement them by
//! straight delegation.

use std::time::Duration;

use async_trait::async_trait;

use vforge_gen_client::{GenClient, GenResult, GenerationOutcome};
use vforge_media::{MediaDownloader, MediaResult, ShotSplitter, SplitOutcome};
use vforge_ml_client::{FeedbackDelta, MlClient, MlResult};
use vforge_models::{Intent, QualityMode, ShotPlan, ShotRequest, Template};
use vforge_storage::ShotDestinations;

/// Text-understanding endpoints the orchestrator needs.
#[async_trait]
pub trait IntentService: Send + Sync {
    async fn parse_intent(&self, text: &str, quality_mode: QualityMode) -> MlResult<Intent>;

    async fn instantiate_plan(&self, intent: &Intent, template: &Template)
        -> MlResult<ShotPlan>;

    async fn parse_feedback(&self, feedback: &str, intent: &Intent) -> MlResult<FeedbackDelta>;
}

#[async_trait]
impl IntentService for MlClient {
    async fn parse_intent(&self, text: &str, quality_mode: QualityMode) -> MlResult<Intent> {
        MlClient::parse_intent(self, text, quality_mode).await
    }

    async fn instantiate_plan(
        &self,
        intent: &Intent,
        template: &Template,
    ) -> MlResult<ShotPlan> {
        MlClient::instantiate_plan(self, intent, template).await
    }

    async fn parse_feedback(&self, feedback: &str, intent: &Intent) -> MlResult<FeedbackDelta> {
        MlClient::parse_feedback(self, feedback, intent).await
    }
}

/// Text embedding for semantic template matching.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> MlResult<Vec<Vec<f32>>>;
}

#[async_trait]
impl Embedder for MlClient {
    async fn embed(&self, texts: &[String]) -> MlResult<Vec<Vec<f32>>> {
        MlClient::embed(self, texts).await
    }
}

/// The external text-to-video generator.
#[async_trait]
pub trait ShotGenerator: Send + Sync {
    /// Submit one request and wait for the task to finish within `budget`.
    async fn generate(
        &self,
        request: &ShotRequest,
        budget: Duration,
    ) -> GenResult<GenerationOutcome>;

    /// Polling budget for one shot under the given quality mode.
    fn poll_budget(&self, mode: QualityMode) -> Duration;
}

#[async_trait]
impl ShotGenerator for GenClient {
    async fn generate(
        &self,
        request: &ShotRequest,
        budget: Duration,
    ) -> GenResult<GenerationOutcome> {
        GenClient::generate(self, request, budget).await
    }

    fn poll_budget(&self, mode: QualityMode) -> Duration {
        GenClient::poll_budget(self, mode)
    }
}

/// Ingestion of one generated shot: fetch the raw file, demux it into the
/// destination video/audio paths.
#[async_trait]
pub trait MediaService: Send + Sync {
    async fn ingest_shot(
        &self,
        source_url: &str,
        dest: &ShotDestinations,
        planned_duration_s: f64,
    ) -> MediaResult<SplitOutcome>;
}

/// Default media service: HTTP download plus ffmpeg demux.
pub struct ShotMediaService {
    downloader: MediaDownloader,
    splitter: ShotSplitter,
}

impl ShotMediaService {
    pub fn new() -> MediaResult<Self> {
        Ok(Self {
            downloader: MediaDownloader::new()?,
            splitter: ShotSplitter::new(),
        })
    }
}

#[async_trait]
impl MediaService for ShotMediaService {
    async fn ingest_shot(
        &self,
        source_url: &str,
        dest: &ShotDestinations,
        planned_duration_s: f64,
    ) -> MediaResult<SplitOutcome> {
        // The raw download sits next to the final video file and is
        // consumed by the demux either way.
        let raw_path = dest.video_path.with_extension("raw.mp4");
        self.downloader.download_to(source_url, &raw_path).await?;
        self.splitter
            .split_or_fallback(&raw_path, &dest.video_path, &dest.audio_path, planned_duration_s)
            .await
    }
}
