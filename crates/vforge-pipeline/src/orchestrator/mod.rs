//! Job orchestration.
//!
//! The orchestrator owns every workflow that moves a job through the state
//! machine: planning, generation, finalization, revision, and single-shot
//! regeneration. API handlers call the `prepare_*` methods inline; the
//! `run_*` methods execute on the worker after a queue hop.
//!
//! State changes go through [`JobStore`], which validates transitions
//! inside a transaction. The orchestrator decides *which* transition and
//! *what* label; the store decides whether the edge is legal.

mod generate;
mod plan;
mod refine;


pub use plan::{JobRequest, PlannedJob};

use std::sync::Arc;

use tracing::warn;

use vforge_db::{DbConfig, JobStore};
use vforge_gen_client::GenClient;
use vforge_ml_client::MlClient;
use vforge_models::{Job, JobId, Template};
use vforge_storage::AssetStore;

use crate::catalog::TemplateCatalog;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::matcher::TemplateMatcher;
use crate::services::{IntentService, MediaService, ShotGenerator, ShotMediaService};

/// Coordinates planning and rendering workflows over injected services.
pub struct Orchestrator {
    store: JobStore,
    assets: AssetStore,
    catalog: TemplateCatalog,
    matcher: TemplateMatcher,
    intents: Arc<dyn IntentService>,
    generator: Arc<dyn ShotGenerator>,
    media: Arc<dyn MediaService>,
    config: PipelineConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: JobStore,
        assets: AssetStore,
        catalog: TemplateCatalog,
        matcher: TemplateMatcher,
        intents: Arc<dyn IntentService>,
        generator: Arc<dyn ShotGenerator>,
        media: Arc<dyn MediaService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            assets,
            catalog,
            matcher,
            intents,
            generator,
            media,
            config,
        }
    }

    /// Wire up the full production stack from environment variables.
    pub async fn from_env() -> PipelineResult<Self> {
        let config = PipelineConfig::from_env();

        let db_config = DbConfig::from_env()?;
        let store = JobStore::connect(&db_config).await?;
        let assets =
            AssetStore::from_env().map_err(|e| PipelineError::Config(e.to_string()))?;
        let catalog = TemplateCatalog::load(&config.template_dir).await?;

        let ml = Arc::new(MlClient::from_env()?);
        let matcher = if config.embeddings_enabled {
            TemplateMatcher::with_embedder(ml.clone(), config.min_confidence)
        } else {
            TemplateMatcher::new(config.min_confidence)
        };
        let generator = Arc::new(
            GenClient::from_env().map_err(|e| PipelineError::Config(e.to_string()))?,
        );
        let media = Arc::new(
            ShotMediaService::new().map_err(|e| PipelineError::Config(e.to_string()))?,
        );

        Ok(Self::new(
            store, assets, catalog, matcher, ml, generator, media, config,
        ))
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    async fn require_job(&self, job_id: &JobId) -> PipelineResult<Job> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.clone()))
    }

    fn template_for(&self, job: &Job) -> PipelineResult<&Template> {
        let template_id = job
            .template_id
            .as_ref()
            .ok_or_else(|| PipelineError::NoPlan(job.job_id.clone()))?;
        self.catalog.get(template_id).ok_or_else(|| {
            PipelineError::Catalog(format!(
                "template {template_id} referenced by job {} is not in the catalog",
                job.job_id
            ))
        })
    }

    /// Write the job snapshot next to its assets. Snapshot failures are
    /// logged and swallowed; the record store stays authoritative.
    async fn snapshot_metadata(&self, job: &Job) {
        if let Err(e) = self.assets.write_job_metadata(job).await {
            warn!(job_id = %job.job_id, error = %e, "failed to write job metadata snapshot");
        }
    }

    /// Sink `error` into the job record, snapshot, and count the outcome.
    async fn sink_failure(
        &self,
        job_id: &JobId,
        error: &PipelineError,
        label: &str,
        operation: &str,
    ) -> PipelineResult<()> {
        let failed = self.store.fail_job(job_id, &error.job_error(), label).await?;
        self.snapshot_metadata(&failed).await;
        crate::metrics::record_job_outcome(operation, "failed");
        Ok(())
    }
}
