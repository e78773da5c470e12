//! Application state.

use std::sync::Arc;

use vforge_pipeline::Orchestrator;
use vforge_queue::{AdmissionGate, RenderQueue};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Arc<RenderQueue>,
    pub gate: Arc<AdmissionGate>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let orchestrator = Orchestrator::from_env().await?;

        let queue = RenderQueue::from_env()?;
        queue.init().await?;

        let gate = AdmissionGate::from_env()?;

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            queue: Arc::new(queue),
            gate: Arc::new(gate),
        })
    }
}
