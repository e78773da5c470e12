//! Render op executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vforge_models::Job;
use vforge_pipeline::Orchestrator;
use vforge_queue::{AdmissionGate, RenderMessage, RenderOp, RenderQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Executor that consumes render operations from the queue and drives
/// the pipeline.
pub struct RenderExecutor {
    config: WorkerConfig,
    queue: Arc<RenderQueue>,
    orchestrator: Arc<Orchestrator>,
    gate: Arc<AdmissionGate>,
    op_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl RenderExecutor {
    /// Create a new executor.
    pub fn new(
        config: WorkerConfig,
        queue: RenderQueue,
        orchestrator: Orchestrator,
        gate: AdmissionGate,
    ) -> Self {
        let op_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            orchestrator: Arc::new(orchestrator),
            gate: Arc::new(gate),
            op_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting render executor '{}' with {} max concurrent ops",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        // Initialize queue
        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Spawn a task to claim pending messages periodically
        let queue_clone = Arc::clone(&self.queue);
        let orchestrator_clone = Arc::clone(&self.orchestrator);
        let gate_clone = Arc::clone(&self.gate);
        let semaphore_clone = Arc::clone(&self.op_semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let claim_min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        // Claim messages another worker consumed but never acked
                        match queue_clone.claim_pending(&consumer_name, claim_min_idle_ms, 5).await {
                            Ok(messages) if !messages.is_empty() => {
                                info!("Claimed {} pending render ops", messages.len());
                                for (message_id, message) in messages {
                                    let orchestrator = Arc::clone(&orchestrator_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let gate = Arc::clone(&gate_clone);
                                    let Ok(permit) =
                                        semaphore_clone.clone().acquire_owned().await
                                    else {
                                        break;
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_op(orchestrator, queue, gate, message_id, message)
                                            .await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending render ops: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_ops() => {
                    if let Err(e) = result {
                        error!("Error consuming render ops: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        // Wait for in-flight ops to complete
        info!("Waiting for in-flight render ops to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_ops()).await;

        info!("Render executor stopped");
        Ok(())
    }

    /// Consume and process render ops from the queue.
    async fn consume_ops(&self) -> WorkerResult<()> {
        let available = self.op_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let messages = self
            .queue
            .consume(
                &self.consumer_name,
                1000, // Block for 1 second
                available.min(5),
            )
            .await?;

        if messages.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} render ops from queue", messages.len());

        for (message_id, message) in messages {
            let orchestrator = Arc::clone(&self.orchestrator);
            let queue = Arc::clone(&self.queue);
            let gate = Arc::clone(&self.gate);
            let permit = self
                .op_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_op(orchestrator, queue, gate, message_id, message).await;
            });
        }

        Ok(())
    }

    /// Execute a single render op with retry and DLQ handling.
    async fn execute_op(
        orchestrator: Arc<Orchestrator>,
        queue: Arc<RenderQueue>,
        gate: Arc<AdmissionGate>,
        message_id: String,
        message: RenderMessage,
    ) {
        let job_id = message.job_id.clone();
        info!(job_id = %job_id, op = %message.op, "Executing render op");

        let result = Self::dispatch(&orchestrator, &message).await;

        match result {
            Ok(job) => {
                info!(job_id = %job_id, state = %job.state, "Render op settled");
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack op for job {}: {}", job_id, e);
                }
                // Clear dedup key so the same op can be dispatched again later
                if let Err(e) = queue.clear_dedup(&message).await {
                    warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                }
                metrics::record_op_outcome(message.op.as_str(), "settled");

                Self::settle_admission(&orchestrator, &gate, &message, Some(job.client_id)).await;
            }
            Err(e) => {
                error!(job_id = %job_id, op = %message.op, "Render op failed: {}", e);

                // Check retry count
                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!(
                        "Op for job {} exceeded max retries ({}), moving to DLQ",
                        job_id, max_retries
                    );
                    if let Err(dlq_err) = queue.dlq(&message_id, &message, &e.to_string()).await {
                        error!("Failed to move op for job {} to DLQ: {}", job_id, dlq_err);
                    }
                    // Clear dedup key so the op can be dispatched manually later
                    if let Err(e) = queue.clear_dedup(&message).await {
                        warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                    }
                    metrics::record_op_outcome(message.op.as_str(), "dead_lettered");

                    // Dead-lettering settles the op as far as admission is concerned
                    Self::settle_admission(&orchestrator, &gate, &message, None).await;
                } else {
                    info!(
                        "Op for job {} will be retried (attempt {}/{})",
                        job_id, retry_count, max_retries
                    );
                    metrics::record_op_outcome(message.op.as_str(), "retried");
                    // Message stays pending and is reclaimed after the idle window
                }
            }
        }
    }

    /// Drive the pipeline entry point this message names.
    async fn dispatch(
        orchestrator: &Orchestrator,
        message: &RenderMessage,
    ) -> WorkerResult<Job> {
        let job = match message.op {
            RenderOp::Generate => orchestrator.run_generate(&message.job_id).await?,
            RenderOp::ReviseGenerate => orchestrator.run_revise_generate(&message.job_id).await?,
            RenderOp::Finalize => orchestrator.run_finalize(&message.job_id).await?,
            RenderOp::RegenerateShot => {
                let shot_id = message.shot_id.ok_or_else(|| {
                    WorkerError::job_failed("regenerate_shot message missing shot_id")
                })?;
                orchestrator.run_regenerate(&message.job_id, shot_id).await?
            }
        };
        Ok(job)
    }

    /// Give back the admission slot taken when this op was accepted.
    ///
    /// Only Generate ops hold a slot; the refinement ops are admitted
    /// without taking one.
    async fn settle_admission(
        orchestrator: &Orchestrator,
        gate: &AdmissionGate,
        message: &RenderMessage,
        client_id: Option<String>,
    ) {
        if message.op != RenderOp::Generate {
            return;
        }

        let client_id = match client_id {
            Some(id) => Some(id),
            None => orchestrator
                .store()
                .get_job(&message.job_id)
                .await
                .ok()
                .flatten()
                .map(|job| job.client_id),
        };

        match client_id {
            Some(id) => {
                if let Err(e) = gate.release(&id).await {
                    warn!(
                        job_id = %message.job_id,
                        client_id = %id,
                        "Failed to release admission slot: {}",
                        e
                    );
                }
            }
            None => warn!(
                job_id = %message.job_id,
                "Job record missing, cannot release admission slot"
            ),
        }
    }

    /// Wait for all in-flight ops to complete.
    async fn wait_for_ops(&self) {
        loop {
            let available = self.op_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
