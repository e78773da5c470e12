//! Render worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vforge_pipeline::Orchestrator;
use vforge_queue::{AdmissionGate, RenderQueue};
use vforge_worker::{RenderExecutor, RetentionSweeper, StaleJobSweeper, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_JSON")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vforge=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vforge-worker");

    // Load configuration
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    // Create pipeline orchestrator
    let orchestrator = match Orchestrator::from_env().await {
        Ok(o) => o,
        Err(e) => {
            error!("Failed to create orchestrator: {}", e);
            std::process::exit(1);
        }
    };

    // Create queue client
    let queue = match RenderQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create render queue: {}", e);
            std::process::exit(1);
        }
    };

    // Create admission gate client
    let gate = match AdmissionGate::from_env() {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create admission gate: {}", e);
            std::process::exit(1);
        }
    };

    // Start background sweeps
    let stale_sweeper = StaleJobSweeper::new(
        orchestrator.store().clone(),
        config.stale_check_interval,
        config.job_timeout,
    );
    tokio::spawn(stale_sweeper.run());

    let retention_sweeper = RetentionSweeper::new(
        orchestrator.store().clone(),
        orchestrator.assets().clone(),
        config.retention_interval,
    );
    tokio::spawn(retention_sweeper.run());

    // Create executor
    let executor = Arc::new(RenderExecutor::new(config, queue, orchestrator, gate));

    // Trigger executor shutdown on SIGINT/SIGTERM
    let shutdown_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_executor.shutdown();
    });

    // Run executor
    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
