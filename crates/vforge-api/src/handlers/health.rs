//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub queue: CheckStatus,
    pub database: CheckStatus,
    pub static_root: CheckStatus,
}

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(error.into()),
            latency_ms: None,
        }
    }
}

/// Liveness plus dependency probes for the queue, database and asset root.
pub async fn healthz(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let queue = check_queue(&state).await;
    let database = check_database(&state).await;
    let static_root = check_static_root(&state).await;

    let healthy = [&queue, &database, &static_root]
        .iter()
        .all(|check| check.status == "ok");

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            queue,
            database,
            static_root,
        },
    };

    if healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn check_queue(state: &AppState) -> CheckStatus {
    let start = Instant::now();
    match state.queue.len().await {
        Ok(_) => CheckStatus::ok(start.elapsed().as_millis() as u64),
        Err(e) => CheckStatus::error(e.to_string()),
    }
}

async fn check_database(state: &AppState) -> CheckStatus {
    let start = Instant::now();
    match state.orchestrator.store().ping().await {
        Ok(()) => CheckStatus::ok(start.elapsed().as_millis() as u64),
        Err(e) => CheckStatus::error(e.to_string()),
    }
}

async fn check_static_root(state: &AppState) -> CheckStatus {
    let start = Instant::now();
    let root = state.orchestrator.assets().layout().root().clone();
    match tokio::fs::metadata(&root).await {
        Ok(meta) if meta.is_dir() => CheckStatus::ok(start.elapsed().as_millis() as u64),
        Ok(_) => CheckStatus::error(format!("{} is not a directory", root.display())),
        Err(e) => CheckStatus::error(format!("{}: {}", root.display(), e)),
    }
}
