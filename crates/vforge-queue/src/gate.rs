//! Per-client admission control backed by Redis.
//!
//! Two checks run before a job is accepted: a sliding-window rate limit
//! and a cap on simultaneously running jobs. Both live in Redis so every
//! API replica sees the same counters. When Redis is unreachable the
//! caller gets an error, never an admission.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;
use vforge_models::policy::{
    MAX_CONCURRENT_JOBS_PER_CLIENT, RATE_LIMIT_PER_MIN, RATE_LIMIT_WINDOW_S,
};

use crate::error::QueueResult;

/// Admission gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Redis URL
    pub redis_url: String,
    /// Requests allowed per client inside the window
    pub max_per_window: u32,
    /// Length of the sliding window
    pub window: Duration,
    /// Simultaneously running jobs allowed per client
    pub max_concurrent: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            max_per_window: RATE_LIMIT_PER_MIN,
            window: Duration::from_secs(RATE_LIMIT_WINDOW_S),
            max_concurrent: MAX_CONCURRENT_JOBS_PER_CLIENT,
        }
    }
}

impl GateConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            max_per_window: std::env::var("RATE_LIMIT_PER_MIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(RATE_LIMIT_PER_MIN),
            window: Duration::from_secs(
                std::env::var("RATE_LIMIT_WINDOW_S")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(RATE_LIMIT_WINDOW_S),
            ),
            max_concurrent: std::env::var("MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_CONCURRENT_JOBS_PER_CLIENT),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Request may proceed; a concurrency slot has been taken.
    Admitted,
    /// Too many requests inside the sliding window.
    RateLimited {
        /// Seconds until the window re-opens.
        retry_after_s: u64,
    },
    /// The client already has too many jobs in flight.
    TooManyActive { active: u32, limit: u32 },
}

/// Admission gate client.
pub struct AdmissionGate {
    client: redis::Client,
    config: GateConfig,
}

impl AdmissionGate {
    /// Create a new admission gate.
    pub fn new(config: GateConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(GateConfig::from_env())
    }

    /// Run both admission checks for a client.
    ///
    /// On `Admitted` the request has been recorded in the window and a
    /// concurrency slot has been taken; the caller must pair it with
    /// [`release`](Self::release) once the job settles. Denials take
    /// neither.
    pub async fn admit(&self, client_id: &str) -> QueueResult<Admission> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let now = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let window_s = self.config.window.as_secs_f64();
        let rate_key = format!("vforge:rate:{}", client_id);

        // Drop entries that have aged out of the window.
        conn.zrembyscore::<_, _, _, ()>(&rate_key, 0.0, now - window_s)
            .await?;

        let in_window: u32 = conn.zcard(&rate_key).await?;
        if in_window >= self.config.max_per_window {
            // The window re-opens when its oldest entry ages out.
            let oldest: Vec<(String, f64)> = conn.zrange_withscores(&rate_key, 0, 0).await?;
            let reset_at = oldest
                .first()
                .map(|(_, score)| score + window_s)
                .unwrap_or(now + window_s);
            let retry_after_s = (reset_at - now).ceil().max(1.0) as u64;

            warn!(
                "Rate limit hit for client {}: {} requests in window",
                client_id, in_window
            );
            return Ok(Admission::RateLimited { retry_after_s });
        }

        let active_key = format!("vforge:active:{}", client_id);
        let active: Option<u32> = conn.get(&active_key).await?;
        let active = active.unwrap_or(0);
        if active >= self.config.max_concurrent {
            warn!(
                "Concurrency limit hit for client {}: {} jobs in flight",
                client_id, active
            );
            return Ok(Admission::TooManyActive {
                active,
                limit: self.config.max_concurrent,
            });
        }

        // Record the request and take a slot.
        conn.zadd::<_, _, _, ()>(&rate_key, Uuid::new_v4().to_string(), now)
            .await?;
        conn.expire::<_, ()>(&rate_key, self.config.window.as_secs() as i64)
            .await?;
        let active_now: u32 = conn.incr(&active_key, 1).await?;

        debug!(
            "Admitted client {} ({} in window, {} active)",
            client_id,
            in_window + 1,
            active_now
        );
        Ok(Admission::Admitted)
    }

    /// Give back a concurrency slot once a job settles.
    pub async fn release(&self, client_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let active_key = format!("vforge:active:{}", client_id);
        let remaining: i64 = conn.decr(&active_key, 1).await?;
        if remaining <= 0 {
            // Do not let release imbalances push the counter negative.
            conn.del::<_, ()>(&active_key).await?;
        }

        debug!(
            "Released slot for client {} ({} remaining)",
            client_id,
            remaining.max(0)
        );
        Ok(())
    }

    /// Number of jobs currently holding a slot for a client.
    pub async fn active_jobs(&self, client_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let active: Option<u32> = conn.get(format!("vforge:active:{}", client_id)).await?;
        Ok(active.unwrap_or(0))
    }
}
