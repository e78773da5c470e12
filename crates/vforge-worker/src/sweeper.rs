//! Background sweeps: stale RUNNING jobs and retention cleanup.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use vforge_db::JobStore;
use vforge_models::{JobError, JobErrorKind};
use vforge_storage::{sweep_expired, AssetStore};

use crate::error::WorkerResult;
use crate::metrics;

/// Fails jobs stuck in RUNNING past their wall-clock budget.
///
/// A crashed worker leaves its job RUNNING; the queue's pending-claim
/// recovers the message, but once that message is dead-lettered or lost
/// only this sweep settles the job.
pub struct StaleJobSweeper {
    store: JobStore,
    interval: Duration,
    timeout: Duration,
}

impl StaleJobSweeper {
    pub fn new(store: JobStore, interval: Duration, timeout: Duration) -> Self {
        Self {
            store,
            interval,
            timeout,
        }
    }

    /// Run forever; callers spawn this onto its own task.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once().await {
                warn!("Stale job sweep failed: {}", e);
            }
        }
    }

    /// One pass; returns how many jobs were failed.
    pub async fn sweep_once(&self) -> WorkerResult<usize> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.timeout.as_secs() as i64);
        let stale = self.store.find_stale_running(cutoff).await?;

        let mut swept = 0;
        for job in &stale {
            let error = JobError::new(
                JobErrorKind::Timeout,
                format!(
                    "job exceeded the {} minute run budget",
                    self.timeout.as_secs() / 60
                ),
            );
            match self.store.fail_job(&job.job_id, &error, "job_timeout").await {
                Ok(_) => {
                    warn!(job_id = %job.job_id, "Stale running job marked failed");
                    swept += 1;
                }
                Err(e) => warn!(job_id = %job.job_id, "Failed to sweep stale job: {}", e),
            }
        }

        if swept > 0 {
            metrics::record_stale_jobs_swept(swept as u64);
        }
        Ok(swept)
    }
}

/// Deletes job records, assets and metadata older than the retention
/// window.
pub struct RetentionSweeper {
    store: JobStore,
    assets: AssetStore,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: JobStore, assets: AssetStore, interval: Duration) -> Self {
        Self {
            store,
            assets,
            interval,
        }
    }

    /// Run forever; callers spawn this onto its own task.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once().await {
                warn!("Retention sweep failed: {}", e);
            }
        }
    }

    /// One pass; returns how many job records were deleted.
    pub async fn sweep_once(&self) -> WorkerResult<u64> {
        let retention_days = self.assets.retention_days();
        let now = Utc::now();

        let report = sweep_expired(self.assets.layout(), retention_days, now).await?;
        let deleted = self
            .store
            .delete_expired(now - ChronoDuration::days(retention_days))
            .await?;

        if deleted > 0 || report.partitions_removed > 0 || report.metadata_removed > 0 {
            info!(
                jobs = deleted,
                partitions = report.partitions_removed,
                metadata = report.metadata_removed,
                "Retention sweep complete"
            );
        }
        Ok(deleted)
    }
}
