//! Asset store facade.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::debug;

use vforge_models::{Job, JobId};

use crate::config::StorageConfig;
use crate::error::StorageResult;
use crate::paths::AssetLayout;

/// Where one shot's demuxed files should land, and their public URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotDestinations {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub video_url: String,
    pub audio_url: String,
}

/// Local static-file asset store.
#[derive(Debug, Clone)]
pub struct AssetStore {
    layout: AssetLayout,
    config: StorageConfig,
}

impl AssetStore {
    pub fn new(config: StorageConfig) -> Self {
        let layout = AssetLayout::new(config.root.clone(), config.url_prefix.clone());
        Self { layout, config }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(StorageConfig::from_env()?))
    }

    pub fn layout(&self) -> &AssetLayout {
        &self.layout
    }

    pub fn retention_days(&self) -> i64 {
        self.config.retention_days
    }

    /// Compute the paths and URLs for one shot's output files.
    ///
    /// `partition_at` fixes the date partition; callers pass the job's
    /// creation time so every file of a job shares one partition.
    pub fn shot_destinations(
        &self,
        job_id: &JobId,
        shot_id: u32,
        partition_at: DateTime<Utc>,
        suffix: Option<&str>,
    ) -> ShotDestinations {
        let date = partition_at.date_naive();
        ShotDestinations {
            video_path: self.layout.video_path(job_id, shot_id, date, suffix),
            audio_path: self.layout.audio_path(job_id, shot_id, date, suffix),
            video_url: self.layout.video_url(job_id, shot_id, date, suffix),
            audio_url: self.layout.audio_url(job_id, shot_id, date, suffix),
        }
    }

    /// Serialize the full job record next to its assets.
    ///
    /// The snapshot is a debugging artifact and a recovery source; the
    /// record store stays authoritative.
    pub async fn write_job_metadata(&self, job: &Job) -> StorageResult<PathBuf> {
        let path = self.layout.metadata_path(&job.job_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(job)?;
        tokio::fs::write(&path, body).await?;

        debug!(job_id = %job.job_id, path = %path.display(), "job metadata written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use vforge_models::{Intent, QualityMode};

    fn store_in(dir: &TempDir) -> AssetStore {
        AssetStore::new(StorageConfig {
            root: dir.path().to_path_buf(),
            url_prefix: "/static".to_string(),
            retention_days: 30,
        })
    }

    #[test]
    fn test_destinations_share_one_partition() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let job_id = JobId::from_string("j1");
        let created = Utc.with_ymd_and_hms(2026, 3, 7, 23, 59, 58).unwrap();

        let dest = store.shot_destinations(&job_id, 1, created, None);

        assert!(dest.video_path.ends_with("videos/2026/03/07/j1_shot_1.mp4"));
        assert!(dest.audio_path.ends_with("audio/2026/03/07/j1_shot_1.mp3"));
        assert_eq!(dest.video_url, "/static/videos/2026/03/07/j1_shot_1.mp4");
    }

    #[tokio::test]
    async fn test_metadata_snapshot_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut job = vforge_models::Job::new("client-1", QualityMode::Balanced, "1280*720");
        job.intent = Some(Intent::new("insomnia", 10.0));

        let path = store.write_job_metadata(&job).await.unwrap();
        assert!(path.exists());

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["state"], "created");
        assert_eq!(value["intent"]["topic"], "insomnia");
    }
}
