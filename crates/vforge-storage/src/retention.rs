//! Retention sweep for aged-out assets and metadata.
//!
//! Video and audio partitions are named by date, so expiry is decided from
//! the directory name alone. Metadata files are flat and fall back to their
//! modification time.

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info};

use crate::error::StorageResult;
use crate::paths::AssetLayout;

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetentionReport {
    /// Day partitions deleted across videos/ and audio/.
    pub partitions_removed: usize,
    /// Metadata snapshots deleted.
    pub metadata_removed: usize,
}

/// Delete assets older than `retention_days`, evaluated against `now`.
///
/// Partitions dated exactly at the cutoff are kept.
pub async fn sweep_expired(
    layout: &AssetLayout,
    retention_days: i64,
    now: DateTime<Utc>,
) -> StorageResult<RetentionReport> {
    let cutoff = now - Duration::days(retention_days);
    let cutoff_date = cutoff.date_naive();

    let mut report = RetentionReport::default();
    for media_dir in ["videos", "audio"] {
        report.partitions_removed +=
            sweep_partitions(&layout.root().join(media_dir), cutoff_date).await?;
    }
    report.metadata_removed = sweep_metadata(&layout.root().join("metadata"), cutoff).await?;

    if report.partitions_removed > 0 || report.metadata_removed > 0 {
        info!(
            partitions = report.partitions_removed,
            metadata = report.metadata_removed,
            cutoff = %cutoff_date,
            "retention sweep removed expired assets"
        );
    }
    Ok(report)
}

async fn sweep_partitions(root: &Path, cutoff: NaiveDate) -> StorageResult<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    let mut years = tokio::fs::read_dir(root).await?;
    while let Some(year_entry) = years.next_entry().await? {
        let Some(year) = parse_component::<i32>(&year_entry) else {
            continue;
        };

        let mut months = tokio::fs::read_dir(year_entry.path()).await?;
        while let Some(month_entry) = months.next_entry().await? {
            let Some(month) = parse_component::<u32>(&month_entry) else {
                continue;
            };

            let mut days = tokio::fs::read_dir(month_entry.path()).await?;
            while let Some(day_entry) = days.next_entry().await? {
                let Some(day) = parse_component::<u32>(&day_entry) else {
                    continue;
                };
                let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                    continue;
                };

                if date < cutoff {
                    debug!(partition = %day_entry.path().display(), "removing expired partition");
                    tokio::fs::remove_dir_all(day_entry.path()).await?;
                    removed += 1;
                }
            }
        }
    }
    Ok(removed)
}

async fn sweep_metadata(dir: &Path, cutoff: DateTime<Utc>) -> StorageResult<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if DateTime::<Utc>::from(modified) < cutoff {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn parse_component<T: std::str::FromStr>(entry: &tokio::fs::DirEntry) -> Option<T> {
    entry.file_name().to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn touch(path: &Path) {
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, b"x").await.unwrap();
    }

    #[tokio::test]
    async fn test_old_partitions_removed_recent_kept() {
        let dir = TempDir::new().unwrap();
        let layout = AssetLayout::new(dir.path(), "/static");

        touch(&dir.path().join("videos/2026/01/05/j1_shot_1.mp4")).await;
        touch(&dir.path().join("videos/2026/08/20/j2_shot_1.mp4")).await;
        touch(&dir.path().join("audio/2026/01/05/j1_shot_1.mp3")).await;

        let now = Utc.with_ymd_and_hms(2026, 8, 22, 12, 0, 0).unwrap();
        let report = sweep_expired(&layout, 30, now).await.unwrap();

        assert_eq!(report.partitions_removed, 2);
        assert!(!dir.path().join("videos/2026/01/05").exists());
        assert!(dir.path().join("videos/2026/08/20/j2_shot_1.mp4").exists());
    }

    #[tokio::test]
    async fn test_metadata_expires_by_mtime() {
        let dir = TempDir::new().unwrap();
        let layout = AssetLayout::new(dir.path(), "/static");

        touch(&dir.path().join("metadata/j1.json")).await;

        // Freshly written, so only a far-future "now" ages it out.
        let report = sweep_expired(&layout, 30, Utc::now()).await.unwrap();
        assert_eq!(report.metadata_removed, 0);

        let later = Utc::now() + Duration::days(40);
        let report = sweep_expired(&layout, 30, later).await.unwrap();
        assert_eq!(report.metadata_removed, 1);
        assert!(!dir.path().join("metadata/j1.json").exists());
    }

    #[tokio::test]
    async fn test_missing_roots_are_fine() {
        let dir = TempDir::new().unwrap();
        let layout = AssetLayout::new(dir.path().join("empty"), "/static");

        let report = sweep_expired(&layout, 30, Utc::now()).await.unwrap();
        assert_eq!(report, RetentionReport::default());
    }
}
