//! Date-partitioned asset layout and public URL derivation.
//!
//! Assets land under the static root as
//! `videos/YYYY/MM/DD/{job_id}_shot_{shot_id}[_{suffix}].mp4` with audio
//! mirrored under `audio/`. The partition date comes from the job, not the
//! wall clock, so a job that runs past midnight keeps all its files (and
//! their URLs) in one partition.

use std::path::PathBuf;

use chrono::NaiveDate;

use vforge_models::JobId;

/// Suffix for finalized shot files.
pub const FINAL_SUFFIX: &str = "final";

/// Suffix for a regenerated shot, unique per regeneration.
pub fn regen_suffix(unix_ts: i64) -> String {
    format!("regen_{unix_ts}")
}

/// Computes paths and URLs for stored assets.
#[derive(Debug, Clone)]
pub struct AssetLayout {
    root: PathBuf,
    url_prefix: String,
}

impl AssetLayout {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        let url_prefix: String = url_prefix.into();
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Filesystem path for a shot's video file.
    pub fn video_path(
        &self,
        job_id: &JobId,
        shot_id: u32,
        date: NaiveDate,
        suffix: Option<&str>,
    ) -> PathBuf {
        self.root
            .join("videos")
            .join(date_partition(date))
            .join(shot_basename(job_id, shot_id, suffix, "mp4"))
    }

    /// Filesystem path for a shot's audio file.
    pub fn audio_path(
        &self,
        job_id: &JobId,
        shot_id: u32,
        date: NaiveDate,
        suffix: Option<&str>,
    ) -> PathBuf {
        self.root
            .join("audio")
            .join(date_partition(date))
            .join(shot_basename(job_id, shot_id, suffix, "mp3"))
    }

    /// Filesystem path for a job's metadata snapshot.
    pub fn metadata_path(&self, job_id: &JobId) -> PathBuf {
        self.root
            .join("metadata")
            .join(format!("{}.json", job_id.as_str()))
    }

    /// Public URL for a shot's video file.
    pub fn video_url(
        &self,
        job_id: &JobId,
        shot_id: u32,
        date: NaiveDate,
        suffix: Option<&str>,
    ) -> String {
        format!(
            "{}/videos/{}/{}",
            self.url_prefix,
            date_partition(date),
            shot_basename(job_id, shot_id, suffix, "mp4")
        )
    }

    /// Public URL for a shot's audio file.
    pub fn audio_url(
        &self,
        job_id: &JobId,
        shot_id: u32,
        date: NaiveDate,
        suffix: Option<&str>,
    ) -> String {
        format!(
            "{}/audio/{}/{}",
            self.url_prefix,
            date_partition(date),
            shot_basename(job_id, shot_id, suffix, "mp3")
        )
    }
}

fn date_partition(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

fn shot_basename(job_id: &JobId, shot_id: u32, suffix: Option<&str>, ext: &str) -> String {
    match suffix {
        Some(suffix) => format!("{}_shot_{}_{}.{}", job_id.as_str(), shot_id, suffix, ext),
        None => format!("{}_shot_{}.{}", job_id.as_str(), shot_id, ext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> AssetLayout {
        AssetLayout::new("/srv/static", "/static/")
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()
    }

    #[test]
    fn test_video_path_partitioned_by_date() {
        let job_id = JobId::from_string("j1");
        let path = layout().video_path(&job_id, 2, date(), None);
        assert_eq!(
            path,
            PathBuf::from("/srv/static/videos/2026/03/07/j1_shot_2.mp4")
        );
    }

    #[test]
    fn test_suffix_lands_before_extension() {
        let job_id = JobId::from_string("j1");
        let path = layout().video_path(&job_id, 2, date(), Some(FINAL_SUFFIX));
        assert!(path.ends_with("j1_shot_2_final.mp4"));

        let audio = layout().audio_path(&job_id, 2, date(), Some(&regen_suffix(1700000000)));
        assert!(audio.ends_with("j1_shot_2_regen_1700000000.mp3"));
    }

    #[test]
    fn test_url_mirrors_path_layout() {
        let job_id = JobId::from_string("j1");
        let url = layout().video_url(&job_id, 3, date(), None);
        assert_eq!(url, "/static/videos/2026/03/07/j1_shot_3.mp4");

        let audio_url = layout().audio_url(&job_id, 3, date(), None);
        assert_eq!(audio_url, "/static/audio/2026/03/07/j1_shot_3.mp3");
    }

    #[test]
    fn test_metadata_path_flat() {
        let job_id = JobId::from_string("j1");
        assert_eq!(
            layout().metadata_path(&job_id),
            PathBuf::from("/srv/static/metadata/j1.json")
        );
    }
}
