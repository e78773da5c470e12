//! Demuxing generated shots into separate video and audio files.
//!
//! Generated clips arrive as a single muxed MP4. Downstream assembly wants
//! the streams apart: a video-only MP4 and an MP3 narration track. When the
//! demux cannot run (no ffmpeg on the host, corrupt input, missing audio
//! stream) the raw file is still a usable shot, so the fallback keeps it as
//! a video-only asset instead of failing the shot.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;
use crate::probe::duration_or;

const VIDEO_CODEC: &str = "libx264";
const VIDEO_BITRATE: &str = "2M";
const AUDIO_CODEC: &str = "mp3";
const AUDIO_BITRATE: &str = "192k";

/// Shots are short clips; a stuck ffmpeg should not hold a worker slot.
const DEMUX_TIMEOUT_SECS: u64 = 120;

/// Where one demuxed shot ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutcome {
    pub video_path: PathBuf,
    /// `None` when the demux fell back to the raw file.
    pub audio_path: Option<PathBuf>,
    pub duration_s: f64,
}

impl SplitOutcome {
    pub fn is_video_only(&self) -> bool {
        self.audio_path.is_none()
    }
}

/// Splits a muxed shot into video-only and audio-only files.
#[derive(Debug, Clone)]
pub struct ShotSplitter {
    runner: FfmpegRunner,
}

impl Default for ShotSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ShotSplitter {
    pub fn new() -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(DEMUX_TIMEOUT_SECS),
        }
    }

    /// Demux `input` into `dest_video` and `dest_audio`.
    ///
    /// The video stream is re-encoded to H.264 at 2 Mb/s with audio dropped;
    /// the audio stream becomes a 192 kb/s MP3. Duration is measured from
    /// the demuxed video, falling back to `planned_duration_s` when ffprobe
    /// cannot read it.
    ///
    /// Errors when the input file is missing, ffmpeg is not installed, or
    /// either extraction fails. Callers that want the raw-file degradation
    /// use [`split_or_fallback`](Self::split_or_fallback).
    pub async fn split(
        &self,
        input: impl AsRef<Path>,
        dest_video: impl AsRef<Path>,
        dest_audio: impl AsRef<Path>,
        planned_duration_s: f64,
    ) -> MediaResult<SplitOutcome> {
        let input = input.as_ref();
        let dest_video = dest_video.as_ref();
        let dest_audio = dest_audio.as_ref();

        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        check_ffmpeg()?;

        for dest in [dest_video, dest_audio] {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        self.extract_video(input, dest_video).await?;
        self.extract_audio(input, dest_audio).await?;

        let duration_s = duration_or(dest_video, planned_duration_s).await;

        info!(
            video = %dest_video.display(),
            audio = %dest_audio.display(),
            duration_s,
            "shot demuxed"
        );

        Ok(SplitOutcome {
            video_path: dest_video.to_path_buf(),
            audio_path: Some(dest_audio.to_path_buf()),
            duration_s,
        })
    }

    /// Demux `input`, degrading to the raw file when the demux fails.
    ///
    /// On any split failure the untouched input is moved into `dest_video`
    /// and the outcome is video-only with the planned duration. Only the
    /// move itself can still error. The input file is consumed either way:
    /// demuxed inputs are deleted, fallen-back inputs become the output.
    pub async fn split_or_fallback(
        &self,
        input: impl AsRef<Path>,
        dest_video: impl AsRef<Path>,
        dest_audio: impl AsRef<Path>,
        planned_duration_s: f64,
    ) -> MediaResult<SplitOutcome> {
        let input = input.as_ref();
        let dest_video = dest_video.as_ref();
        let dest_audio = dest_audio.as_ref();

        match self
            .split(input, dest_video, dest_audio, planned_duration_s)
            .await
        {
            Ok(outcome) => {
                if let Err(e) = tokio::fs::remove_file(input).await {
                    warn!(input = %input.display(), error = %e, "raw shot file not removed");
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    input = %input.display(),
                    error = %e,
                    "demux failed, keeping raw file as video-only shot"
                );
                // A failed audio pass can leave a partial file behind.
                let _ = tokio::fs::remove_file(dest_audio).await;
                move_file(input, dest_video).await?;
                Ok(SplitOutcome {
                    video_path: dest_video.to_path_buf(),
                    audio_path: None,
                    duration_s: planned_duration_s,
                })
            }
        }
    }

    async fn extract_video(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output)
            .video_codec(VIDEO_CODEC)
            .video_bitrate(VIDEO_BITRATE)
            .no_audio()
            .log_level("error");
        self.runner.run(&cmd).await
    }

    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output)
            .no_video()
            .audio_codec(AUDIO_CODEC)
            .audio_bitrate(AUDIO_BITRATE)
            .log_level("error");
        self.runner.run(&cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_split_rejects_missing_input() {
        let dir = TempDir::new().unwrap();
        let splitter = ShotSplitter::new();

        let result = splitter
            .split(
                dir.path().join("absent.mp4"),
                dir.path().join("v.mp4"),
                dir.path().join("a.mp3"),
                5.0,
            )
            .await;

        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_fallback_moves_raw_file_into_place() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("raw.mp4");
        let dest_video = dir.path().join("out").join("shot.mp4");
        let dest_audio = dir.path().join("out").join("shot.mp3");

        // Not a real MP4, so the demux fails regardless of the host's ffmpeg.
        tokio::fs::write(&input, b"not an mp4").await.unwrap();

        let splitter = ShotSplitter::new();
        let outcome = splitter
            .split_or_fallback(&input, &dest_video, &dest_audio, 7.5)
            .await
            .unwrap();

        assert!(outcome.is_video_only());
        assert_eq!(outcome.video_path, dest_video);
        assert_eq!(outcome.audio_path, None);
        assert!((outcome.duration_s - 7.5).abs() < f64::EPSILON);
        assert!(!input.exists(), "input should be consumed by the move");
        assert_eq!(
            tokio::fs::read(&dest_video).await.unwrap(),
            b"not an mp4",
            "raw bytes land unchanged as the video output"
        );
        assert!(!dest_audio.exists());
    }

    #[tokio::test]
    async fn test_fallback_on_missing_input_errors() {
        let dir = TempDir::new().unwrap();
        let splitter = ShotSplitter::new();

        // Nothing to fall back to: the move has no source.
        let result = splitter
            .split_or_fallback(
                dir.path().join("absent.mp4"),
                dir.path().join("v.mp4"),
                dir.path().join("a.mp3"),
                5.0,
            )
            .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_outcome_video_only() {
        let full = SplitOutcome {
            video_path: PathBuf::from("/v.mp4"),
            audio_path: Some(PathBuf::from("/a.mp3")),
            duration_s: 5.0,
        };
        let degraded = SplitOutcome {
            video_path: PathBuf::from("/v.mp4"),
            audio_path: None,
            duration_s: 5.0,
        };
        assert!(!full.is_video_only());
        assert!(degraded.is_video_only());
    }
}
