#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for shot post-processing.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeouts
//! - Streaming download of generated shots
//! - Demuxing into video-only and audio-only files, with a raw-file
//!   fallback when the demux cannot run
//! - FFprobe duration and stream inspection

pub mod command;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod split;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use download::MediaDownloader;
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use probe::{duration_or, probe_media, MediaInfo};
pub use split::{ShotSplitter, SplitOutcome};
