//! Local asset store for generated shots.
//!
//! This crate provides:
//! - Date-partitioned filesystem layout for video and audio files
//! - Public URL derivation mirroring the on-disk layout
//! - Full-job metadata snapshots as JSON
//! - Retention sweep for expired assets

pub mod config;
pub mod error;
pub mod paths;
pub mod retention;
pub mod store;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use paths::{regen_suffix, AssetLayout, FINAL_SUFFIX};
pub use retention::{sweep_expired, RetentionReport};
pub use store::{AssetStore, ShotDestinations};
