//! Client for the external text-to-video generator.
//!
//! This crate provides:
//! - Async submit/poll task protocol
//! - Exponential backoff for transient submission failures
//! - Transient vs fatal error classification for per-shot reporting

pub mod client;
pub mod config;
pub mod error;
pub mod retry;

pub use client::{GenClient, GenerationOutcome, TaskStatus, TaskStatusResponse};
pub use config::GenConfig;
pub use error::{GenError, GenResult};
pub use retry::RetryPolicy;
