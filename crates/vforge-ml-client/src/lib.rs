//! Client for the text-understanding service.
//!
//! This crate provides:
//! - Intent parsing from free text
//! - Template instantiation into shot plans
//! - Revision feedback parsing
//! - Text embeddings for semantic template matching

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::MlClient;
pub use config::MlConfig;
pub use error::{MlError, MlResult};
pub use types::FeedbackDelta;
