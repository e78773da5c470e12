//! Template matching and job orchestration.
//!
//! This crate provides:
//! - The on-disk template catalog
//! - Hybrid semantic/lexical template matching
//! - Injectable service seams over the ML, generator and media clients
//! - The orchestrator driving every workflow: plan, generate, finalize,
//!   revise and single-shot regeneration

pub mod catalog;
pub mod config;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod orchestrator;
pub mod services;

pub use catalog::TemplateCatalog;
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use matcher::{MatchStrategy, TemplateMatch, TemplateMatcher};
pub use orchestrator::{JobRequest, Orchestrator, PlannedJob};
pub use services::{Embedder, IntentService, MediaService, ShotGenerator, ShotMediaService};
