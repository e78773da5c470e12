//! Shared data models for VideoForge backend.
//!
//! This crate provides Serde-serializable types for:
//! - Intents, templates and shot plans
//! - Compiled generation requests and shot assets
//! - The job aggregate and its state machine
//! - Quality modes, policy constants and parameter validation
//! - Prompt/request compilation

pub mod asset;
pub mod compile;
pub mod intent;
pub mod job;
pub mod plan;
pub mod policy;
pub mod quality;
pub mod request;
pub mod template;
pub mod validate;

// Re-export common types
pub use asset::ShotAsset;
pub use compile::{compile_requests, compile_shot, compress_narration, draw_seed};
pub use intent::{AudioSpec, Character, Intent, SceneHints, StyleHints};
pub use job::{
    ErrorClass, InvalidTransition, Job, JobError, JobErrorKind, JobId, JobState, ShotError,
    StateTransition,
};
pub use plan::{GlobalStyle, Shot, ShotAudio, ShotPlan, SubtitlePolicy};
pub use policy::SuccessPolicy;
pub use quality::{ModeProfile, QualityMode, Strictness};
pub use request::{parse_size, to_wire_size, GenerationParams, ShotRequest};
pub use template::{
    AudioTemplate, ShotSkeleton, SkeletonRole, Template, TemplateConstraints, TemplateId,
    TemplateTags,
};
pub use validate::{validate_plan, validate_refinement};
