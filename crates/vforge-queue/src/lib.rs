//! Redis Streams render queue and admission control.
//!
//! This crate provides:
//! - Operation dispatch via Redis Streams with retry/DLQ
//! - Idempotent enqueueing keyed per (job, operation)
//! - Per-client rate and concurrency admission checks

pub mod error;
pub mod gate;
pub mod message;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use gate::{Admission, AdmissionGate, GateConfig};
pub use message::{RenderMessage, RenderOp};
pub use queue::{QueueConfig, RenderQueue};
