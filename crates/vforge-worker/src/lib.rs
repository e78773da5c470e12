//! Render worker: consumes queued operations and drives the pipeline.
//!
//! One executor task pulls render ops from the Redis Streams queue and
//! runs them under a bounded concurrency budget; background sweeps fail
//! jobs stuck in RUNNING and delete aged-out records and assets.

pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod sweeper;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::RenderExecutor;
pub use sweeper::{RetentionSweeper, StaleJobSweeper};
