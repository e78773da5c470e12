//! HTTP API server for the video generation pipeline.
//!
//! Exposes the planning and generation workflows over JSON, enforces
//! per-client admission limits and serves generated assets from the
//! static root. Long-running work never executes here; accepted jobs
//! are queued and picked up by the worker.

pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use identity::ClientIdentity;
pub use routes::create_router;
pub use state::AppState;
