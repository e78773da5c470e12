//! SQLite job record store.
//!
//! This crate provides:
//! - Embedded schema migrations
//! - The `JobStore` repository over jobs, shot assets and transition history
//! - Guarded state updates that enforce the job state machine
//! - Listing, stale-run lookup and retention deletes

pub mod config;
pub mod error;
pub mod store;

pub use config::DbConfig;
pub use error::{DbError, DbResult};
pub use store::{JobStore, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
