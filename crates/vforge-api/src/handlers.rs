//! HTTP request handlers.

pub mod generate;
pub mod health;
pub mod jobs;
pub mod refine;

pub use generate::*;
pub use health::*;
pub use jobs::*;
pub use refine::*;
