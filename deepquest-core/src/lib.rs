//! Deepquest Core - shared data structures and infrastructure
//!
//! This crate defines the research task tree, the knowledge store, the
//! unified error type, and the async/logging utilities used by every other
//! deepquest crate.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod logging;
pub mod progress;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use knowledge::*;
pub use logging::*;
pub use progress::*;
pub use types::*;

// Re-export commonly used external types
pub use tokio;
pub use tracing;
