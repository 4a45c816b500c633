// Public modules
pub mod config;
pub mod delta;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod notify;
pub mod plugins;
pub mod releases;
pub mod signals;
pub mod ssh;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
