//! Matchlog Common Library
//!
//! Shared error handling and logging setup for the Matchlog workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all Matchlog workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized tracing configuration and initialization
//!
//! # Example
//!
//! ```no_run
//! use matchlog_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> matchlog_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!
//!     info!("Application started");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{MatchlogError, Result};
