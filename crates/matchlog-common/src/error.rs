//! Error types for Matchlog

use thiserror::Error;

/// Result type alias for Matchlog operations
pub type Result<T> = std::result::Result<T, MatchlogError>;

/// Main error type for Matchlog
#[derive(Error, Debug)]
pub enum MatchlogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
