//! Logging configuration and initialization
//!
//! Centralized tracing setup for all Matchlog components. Supports:
//!
//! - Multiple output targets (console, file, both)
//! - Text or JSON formatting
//! - Daily log file rotation
//! - Environment-based configuration
//!
//! Use the structured logging macros (`trace!`, `debug!`, `info!`, `warn!`,
//! `error!`) with fields rather than `println!`:
//!
//! ```rust
//! use tracing::info;
//!
//! # let source_id = "s1"; let count = 3;
//! info!(source_id = %source_id, lines = count, "Batch accepted");
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{MatchlogError, Result};

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = MatchlogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(MatchlogError::Parse(format!("invalid log level: {}", s))),
        }
    }
}

/// Output target for logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl std::str::FromStr for LogOutput {
    type Err = MatchlogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(MatchlogError::Parse(format!("invalid log output: {}", s))),
        }
    }
}

/// Log format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = MatchlogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(MatchlogError::Parse(format!("invalid log format: {}", s))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,

    /// Output target (console, file, or both)
    pub output: LogOutput,

    /// Log format (text or JSON)
    pub format: LogFormat,

    /// Directory for log files (only used when output includes file)
    pub log_dir: PathBuf,

    /// Log file name prefix (e.g., "matchlog" -> "matchlog.2026-08-31.log")
    pub log_file_prefix: String,

    /// Additional filter directives (e.g., "sqlx=warn,tower_http=debug")
    pub filter_directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "matchlog".to_string(),
            filter_directives: None,
        }
    }
}

impl LogConfig {
    /// Load configuration from environment variables
    ///
    /// - `LOG_LEVEL`: trace, debug, info, warn, error
    /// - `LOG_OUTPUT`: console, file, both
    /// - `LOG_FORMAT`: text, json
    /// - `LOG_DIR`: directory for log files
    /// - `LOG_FILE_PREFIX`: prefix for log files
    /// - `LOG_FILTER`: additional filter directives
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.level = level.parse()?;
        }

        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            config.output = output.parse()?;
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.format = format.parse()?;
        }

        if let Ok(dir) = std::env::var("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if let Ok(prefix) = std::env::var("LOG_FILE_PREFIX") {
            config.log_file_prefix = prefix;
        }

        if let Ok(filter) = std::env::var("LOG_FILTER") {
            config.filter_directives = Some(filter);
        }

        Ok(config)
    }

    /// Override the file prefix, fluent style
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_file_prefix = prefix.into();
        self
    }

    /// Override the filter directives, fluent style
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directives = Some(filter.into());
        self
    }
}

/// Initialize logging with the given configuration
///
/// Sets up the global tracing subscriber; call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let mut filter =
        EnvFilter::from_default_env().add_directive(config.level.to_tracing_level().into());

    if let Some(ref directives) = config.filter_directives {
        for directive in directives.split(',') {
            let directive = directive.trim();
            filter = filter.add_directive(directive.parse().map_err(|e| {
                MatchlogError::Config(format!("invalid filter directive {:?}: {}", directive, e))
            })?);
        }
    }

    let registry = tracing_subscriber::registry().with(filter);

    // Layers are built inside each (output, format) arm: the subscriber a
    // layer stacks onto is part of its type, so one binding cannot serve
    // both the text and the json stack.
    match (&config.output, &config.format) {
        (LogOutput::Console, LogFormat::Text) => {
            let console = fmt::layer()
                .with_writer(std::io::stdout)
                .with_span_events(FmtSpan::CLOSE);
            registry.with(console).try_init().map_err(init_error)?;
        },
        (LogOutput::Console, LogFormat::Json) => {
            let console = fmt::layer()
                .with_writer(std::io::stdout)
                .with_span_events(FmtSpan::CLOSE)
                .json();
            registry.with(console).try_init().map_err(init_error)?;
        },
        (LogOutput::File, LogFormat::Text) => {
            let file = fmt::layer()
                .with_writer(file_writer(config)?)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(false);
            registry.with(file).try_init().map_err(init_error)?;
        },
        (LogOutput::File, LogFormat::Json) => {
            let file = fmt::layer()
                .with_writer(file_writer(config)?)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(false)
                .json();
            registry.with(file).try_init().map_err(init_error)?;
        },
        (LogOutput::Both, LogFormat::Text) => {
            let console = fmt::layer()
                .with_writer(std::io::stdout)
                .with_span_events(FmtSpan::CLOSE);
            let file = fmt::layer()
                .with_writer(file_writer(config)?)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(false);
            registry.with(console).with(file).try_init().map_err(init_error)?;
        },
        (LogOutput::Both, LogFormat::Json) => {
            let console = fmt::layer()
                .with_writer(std::io::stdout)
                .with_span_events(FmtSpan::CLOSE)
                .json();
            let file = fmt::layer()
                .with_writer(file_writer(config)?)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(false)
                .json();
            registry.with(console).with(file).try_init().map_err(init_error)?;
        },
    }

    Ok(())
}

fn init_error(e: impl std::fmt::Display) -> MatchlogError {
    MatchlogError::Config(format!("failed to install global subscriber: {}", e))
}

fn file_writer(config: &LogConfig) -> Result<tracing_appender::non_blocking::NonBlocking> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The guard must outlive the program for buffered lines to be flushed
    std::mem::forget(guard);

    Ok(non_blocking)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_output_from_str() {
        assert_eq!("stdout".parse::<LogOutput>().unwrap(), LogOutput::Console);
        assert_eq!("file".parse::<LogOutput>().unwrap(), LogOutput::File);
        assert_eq!("all".parse::<LogOutput>().unwrap(), LogOutput::Both);
        assert!("syslog".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_config_from_defaults() {
        let config = LogConfig::default()
            .with_file_prefix("test")
            .with_filter("sqlx=warn");

        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.log_file_prefix, "test");
        assert_eq!(config.filter_directives.as_deref(), Some("sqlx=warn"));
    }

    #[test]
    fn test_invalid_level_is_parse_error() {
        let err = "verbose".parse::<LogLevel>().unwrap_err();
        assert!(matches!(err, MatchlogError::Parse(_)));
    }

    #[test]
    fn test_bad_filter_directive_rejected() {
        let config = LogConfig::default().with_filter("not a directive!!");
        let err = init_logging(&config).unwrap_err();
        assert!(matches!(err, MatchlogError::Config(_)));
    }

    // Only one test may install the global subscriber; this one covers the
    // dual-layer stack, which pins the layer types the hardest.
    #[test]
    fn test_init_both_outputs_json() {
        let mut config = LogConfig::default().with_file_prefix("test-init");
        config.output = LogOutput::Both;
        config.format = LogFormat::Json;
        config.log_dir = std::env::temp_dir().join("matchlog-logging-test");

        init_logging(&config).expect("dual-layer json subscriber installs");
    }
}
