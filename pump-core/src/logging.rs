//! src/logging.rs
//! ============================================================================
//! Tracing setup for hosts embedding the pump.
//!
//! The library only emits `tracing` events; a host installs a subscriber once
//! through [`LoggerBuilder`]: an `EnvFilter` seeded from the configured
//! level, a human-readable layer on stderr and, when a log directory is
//! configured, a JSON-lines rolling file written through a non-blocking
//! `tracing-appender` worker.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, filter::Directive, layer::SubscriberExt, util::SubscriberInitExt,
};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_level: CompactString,

    /// JSON-lines file output is enabled only when set.
    pub log_dir: Option<PathBuf>,

    pub log_file_prefix: CompactString,

    pub max_log_files: usize,

    pub rotation: LogRotation,

    pub ansi: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: CompactString::const_new("info"),
            log_dir: None,
            log_file_prefix: CompactString::const_new("pump"),
            max_log_files: 10,
            rotation: LogRotation::Daily,
            ansi: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directory: {0}")]
    InvalidLogDirectory(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: &str) -> Self {
        self.config.log_level = CompactString::new(level);
        self
    }

    /// Installs the global subscriber. Keep the returned guard alive for as
    /// long as file output should be flushed.
    pub fn build(self) -> Result<Option<WorkerGuard>> {
        validate_config(&self.config)?;

        if INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(LoggingError::AlreadyInitialized.into());
        }

        let directive = Directive::from_str(&self.config.log_level)
            .context("Invalid log level in config")?;
        let filter = EnvFilter::from_default_env().add_directive(directive);

        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(self.config.ansi)
            .with_target(true);

        let (file_layer, guard) = match &self.config.log_dir {
            Some(dir) => {
                setup_log_directory(dir)?;

                let rotation = match self.config.rotation {
                    LogRotation::Never => Rotation::NEVER,
                    LogRotation::Daily => Rotation::DAILY,
                };

                let file_appender = RollingFileAppender::builder()
                    .rotation(rotation)
                    .filename_prefix(self.config.log_file_prefix.as_str())
                    .filename_suffix("jsonl")
                    .max_log_files(self.config.max_log_files)
                    .build(dir)
                    .context("Failed to create file appender")?;

                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .try_init();

        if let Err(e) = installed {
            INITIALIZED.store(false, Ordering::SeqCst);
            return Err(anyhow::anyhow!(e)).context("Failed to install global tracing subscriber");
        }

        Ok(guard)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_config(config: &LoggerConfig) -> Result<()> {
    if config.log_level.trim().is_empty() {
        return Err(LoggingError::ConfigError("Log level must not be empty".to_string()).into());
    }

    if config.max_log_files == 0 {
        return Err(LoggingError::ConfigError(
            "Max log files must be greater than 0".to_string(),
        )
        .into());
    }

    if let Some(dir) = &config.log_dir {
        validate_log_directory(dir)?;
    }
    Ok(())
}

fn validate_log_directory(path: &Path) -> Result<()> {
    if path.components().count() == 0 {
        return Err(LoggingError::InvalidLogDirectory("Empty path".to_string()).into());
    }

    for component in path.components() {
        if component == std::path::Component::ParentDir {
            return Err(LoggingError::InvalidLogDirectory(
                "Path contains parent directory references".to_string(),
            )
            .into());
        }
    }

    Ok(())
}

fn setup_log_directory(log_dir: &Path) -> Result<()> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)
            .map_err(LoggingError::from)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }
    Ok(())
}
