//! src/config.rs
//! ============================================================================
//! # Config: Pump configuration loader and saver
//!
//! Loads and saves settings as TOML, either from an explicit path or from the
//! platform config directory resolved with
//! [`directories`](https://docs.rs/directories).
//!
//! ## Example
//! ```rust,ignore
//! let config = PumpConfig::load()?;
//! let pump = Pump::builder().with_config(config.pump.clone()).build();
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::logging::LoggerConfig;

/// Dispatch engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nested `drain()` calls at or beyond this depth are refused.
    pub max_depth: usize,

    /// Deliver buffered messages to the output surface after each instance.
    pub flush_messages: bool,
}

impl EngineConfig {
    /// Rejects settings that would leave the pump unable to dispatch.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_depth == 0 {
            anyhow::bail!("pump.max_depth must be greater than 0");
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 128,
            flush_messages: true,
        }
    }
}

/// On-disk encoding of the saved handler list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistFormat {
    #[default]
    Json,

    #[serde(alias = "messagepack")]
    Msgpack,
}

impl std::str::FromStr for PersistFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" => Ok(Self::Msgpack),
            other => Err(format!("unknown persistence format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub format: PersistFormat,

    /// Copy the previous file to `.bak` before overwriting it.
    pub create_backups: bool,

    /// Store and verify a checksum of the handler records.
    pub validate_checksums: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            format: PersistFormat::Json,
            create_backups: true,
            validate_checksums: true,
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    pub pump: EngineConfig,

    pub persistence: PersistenceConfig,

    pub logging: LoggerConfig,
}

impl PumpConfig {
    /// Loads config from the platform config dir, writing defaults if absent.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );
            let default_config = Self::default();
            default_config.save_to(&path)?;
            Ok(default_config)
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        info!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        cfg.pump
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        info!("Saving config to {}", path.display());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Canonical config file path from `directories::ProjectDirs`.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "pump", "EventPump")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }
}
