//! src/persistence.rs
//! ============================================================================
//! Saved-game persistence for registered event handlers.
//!
//! Handlers are written as a versioned envelope, either JSON or MessagePack:
//! - saves go to a temporary file that is then renamed over the target
//! - the previous file can be kept as `.bak` and is tried when the main file
//!   fails to decode or fails its checksum
//! - menu-item and disabled handlers are never written

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{PersistFormat, PersistenceConfig};
use crate::controller::pump::Pump;
use crate::error::{PumpError, PumpResult};
use crate::model::handler::{Handler, Payload};

/// One saved handler: comma-joined names, id and the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedHandler {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    pub payload: Payload,
}

impl PersistedHandler {
    pub fn from_handler(handler: &Handler) -> Self {
        Self {
            name: handler.joined_names(),
            id: handler.id().unwrap_or_default().to_string(),
            payload: Payload::clone(handler.payload()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEvents {
    version: u32,

    handlers: Vec<PersistedHandler>,

    #[serde(default)]
    checksum: Option<u64>,
}

pub struct EventStore {
    file_path: PathBuf,
    temp_path: PathBuf,
    backup_path: PathBuf,
    config: PersistenceConfig,
}

impl EventStore {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(file_path: impl Into<PathBuf>, config: PersistenceConfig) -> Self {
        let file_path = file_path.into();
        let temp_path = file_path.with_extension("tmp");
        let backup_path = file_path.with_extension("bak");
        Self {
            file_path,
            temp_path,
            backup_path,
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Writes the pump's persistable handlers. Returns how many were saved.
    pub fn save(&self, pump: &Pump) -> PumpResult<usize> {
        self.save_records(pump.write_events())
    }

    pub fn save_records(&self, handlers: Vec<PersistedHandler>) -> PumpResult<usize> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| PumpError::io(parent, e))?;
            }
        }

        if self.config.create_backups && self.file_path.exists() {
            std::fs::copy(&self.file_path, &self.backup_path)
                .map_err(|e| PumpError::io(&self.backup_path, e))?;
            debug!(backup = %self.backup_path.display(), "Backed up previous event file");
        }

        let count = handlers.len();
        let checksum = self
            .config
            .validate_checksums
            .then(|| calculate_checksum(&handlers));
        let envelope = PersistedEvents {
            version: Self::CURRENT_VERSION,
            handlers,
            checksum,
        };

        let data = self.encode(&envelope)?;
        self.atomic_save(&data)?;

        info!(path = %self.file_path.display(), count, "Saved event handlers");
        Ok(count)
    }

    /// Reads saved handlers, falling back to the backup when the main file is
    /// corrupt. A missing file yields an empty list.
    pub fn load(&self) -> PumpResult<Vec<PersistedHandler>> {
        match self.load_from_file(&self.file_path) {
            Ok(handlers) => Ok(handlers),
            Err(e) if e.is_corruption() && self.backup_path.exists() => {
                warn!(error = %e, "Event file corrupted, trying backup");
                self.load_from_file(&self.backup_path)
            }
            Err(e) => Err(e),
        }
    }

    /// Loads saved handlers straight into `pump`. Returns how many were
    /// accepted by the registry.
    pub fn load_into(&self, pump: &Pump) -> PumpResult<usize> {
        let records = self.load()?;
        Ok(pump.read_events(records))
    }

    /// Removes a leftover temporary file, and the backup when backups are
    /// turned off.
    pub fn cleanup(&self) {
        if self.temp_path.exists() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
        if !self.config.create_backups && self.backup_path.exists() {
            let _ = std::fs::remove_file(&self.backup_path);
        }
    }

    fn load_from_file(&self, path: &Path) -> PumpResult<Vec<PersistedHandler>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let data = std::fs::read(path).map_err(|e| PumpError::io(path, e))?;
        let envelope = self.decode(&data)?;

        if envelope.version > Self::CURRENT_VERSION {
            return Err(PumpError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: envelope.version,
            });
        }

        if self.config.validate_checksums {
            if let Some(stored) = envelope.checksum {
                if stored != calculate_checksum(&envelope.handlers) {
                    return Err(PumpError::corrupted(path));
                }
            }
        }

        debug!(path = %path.display(), count = envelope.handlers.len(), "Loaded event handlers");
        Ok(envelope.handlers)
    }

    fn encode(&self, envelope: &PersistedEvents) -> PumpResult<Vec<u8>> {
        match self.config.format {
            PersistFormat::Json => serde_json::to_vec_pretty(envelope)
                .map_err(|e| PumpError::Serialization(CompactString::from(e.to_string()))),
            PersistFormat::Msgpack => Ok(rmp_serde::to_vec_named(envelope)?),
        }
    }

    fn decode(&self, data: &[u8]) -> PumpResult<PersistedEvents> {
        match self.config.format {
            PersistFormat::Json => serde_json::from_slice(data)
                .map_err(|e| PumpError::Deserialization(CompactString::from(e.to_string()))),
            PersistFormat::Msgpack => Ok(rmp_serde::from_slice(data)?),
        }
    }

    fn atomic_save(&self, data: &[u8]) -> PumpResult<()> {
        std::fs::write(&self.temp_path, data).map_err(|e| {
            PumpError::AtomicSave(CompactString::from(format!(
                "Failed to write temp file: {e}"
            )))
        })?;

        std::fs::rename(&self.temp_path, &self.file_path).map_err(|e| {
            PumpError::AtomicSave(CompactString::from(format!(
                "Failed to rename temp file: {e}"
            )))
        })
    }
}

fn calculate_checksum(handlers: &[PersistedHandler]) -> u64 {
    let mut hasher = DefaultHasher::new();

    handlers.len().hash(&mut hasher);
    for handler in handlers {
        handler.name.hash(&mut hasher);
        handler.id.hash(&mut hasher);
        handler.payload.to_string().hash(&mut hasher);
    }

    hasher.finish()
}
