//! src/error.rs
//! ============================================================================
//! # `PumpError`: Error type for handler registration and persistence
//!
//! Registration problems are always recoverable: the registry reports them as
//! values and the pump logs and absorbs them, so one malformed handler never
//! aborts a larger batch load. Persistence problems carry enough context to
//! decide whether a backup file is worth trying.

use compact_str::CompactString;
use std::io::ErrorKind;
use thiserror::Error;

pub type PumpResult<T> = Result<T, PumpError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PumpError {
    /// Names, id and payload were all empty.
    #[error("Event handler config is empty")]
    EmptyConfig,

    /// Every supplied name was blank after trimming.
    #[error("Event handler has no usable names")]
    NoNames,

    /// Another active handler already owns this id.
    #[error("Event handler id '{id}' is already in use")]
    DuplicateId { id: CompactString },

    #[error("File system error on {path}: {kind:?}")]
    Io { path: CompactString, kind: ErrorKind },

    #[error("Serialization error: {0}")]
    Serialization(CompactString),

    #[error("Deserialization error: {0}")]
    Deserialization(CompactString),

    #[error("Event file version mismatch: expected at most {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Event file corrupted: {path}")]
    Corrupted { path: CompactString },

    #[error("Atomic save failed: {0}")]
    AtomicSave(CompactString),
}

impl PumpError {
    /// Registration failures are logged and skipped, never propagated.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PumpError::EmptyConfig | PumpError::NoNames | PumpError::DuplicateId { .. }
        )
    }

    /// Whether loading should fall back to the backup file.
    #[inline]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            PumpError::Corrupted { .. } | PumpError::Deserialization(_)
        )
    }

    #[inline]
    pub fn duplicate_id(id: &str) -> Self {
        Self::DuplicateId {
            id: CompactString::from(id),
        }
    }

    #[inline]
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: CompactString::from(path.to_string_lossy()),
            kind: err.kind(),
        }
    }

    #[inline]
    pub fn corrupted(path: &std::path::Path) -> Self {
        Self::Corrupted {
            path: CompactString::from(path.to_string_lossy()),
        }
    }
}

impl From<rmp_serde::encode::Error> for PumpError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        PumpError::Serialization(CompactString::from(err.to_string()))
    }
}

impl From<rmp_serde::decode::Error> for PumpError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        PumpError::Deserialization(CompactString::from(err.to_string()))
    }
}
