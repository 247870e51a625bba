//! Sync engine errors.

use std::fmt;

use paired_core::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four phases of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Upload,
    Download,
    Conflicts,
    Bookkeeping,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Conflicts => "conflicts",
            Self::Bookkeeping => "bookkeeping",
        })
    }
}

/// Memory sync error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync {phase} phase failed: {source}")]
    Phase {
        phase: SyncPhase,
        #[source]
        source: StorageError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid memory bundle: {0}")]
    InvalidBundle(String),
    #[error("Invalid redaction pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl SyncError {
    pub(crate) fn phase(phase: SyncPhase) -> impl FnOnce(StorageError) -> Self {
        move |source| Self::Phase { phase, source }
    }
}
