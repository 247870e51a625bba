//! Registry and execution errors.

use std::path::PathBuf;

use paired_core::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Agent registry error.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Malformed agent descriptor {descriptor}: {reason}")]
    Validation { descriptor: String, reason: String },
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Agent not found: {0}")]
    NotFound(String),
    #[error("Failed to instantiate agent {agent_id}: {reason}")]
    Instantiation { agent_id: String, reason: String },
}

impl RegistryError {
    pub(crate) fn validation(descriptor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            descriptor: descriptor.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn instantiation(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Instantiation {
            agent_id: agent_id.into(),
            reason: reason.into(),
        }
    }
}

/// Error class of a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Permission,
    NotFound,
    Other,
}

impl ErrorKind {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Other => "other",
        }
    }

    /// Recovery action for this class.
    #[must_use]
    pub const fn recovery(self) -> RecoveryAction {
        match self {
            Self::Timeout => RecoveryAction::Retry,
            Self::Permission => RecoveryAction::Escalate,
            Self::NotFound => RecoveryAction::SearchAlternative,
            Self::Other => RecoveryAction::ConsiderHandoff,
        }
    }
}

/// What the caller should try next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Escalate,
    SearchAlternative,
    ConsiderHandoff,
}

impl RecoveryAction {
    /// Human-readable suggestion.
    #[must_use]
    pub const fn suggestion(self) -> &'static str {
        match self {
            Self::Retry => "Retry the task, possibly with a smaller scope or a longer timeout",
            Self::Escalate => "Escalate to someone with the required permissions",
            Self::SearchAlternative => "Search for an alternative resource or location",
            Self::ConsiderHandoff => "Consider handing the task off to a better-suited agent",
        }
    }
}

/// Failure inside an agent while running a task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

impl ExecutionError {
    /// Classify a free-form failure message.
    #[must_use]
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout(message)
        } else if lower.contains("permission") || lower.contains("denied") || lower.contains("forbidden") {
            Self::PermissionDenied(message)
        } else if lower.contains("not found") || lower.contains("no such") || lower.contains("enoent") {
            Self::NotFound(message)
        } else {
            Self::Other(message)
        }
    }

    /// Error class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::PermissionDenied(_) => ErrorKind::Permission,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Recovery action for this error.
    #[must_use]
    pub const fn recovery(&self) -> RecoveryAction {
        self.kind().recovery()
    }
}

impl From<StorageError> for ExecutionError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => Self::NotFound(what),
            StorageError::Io(io) => match io.kind() {
                std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(io.to_string()),
                std::io::ErrorKind::NotFound => Self::NotFound(io.to_string()),
                std::io::ErrorKind::TimedOut => Self::Timeout(io.to_string()),
                _ => Self::Other(io.to_string()),
            },
            other => Self::classify(other.to_string()),
        }
    }
}
