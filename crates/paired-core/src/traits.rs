//! Core traits for session persistence and project knowledge.

use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Session identifier (`<project>-<millis>-<suffix>`).
pub type SessionId = String;

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is live and accepting requests.
    Active,
    /// Session was torn down explicitly or by the idle sweep.
    Destroyed,
}

/// Durable snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    /// Canonical project path.
    pub project_path: PathBuf,
    /// Owning client.
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: SessionStatus,
    /// Connection ids attached at the time of the snapshot.
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for session snapshot backends.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Create or replace the snapshot for a session.
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError>;

    /// Delete a snapshot. Returns whether one existed.
    async fn delete(&self, id: &str) -> Result<bool, StorageError>;

    /// Load every persisted snapshot.
    async fn load_all(&self) -> Result<Vec<SessionSnapshot>, StorageError>;
}

/// A piece of remembered content returned for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryExcerpt {
    pub text: String,
    /// Where it came from (`local`, `global:patterns`, ...).
    pub source: String,
    /// Relevance in `0.0..=1.0`.
    pub score: f64,
}

/// Durable record of a significant task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub agent_id: String,
    pub request: String,
    pub strategy: String,
    pub complexity: u8,
    pub risk: u8,
    pub effort: u32,
    pub success: bool,
    pub summary: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Lightweight pattern/error observation fed after every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternObservation {
    pub agent_id: String,
    /// Pattern type, e.g. the strategy name or `error:<kind>`.
    pub pattern_type: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
    pub outcome: String,
    pub confidence: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Context bundle transferred from one agent to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffPackage {
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,
    pub task_id: String,
    /// Human-readable reason for the handoff.
    pub reason: String,
    /// Recent work summaries from the sender.
    #[serde(default)]
    pub recent_work: Vec<String>,
    #[serde(default)]
    pub memory: Vec<MemoryExcerpt>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl HandoffPackage {
    /// Default lifetime of a persisted package.
    pub const TTL_HOURS: i64 = 24;

    /// Expiry for a package created at `created_at`.
    #[must_use]
    pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::hours(Self::TTL_HOURS)
    }

    /// Whether the package has outlived its TTL.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Project-scoped memory used by the agent runtime.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Local and cached-global excerpts relevant to `query`, best first.
    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryExcerpt>, StorageError>;

    /// Persist a significant task.
    async fn record_task(&self, record: TaskRecord) -> Result<(), StorageError>;

    /// Feed the pattern/error learning store.
    async fn record_pattern(&self, observation: PatternObservation) -> Result<(), StorageError>;

    /// Persist a handoff package.
    async fn save_handoff(&self, package: &HandoffPackage) -> Result<(), StorageError>;

    /// Remove and return unexpired packages addressed to `agent_id`.
    async fn take_handoffs(&self, agent_id: &str) -> Result<Vec<HandoffPackage>, StorageError>;
}
