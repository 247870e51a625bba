//! Per-task runtime: state machine, analysis, strategy, learning and handoff.

pub mod analysis;
pub mod handoff;
pub mod learning;
pub mod strategy;

use std::time::Duration;

use chrono::{DateTime, Utc};
use paired_core::{
    TaskContext,
    config::opt_secs,
    traits::{HandoffPackage, MemoryExcerpt},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, ExecutionError, RecoveryAction};

pub use analysis::{TaskAnalysis, Urgency};
pub use learning::LearningStore;
pub use strategy::{HandoffDirective, Strategy};

/// Agent runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on a single execution. `None` lets tasks run unbounded.
    #[serde(with = "opt_secs", rename = "task_timeout_secs")]
    pub task_timeout: Option<Duration>,
    /// Memory excerpts pulled in during enrichment.
    pub recall_limit: usize,
    /// Tasks above this complexity are persisted.
    pub significant_complexity: u8,
    /// Tasks above this effort are persisted.
    pub significant_effort: u32,
    /// Recent work summaries kept per agent for handoffs.
    pub recent_work_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            task_timeout: None,
            recall_limit: 3,
            significant_complexity: 5,
            significant_effort: 30,
            recent_work_limit: 5,
        }
    }
}

impl RuntimeConfig {
    /// Whether a task is worth persisting to project memory.
    #[must_use]
    pub const fn is_significant(&self, analysis: &TaskAnalysis) -> bool {
        analysis.complexity > self.significant_complexity || analysis.effort > self.significant_effort
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Received,
    ContextEnriched,
    Analyzed,
    StrategySelected,
    Executing,
    Completed,
    Failed,
    HandedOff,
}

impl TaskState {
    /// Whether `next` may follow `self`.
    ///
    /// Any non-terminal state may fail.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::ContextEnriched)
                | (Self::ContextEnriched, Self::Analyzed)
                | (Self::Analyzed, Self::StrategySelected)
                | (Self::StrategySelected, Self::Executing)
                | (Self::Executing, Self::Completed)
                | (Self::Completed | Self::Failed, Self::HandedOff)
                | (
                    Self::Received
                        | Self::ContextEnriched
                        | Self::Analyzed
                        | Self::StrategySelected
                        | Self::Executing,
                    Self::Failed
                )
        )
    }

    /// Whether a result has been recorded.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::HandedOff)
    }
}

/// Working context assembled before analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub agent_id: String,
    pub agent_name: String,
    pub role: String,
    pub expertise: Vec<String>,
    pub memory: Vec<MemoryExcerpt>,
    /// Notes from handoffs received for this project.
    pub handoff_notes: Vec<String>,
    pub enriched_at: DateTime<Utc>,
}

/// Execution metrics reported by every strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub duration_ms: u64,
    pub steps: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collaborators: Vec<String>,
}

/// Result of a successful execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Strategy name that produced the payload.
    pub method: String,
    pub payload: Value,
    pub metrics: ExecutionMetrics,
}

/// Final outcome of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed {
        output: ExecutionOutput,
    },
    Failed {
        error_kind: ErrorKind,
        message: String,
        recovery: RecoveryAction,
        suggestion: String,
    },
}

impl TaskOutcome {
    /// Structured failure envelope for an error.
    #[must_use]
    pub fn failed(error: &ExecutionError) -> Self {
        let recovery = error.recovery();
        Self::Failed {
            error_kind: error.kind(),
            message: error.to_string(),
            recovery,
            suggestion: recovery.suggestion().to_string(),
        }
    }

    /// Whether the task completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// A task moving through the state machine.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub agent_id: String,
    pub request: String,
    pub context: TaskContext,
    pub state: TaskState,
    pub enrichment: Option<Enrichment>,
    pub analysis: Option<TaskAnalysis>,
    pub strategy: Option<Strategy>,
    pub received_at: DateTime<Utc>,
    /// Every state visited, in order.
    pub history: Vec<TaskState>,
}

impl Task {
    /// A freshly received task.
    #[must_use]
    pub fn new(agent_id: &str, request: &str, context: TaskContext) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            request: request.to_string(),
            context,
            state: TaskState::Received,
            enrichment: None,
            analysis: None,
            strategy: None,
            received_at: Utc::now(),
            history: vec![TaskState::Received],
        }
    }

    /// Move to `next`.
    ///
    /// # Errors
    /// Returns `Other` when the transition is not allowed.
    pub fn advance(&mut self, next: TaskState) -> Result<(), ExecutionError> {
        if !self.state.can_transition(next) {
            return Err(ExecutionError::Other(format!(
                "invalid task transition {:?} -> {next:?}",
                self.state
            )));
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Memory excerpts gathered during enrichment.
    #[must_use]
    pub fn memory(&self) -> &[MemoryExcerpt] {
        self.enrichment.as_ref().map_or(&[], |e| e.memory.as_slice())
    }
}

/// What `AgentInstance::execute` returns. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub agent_id: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<TaskAnalysis>,
    pub outcome: TaskOutcome,
    /// Package created when the task was handed off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffPackage>,
    pub duration_ms: u64,
    pub history: Vec<TaskState>,
}

impl TaskReport {
    /// Whether the task completed (including completed handoffs).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Receiving agent when the task was handed off.
    #[must_use]
    pub fn handoff_target(&self) -> Option<&str> {
        self.handoff.as_ref().map(|p| p.to_agent.as_str())
    }
}
