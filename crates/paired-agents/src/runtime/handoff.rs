//! Handoff packages: bundling context for another agent and folding it in.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use paired_core::traits::{HandoffPackage, MemoryExcerpt};
use serde::{Deserialize, Serialize};

use super::analysis::TaskAnalysis;

/// Inputs for a new package.
#[derive(Debug, Clone)]
pub struct HandoffDraft<'a> {
    pub from_agent: &'a str,
    pub to_agent: &'a str,
    pub project_path: Option<PathBuf>,
    pub task_id: &'a str,
    pub request: &'a str,
    pub reason: &'a str,
    pub analysis: &'a TaskAnalysis,
    pub recent_work: Vec<String>,
    pub memory: Vec<MemoryExcerpt>,
}

/// Build a package expiring `HandoffPackage::TTL_HOURS` from now.
#[must_use]
pub fn package(draft: HandoffDraft<'_>) -> HandoffPackage {
    let created_at = Utc::now();
    let mut recent_work = draft.recent_work;
    recent_work.push(format!("Pending: {}", draft.request));

    HandoffPackage {
        id: uuid::Uuid::new_v4().to_string(),
        from_agent: draft.from_agent.to_string(),
        to_agent: draft.to_agent.to_string(),
        project_path: draft.project_path,
        task_id: draft.task_id.to_string(),
        reason: draft.reason.to_string(),
        recent_work,
        recommendations: recommendations(draft.analysis, &draft.memory),
        memory: draft.memory,
        created_at,
        expires_at: HandoffPackage::expiry_for(created_at),
    }
}

/// Advice for the receiver derived from the sender's analysis.
#[must_use]
pub fn recommendations(analysis: &TaskAnalysis, memory: &[MemoryExcerpt]) -> Vec<String> {
    let mut out = Vec::new();
    if !analysis.required_capabilities.is_empty() {
        out.push(format!(
            "Task calls for: {}",
            analysis.required_capabilities.join(", ")
        ));
    }
    if analysis.risk > 5 {
        out.push(format!(
            "Risk assessed at {}/10: confirm before applying changes",
            analysis.risk
        ));
    }
    if analysis.complexity > 5 {
        out.push("Break the work into smaller steps before starting".to_string());
    }
    if let Some(best) = memory.first() {
        out.push(format!("Start from prior work: {}", best.text));
    }
    out.extend(analysis.notes.iter().cloned());
    out
}

/// A package folded into the receiving agent's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedHandoff {
    pub package_id: String,
    pub from_agent: String,
    pub project_path: Option<PathBuf>,
    pub reason: String,
    /// Recent work and recommendations flattened into notes.
    pub notes: Vec<String>,
    pub memory: Vec<MemoryExcerpt>,
    pub accepted_at: DateTime<Utc>,
}

impl ReceivedHandoff {
    /// Fold a package into receiver-side notes.
    #[must_use]
    pub fn accept(package: HandoffPackage) -> Self {
        let mut notes = Vec::with_capacity(package.recent_work.len() + package.recommendations.len() + 1);
        notes.push(format!("Handed off by {}: {}", package.from_agent, package.reason));
        notes.extend(package.recent_work);
        notes.extend(package.recommendations);
        Self {
            package_id: package.id,
            from_agent: package.from_agent,
            project_path: package.project_path,
            reason: package.reason,
            notes,
            memory: package.memory,
            accepted_at: Utc::now(),
        }
    }

    /// Whether the handoff concerns the given project (unscoped handoffs concern every project).
    #[must_use]
    pub fn concerns(&self, project: Option<&std::path::Path>) -> bool {
        match (&self.project_path, project) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        }
    }
}
