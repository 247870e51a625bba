//! Wire protocol between clients and the daemon.

use std::{collections::HashMap, path::PathBuf};

use paired_agents::{AgentStats, InstanceStatus, RouteDecision, TaskReport};
use paired_memory::{ExportReport, ImportReport, MergeStrategy, Recommendation, SyncManifest};
use paired_session::{Session, SessionStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const fn default_limit() -> usize {
    5
}

/// Message from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Resolve or create the client's session and optionally attach a connection.
    Connect {
        project_path: PathBuf,
        client_id: String,
        #[serde(default)]
        connection_id: Option<String>,
        #[serde(default)]
        metadata: HashMap<String, Value>,
    },
    /// Detach a connection.
    Disconnect {
        session_id: String,
        connection_id: String,
    },
    /// Run a task, routed unless an agent is named.
    Task {
        project_path: PathBuf,
        client_id: String,
        description: String,
        #[serde(default)]
        agent_id: Option<String>,
        #[serde(default)]
        attachments: Vec<String>,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        environment: Option<String>,
    },
    /// Score a description against the running agents.
    Route {
        description: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    /// Run a full memory sync for a project.
    Sync { project_path: PathBuf },
    Recommendations {
        project_path: PathBuf,
        context: String,
        #[serde(default)]
        agent_id: Option<String>,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    ExportMemory {
        project_path: PathBuf,
        output: PathBuf,
        #[serde(default)]
        include_private: bool,
    },
    ImportMemory {
        project_path: PathBuf,
        input: PathBuf,
        #[serde(default)]
        strategy: MergeStrategy,
    },
    /// Re-read an agent descriptor and recreate the instance.
    ReloadAgent { agent_id: String },
    Stats,
    /// Keepalive.
    Ping,
}

/// Per-agent entry of a stats response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub behavior: String,
    pub status: InstanceStatus,
    pub stats: AgentStats,
}

/// Message from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Connected { session: Session },
    Disconnected { session_id: String, removed: bool },
    TaskResult {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        route: Option<RouteDecision>,
        report: TaskReport,
        /// Run of the receiving agent when the task was handed off.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        followup: Option<TaskReport>,
    },
    Routed { decision: Option<RouteDecision> },
    Synced { manifest: SyncManifest },
    Recommendations { items: Vec<Recommendation> },
    Exported { report: ExportReport },
    Imported { report: ImportReport },
    AgentReloaded { agent_id: String },
    Stats {
        sessions: SessionStats,
        agents: Vec<AgentSummary>,
    },
    /// Failure of any request.
    Error {
        kind: String,
        message: String,
        retriable: bool,
    },
    Pong,
}

impl Response {
    /// Build an error response.
    #[must_use]
    pub fn error(kind: impl Into<String>, message: impl Into<String>, retriable: bool) -> Self {
        Self::Error {
            kind: kind.into(),
            message: message.into(),
            retriable,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parsing_with_defaults() {
        let request: Request = serde_json::from_str(
            r#"{"type": "recommendations", "project_path": "/p", "context": "add caching"}"#,
        )
        .unwrap();
        match request {
            Request::Recommendations { limit, agent_id, .. } => {
                assert_eq!(limit, 5);
                assert!(agent_id.is_none());
            }
            other => panic!("Wrong request: {other:?}"),
        }

        let request: Request =
            serde_json::from_str(r#"{"type": "import_memory", "project_path": "/p", "input": "/b.json"}"#).unwrap();
        assert!(matches!(
            request,
            Request::ImportMemory {
                strategy: MergeStrategy::Enhance,
                ..
            }
        ));
    }

    #[test]
    fn test_response_tags() {
        let json = serde_json::to_string(&Response::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);

        let json = serde_json::to_string(&Response::error("capacity", "full", true)).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""retriable":true"#));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"type": "explode"}"#).is_err());
    }
}
