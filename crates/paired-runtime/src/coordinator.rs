//! The coordinator owns every registry and timer of one daemon.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use paired_agents::{
    AgentFactory, BehaviorTable, InitOutcome, InitStatus, RegistryError, RouteDecision, TaskReport,
};
use paired_core::{EventBus, Scheduler, TaskContext};
use paired_memory::{
    ContextDetector, ManifestDetector, ProjectMemory, SyncEngine, SyncError,
};
use paired_session::{Session, SessionError, SessionManager, storage::ProjectStorage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::{
    config::PairedConfig,
    protocol::{AgentSummary, Request, Response},
};

/// Coordinator error.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("No agent matches the task")]
    NoRoute,
}

impl CoordinatorError {
    /// Short machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Session(SessionError::Validation { .. }) | Self::Registry(RegistryError::Validation { .. }) => {
                "validation"
            }
            Self::Session(SessionError::Capacity { .. }) => "capacity",
            Self::Session(SessionError::NotFound(_)) | Self::Registry(RegistryError::NotFound(_)) => "not_found",
            Self::Registry(_) => "registry",
            Self::Sync(_) => "sync",
            Self::NoRoute => "no_route",
        }
    }

    /// Whether the same request may succeed later.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Session(e) => e.is_retriable(),
            Self::Sync(_) => true,
            Self::Registry(_) | Self::NoRoute => false,
        }
    }
}

impl From<&CoordinatorError> for Response {
    fn from(e: &CoordinatorError) -> Self {
        Self::error(e.kind(), e.to_string(), e.is_retriable())
    }
}

/// What `start` found and brought up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReport {
    pub restored_sessions: usize,
    pub definitions: usize,
    pub agents: Vec<InitOutcome>,
}

impl StartReport {
    /// Agents that came up.
    #[must_use]
    pub fn ready(&self) -> usize {
        self.agents.iter().filter(|o| o.status == InitStatus::Success).count()
    }
}

/// A task as submitted by a client.
#[derive(Debug, Clone, Default)]
pub struct TaskSubmission {
    pub project_path: PathBuf,
    pub client_id: String,
    pub description: String,
    pub agent_id: Option<String>,
    pub attachments: Vec<String>,
    pub tags: Vec<String>,
    pub environment: Option<String>,
}

/// Result of a submitted task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub session_id: String,
    pub route: Option<RouteDecision>,
    pub report: TaskReport,
    pub followup: Option<TaskReport>,
}

/// Ties sessions, agents and project memory together.
///
/// Passed around by `Arc`; there is no global instance.
pub struct Coordinator {
    config: PairedConfig,
    events: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    sessions: Arc<SessionManager>,
    agents: AgentFactory,
    detector: Arc<dyn ContextDetector>,
    projects: RwLock<HashMap<PathBuf, Arc<SyncEngine>>>,
    global_lock: Arc<Mutex<()>>,
}

impl Coordinator {
    /// Build a coordinator. Nothing runs until `start`.
    #[must_use]
    pub fn new(config: PairedConfig) -> Arc<Self> {
        Self::with_behaviors(config, BehaviorTable::default())
    }

    /// Build a coordinator with a custom behavior table.
    #[must_use]
    pub fn with_behaviors(config: PairedConfig, behaviors: BehaviorTable) -> Arc<Self> {
        let events = Arc::new(EventBus::new());
        let scheduler = Arc::new(Scheduler::new());
        let storage = Arc::new(ProjectStorage::new(config.home.join("sessions.json")));
        let sessions = SessionManager::new(
            config.session.clone(),
            storage,
            Arc::clone(&events),
            Arc::clone(&scheduler),
        );
        let agents = AgentFactory::new(behaviors, config.runtime.clone(), Arc::clone(&events));

        Arc::new(Self {
            config,
            events,
            scheduler,
            sessions,
            agents,
            detector: Arc::new(ManifestDetector),
            projects: RwLock::new(HashMap::new()),
            global_lock: Arc::new(Mutex::new(())),
        })
    }

    #[must_use]
    pub const fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    #[must_use]
    pub const fn agents(&self) -> &AgentFactory {
        &self.agents
    }

    #[must_use]
    pub const fn config(&self) -> &PairedConfig {
        &self.config
    }

    /// Restore sessions, start the idle sweep, load and instantiate agents.
    ///
    /// A missing agents directory leaves the roster empty.
    ///
    /// # Errors
    /// Returns the descriptor load error; individual agent failures are
    /// reported in the outcome list instead.
    pub async fn start(&self) -> Result<StartReport, CoordinatorError> {
        let restored_sessions = self.sessions.restore().await;
        self.sessions.start();

        let agents_dir = self.config.paths().agents_dir;
        let definitions = if tokio::fs::try_exists(&agents_dir).await.unwrap_or(false) {
            self.agents.load_definitions(&agents_dir).await?
        } else {
            tracing::warn!(dir = %agents_dir.display(), "Agents directory not found, starting with no agents");
            0
        };
        let agents = self.agents.initialize_all().await;

        let report = StartReport {
            restored_sessions,
            definitions,
            agents,
        };
        tracing::info!(
            restored_sessions,
            definitions,
            ready = report.ready(),
            "Coordinator started"
        );
        Ok(report)
    }

    /// Cancel all timers, then stop every agent. Idempotent.
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
        self.scheduler.shutdown().await;
        let stopped = self.agents.shutdown_all().await;
        tracing::info!(stopped, "Coordinator shut down");
    }

    /// Sync engine of a project, created on first use.
    ///
    /// # Errors
    /// Returns `Validation` if the path is not a directory.
    pub async fn project(&self, project_path: &Path) -> Result<Arc<SyncEngine>, CoordinatorError> {
        let canonical = tokio::fs::canonicalize(project_path)
            .await
            .map_err(|e| SessionError::Validation {
                path: project_path.to_path_buf(),
                reason: format!("cannot canonicalize: {e}"),
            })?;
        self.project_engine(&canonical).await
    }

    async fn project_engine(&self, canonical: &Path) -> Result<Arc<SyncEngine>, CoordinatorError> {
        if let Some(engine) = self.projects.read().await.get(canonical) {
            return Ok(Arc::clone(engine));
        }

        let mut projects = self.projects.write().await;
        if let Some(engine) = projects.get(canonical) {
            return Ok(Arc::clone(engine));
        }
        let engine = Arc::new(
            SyncEngine::new(
                Arc::new(ProjectMemory::new(canonical)),
                self.config.paths().global_store,
                self.config.sync.clone(),
                Arc::clone(&self.events),
            )?
            .with_detector(Arc::clone(&self.detector))
            .with_global_lock(Arc::clone(&self.global_lock)),
        );
        engine.start_auto_sync(&self.scheduler);
        projects.insert(canonical.to_path_buf(), Arc::clone(&engine));
        tracing::debug!(project = %canonical.display(), "Project memory opened");
        Ok(engine)
    }

    /// Resolve the client's active session on a project, creating one if needed.
    ///
    /// # Errors
    /// Returns `Validation` or `Capacity` from session creation.
    pub async fn resolve_session(
        &self,
        project_path: &Path,
        client_id: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Session, CoordinatorError> {
        if let Some(session) = self.sessions.find_client_session(project_path, client_id).await {
            self.sessions.update_activity(&session.id).await;
            return Ok(session);
        }
        Ok(self.sessions.create_session(project_path, client_id, metadata).await?)
    }

    /// Route and run a task on behalf of a client.
    ///
    /// When the chosen agent hands the task off, the receiving agent runs
    /// it once more with the package.
    ///
    /// # Errors
    /// Returns session errors, `NotFound` for an unknown named agent and
    /// `NoRoute` when no agent matches.
    pub async fn run_task(&self, submission: TaskSubmission) -> Result<TaskResult, CoordinatorError> {
        let session = self
            .resolve_session(&submission.project_path, &submission.client_id, HashMap::new())
            .await?;
        let engine = self.project_engine(&session.project_path).await?;

        let mut context = TaskContext::for_project(&session.project_path);
        context.session_id = Some(session.id.clone());
        context.attachments = submission.attachments;
        context.tags = submission.tags;
        context.environment = submission.environment;

        let (agent_id, route) = match submission.agent_id {
            Some(id) => (id, None),
            None => {
                let decision = self
                    .agents
                    .route(&submission.description, &context)
                    .await
                    .ok_or(CoordinatorError::NoRoute)?;
                (decision.agent_id.clone(), Some(decision))
            }
        };
        let agent = self
            .agents
            .instance(&agent_id)
            .await
            .ok_or_else(|| RegistryError::NotFound(agent_id.clone()))?;

        let memory = engine.memory().as_ref();
        let report = agent.execute(&submission.description, context.clone(), memory).await;

        let followup = match report.handoff_target() {
            Some(target) => match self.agents.instance(target).await {
                Some(receiver) => Some(receiver.execute(&submission.description, context, memory).await),
                None => {
                    tracing::warn!(target, "Handoff target is not running, package left pending");
                    None
                }
            },
            None => None,
        };

        self.sessions.update_activity(&session.id).await;
        Ok(TaskResult {
            session_id: session.id,
            route,
            report,
            followup,
        })
    }

    /// Per-agent status and counters in load order.
    pub async fn agent_summaries(&self) -> Vec<AgentSummary> {
        let mut summaries = Vec::new();
        for instance in self.agents.list_instances().await {
            summaries.push(AgentSummary {
                agent_id: instance.id().to_string(),
                behavior: instance.behavior_name().to_string(),
                status: instance.status().await,
                stats: instance.stats().await,
            });
        }
        summaries
    }

    /// Serve one protocol request. Failures become `Response::Error`.
    pub async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(kind = e.kind(), "Request failed: {e}");
                Response::from(&e)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response, CoordinatorError> {
        Ok(match request {
            Request::Connect {
                project_path,
                client_id,
                connection_id,
                metadata,
            } => {
                let mut session = self.resolve_session(&project_path, &client_id, metadata).await?;
                if let Some(connection_id) = connection_id {
                    session = self.sessions.add_connection(&session.id, &connection_id).await?;
                }
                Response::Connected { session }
            }
            Request::Disconnect {
                session_id,
                connection_id,
            } => {
                let removed = self.sessions.remove_connection(&session_id, &connection_id).await?;
                Response::Disconnected { session_id, removed }
            }
            Request::Task {
                project_path,
                client_id,
                description,
                agent_id,
                attachments,
                tags,
                environment,
            } => {
                let result = self
                    .run_task(TaskSubmission {
                        project_path,
                        client_id,
                        description,
                        agent_id,
                        attachments,
                        tags,
                        environment,
                    })
                    .await?;
                Response::TaskResult {
                    session_id: result.session_id,
                    route: result.route,
                    report: result.report,
                    followup: result.followup,
                }
            }
            Request::Route { description, tags } => {
                let context = TaskContext {
                    tags,
                    ..TaskContext::default()
                };
                Response::Routed {
                    decision: self.agents.route(&description, &context).await,
                }
            }
            Request::Sync { project_path } => {
                let manifest = self.project(&project_path).await?.full_sync().await?;
                Response::Synced { manifest }
            }
            Request::Recommendations {
                project_path,
                context,
                agent_id,
                limit,
            } => {
                let items = self
                    .project(&project_path)
                    .await?
                    .get_recommendations(&context, agent_id.as_deref(), limit)
                    .await?;
                Response::Recommendations { items }
            }
            Request::ExportMemory {
                project_path,
                output,
                include_private,
            } => {
                let report = self
                    .project(&project_path)
                    .await?
                    .export_memory(&output, include_private)
                    .await?;
                Response::Exported { report }
            }
            Request::ImportMemory {
                project_path,
                input,
                strategy,
            } => {
                let report = self
                    .project(&project_path)
                    .await?
                    .import_memory(&input, strategy)
                    .await?;
                Response::Imported { report }
            }
            Request::ReloadAgent { agent_id } => {
                self.agents.reload(&agent_id).await?;
                Response::AgentReloaded { agent_id }
            }
            Request::Stats => Response::Stats {
                sessions: self.sessions.stats().await,
                agents: self.agent_summaries().await,
            },
            Request::Ping => Response::Pong,
        })
    }
}
