//! Session manager: sessions per (project, client), connection sets and idle eviction.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use paired_core::{
    EventBus, LifecycleEvent, ScheduledTask, Scheduler,
    traits::{SessionId, SessionSnapshot, SessionStatus, SessionStorage},
};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{sync::RwLock, time::Instant};

use crate::config::SessionConfig;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid project path {}: {reason}", .path.display())]
    Validation { path: PathBuf, reason: String },
    #[error("Session capacity reached ({max} sessions)")]
    Capacity { max: usize },
    #[error("Session not found: {0}")]
    NotFound(SessionId),
}

impl SessionError {
    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Capacity { .. })
    }
}

/// A tracked session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Canonical project path.
    pub project_path: PathBuf,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: SessionStatus,
    pub connections: HashSet<String>,
    pub metadata: HashMap<String, Value>,
}

impl Session {
    /// Whether the session is live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Durable form of this session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut connections: Vec<String> = self.connections.iter().cloned().collect();
        connections.sort();
        SessionSnapshot {
            id: self.id.clone(),
            project_path: self.project_path.clone(),
            client_id: self.client_id.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            status: self.status,
            connections,
            metadata: self.metadata.clone(),
        }
    }
}

/// Aggregate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub active_projects: usize,
    pub total_connections: usize,
}

struct Entry {
    session: Session,
    /// Monotonic idle clock.
    touched: Instant,
    disconnected_at: Option<Instant>,
    cleanup: Option<ScheduledTask>,
}

impl Entry {
    fn new(session: Session) -> Self {
        Self {
            session,
            touched: Instant::now(),
            disconnected_at: None,
            cleanup: None,
        }
    }

    fn touch(&mut self) {
        self.touched = Instant::now();
        self.session.last_activity = Utc::now();
    }

    fn is_idle(&self, timeout: std::time::Duration) -> bool {
        self.session.connections.is_empty() && self.touched.elapsed() > timeout
    }

    fn grace_elapsed(&self, grace: std::time::Duration) -> bool {
        self.session.connections.is_empty()
            && self.disconnected_at.is_some_and(|at| at.elapsed() >= grace)
    }
}

#[derive(Default)]
struct State {
    sessions: HashMap<SessionId, Entry>,
    by_project: HashMap<PathBuf, HashSet<SessionId>>,
}

impl State {
    fn index(&mut self, entry: Entry) {
        self.by_project
            .entry(entry.session.project_path.clone())
            .or_default()
            .insert(entry.session.id.clone());
        self.sessions.insert(entry.session.id.clone(), entry);
    }

    fn unindex(&mut self, id: &str) -> Option<Entry> {
        let entry = self.sessions.remove(id)?;
        let path = &entry.session.project_path;
        if let Some(ids) = self.by_project.get_mut(path) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_project.remove(path);
            }
        }
        Some(entry)
    }
}

/// Tracks sessions per (project, client) with idle-based reclamation.
///
/// All bookkeeping lives behind one lock; storage I/O and event emission
/// happen after it is released.
pub struct SessionManager {
    config: SessionConfig,
    storage: Arc<dyn SessionStorage>,
    events: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    sweep: Mutex<Option<ScheduledTask>>,
    state: RwLock<State>,
}

impl SessionManager {
    /// Create a new session manager.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        storage: Arc<dyn SessionStorage>,
        events: Arc<EventBus>,
        scheduler: Arc<Scheduler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            storage,
            events,
            scheduler,
            sweep: Mutex::new(None),
            state: RwLock::new(State::default()),
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a session for `client_id` on the project at `project_path`.
    ///
    /// # Errors
    /// Returns `Validation` if the path is not an existing directory or the
    /// client id is empty, `Capacity` if the session cap is reached.
    pub async fn create_session(
        &self,
        project_path: impl AsRef<Path>,
        client_id: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<Session, SessionError> {
        let raw_path = project_path.as_ref();
        if client_id.trim().is_empty() {
            return Err(SessionError::Validation {
                path: raw_path.to_path_buf(),
                reason: "client id is empty".to_string(),
            });
        }
        let project_path = validate_project_path(raw_path).await?;

        let session = {
            let mut state = self.state.write().await;
            if state.sessions.len() >= self.config.max_sessions {
                tracing::warn!(max = self.config.max_sessions, "Session capacity reached");
                return Err(SessionError::Capacity {
                    max: self.config.max_sessions,
                });
            }

            let now = Utc::now();
            let id = loop {
                let candidate = generate_session_id(&project_path, now);
                if !state.sessions.contains_key(&candidate) {
                    break candidate;
                }
            };
            let session = Session {
                id,
                project_path,
                client_id: client_id.to_string(),
                created_at: now,
                last_activity: now,
                status: SessionStatus::Active,
                connections: HashSet::new(),
                metadata,
            };
            state.index(Entry::new(session.clone()));
            session
        };

        self.persist(&session).await;
        tracing::info!(
            session_id = %session.id,
            project = %session.project_path.display(),
            client_id,
            "Session created"
        );
        self.events.emit(LifecycleEvent::SessionCreated {
            session_id: session.id.clone(),
            project_path: session.project_path.clone(),
            client_id: session.client_id.clone(),
        });
        Ok(session)
    }

    /// Get a session by id.
    pub async fn get_session(&self, id: &str) -> Option<Session> {
        self.state
            .read()
            .await
            .sessions
            .get(id)
            .map(|e| e.session.clone())
    }

    /// Active sessions on a project, oldest first.
    pub async fn get_project_sessions(&self, project_path: impl AsRef<Path>) -> Vec<Session> {
        let key = canonical_or_raw(project_path.as_ref()).await;
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .by_project
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| state.sessions.get(id))
            .map(|e| &e.session)
            .filter(|s| s.is_active())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    /// Active session owned by `client_id` on a project, if any.
    pub async fn find_client_session(
        &self,
        project_path: impl AsRef<Path>,
        client_id: &str,
    ) -> Option<Session> {
        self.get_project_sessions(project_path)
            .await
            .into_iter()
            .find(|s| s.client_id == client_id)
    }

    /// Every tracked session, oldest first.
    pub async fn get_all_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .state
            .read()
            .await
            .sessions
            .values()
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    /// Reset the idle clock and persist the new activity time. Returns false
    /// for unknown sessions.
    pub async fn update_activity(&self, id: &str) -> bool {
        let touched = {
            let mut state = self.state.write().await;
            match state.sessions.get_mut(id) {
                Some(entry) if entry.session.is_active() => {
                    entry.touch();
                    Some(entry.session.clone())
                }
                _ => None,
            }
        };
        match touched {
            Some(session) => {
                self.persist(&session).await;
                true
            }
            None => false,
        }
    }

    /// Attach a connection. Cancels any pending deferred cleanup.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown or destroyed sessions.
    pub async fn add_connection(&self, id: &str, connection_id: &str) -> Result<Session, SessionError> {
        let session = {
            let mut state = self.state.write().await;
            let entry = state
                .sessions
                .get_mut(id)
                .filter(|e| e.session.is_active())
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            entry.session.connections.insert(connection_id.to_string());
            entry.touch();
            entry.disconnected_at = None;
            if let Some(pending) = entry.cleanup.take() {
                pending.cancel();
            }
            entry.session.clone()
        };

        self.persist(&session).await;
        tracing::debug!(session_id = id, connection_id, "Connection added");
        self.events.emit(LifecycleEvent::ConnectionAdded {
            session_id: id.to_string(),
            connection_id: connection_id.to_string(),
        });
        Ok(session)
    }

    /// Detach a connection. When the set empties, a deferred cleanup is
    /// scheduled after the disconnect grace period.
    ///
    /// Returns whether the connection was attached.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown or destroyed sessions.
    pub async fn remove_connection(self: &Arc<Self>, id: &str, connection_id: &str) -> Result<bool, SessionError> {
        let (removed, session) = {
            let mut state = self.state.write().await;
            let entry = state
                .sessions
                .get_mut(id)
                .filter(|e| e.session.is_active())
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            let removed = entry.session.connections.remove(connection_id);
            entry.touch();
            if removed && entry.session.connections.is_empty() {
                entry.disconnected_at = Some(Instant::now());
                let task = self.schedule_cleanup(id);
                if let Some(previous) = entry.cleanup.replace(task) {
                    previous.cancel();
                }
            }
            (removed, entry.session.clone())
        };

        if removed {
            self.persist(&session).await;
            tracing::debug!(session_id = id, connection_id, "Connection removed");
            self.events.emit(LifecycleEvent::ConnectionClosed {
                session_id: id.to_string(),
                connection_id: connection_id.to_string(),
            });
        }
        Ok(removed)
    }

    fn schedule_cleanup(self: &Arc<Self>, id: &str) -> ScheduledTask {
        let manager = Arc::downgrade(self);
        let id = id.to_string();
        self.scheduler.spawn_after(
            "session-deferred-cleanup",
            self.config.disconnect_grace,
            async move {
                if let Some(manager) = manager.upgrade() {
                    manager.deferred_cleanup(&id).await;
                }
            },
        )
    }

    /// Destroy if still connection-less at fire time.
    async fn deferred_cleanup(&self, id: &str) {
        let grace = self.config.disconnect_grace;
        if !self
            .destroy_where(id, "disconnected", |entry| entry.grace_elapsed(grace))
            .await
        {
            tracing::debug!(session_id = id, "Deferred cleanup skipped, session reconnected");
        }
    }

    /// Destroy a session. Idempotent: returns false for unknown ids.
    pub async fn destroy_session(&self, id: &str) -> bool {
        self.destroy_where(id, "explicit", |_| true).await
    }

    async fn destroy_where<F>(&self, id: &str, reason: &str, should_destroy: F) -> bool
    where
        F: Fn(&Entry) -> bool,
    {
        let session = {
            let mut state = self.state.write().await;
            if !state.sessions.get(id).is_some_and(&should_destroy) {
                return false;
            }
            let Some(mut entry) = state.unindex(id) else {
                return false;
            };
            if let Some(pending) = entry.cleanup.take() {
                pending.cancel();
            }
            entry.session.status = SessionStatus::Destroyed;
            entry.session
        };

        for connection_id in &session.connections {
            self.events.emit(LifecycleEvent::ConnectionClosed {
                session_id: session.id.clone(),
                connection_id: connection_id.clone(),
            });
        }
        if let Err(e) = self.storage.delete(&session.id).await {
            tracing::warn!(session_id = %session.id, "Failed to delete session snapshot: {e}");
        }

        tracing::info!(session_id = %session.id, reason, "Session destroyed");
        self.events.emit(LifecycleEvent::SessionDestroyed {
            session_id: session.id,
            project_path: session.project_path,
            reason: reason.to_string(),
        });
        true
    }

    /// Destroy every session with no connections idle past the session timeout.
    ///
    /// Returns the ids that were destroyed.
    pub async fn sweep_idle(&self) -> Vec<SessionId> {
        let timeout = self.config.session_timeout;
        let candidates: Vec<SessionId> = self
            .state
            .read()
            .await
            .sessions
            .values()
            .filter(|e| e.is_idle(timeout))
            .map(|e| e.session.id.clone())
            .collect();

        let mut swept = Vec::new();
        for id in candidates {
            // re-checked under the write lock in case of a late reconnect
            if self.destroy_where(&id, "idle timeout", |e| e.is_idle(timeout)).await {
                swept.push(id);
            }
        }
        if !swept.is_empty() {
            tracing::info!(count = swept.len(), "Idle sweep destroyed sessions");
        }
        swept
    }

    /// Start the periodic idle sweep on the shared scheduler.
    ///
    /// Calling it again replaces the previous sweep.
    pub fn start(self: &Arc<Self>) -> ScheduledTask {
        let manager = Arc::downgrade(self);
        let sweep = self.scheduler.spawn_interval(
            "session-idle-sweep",
            self.config.cleanup_interval,
            move || {
                let manager = manager.clone();
                async move {
                    if let Some(manager) = manager.upgrade() {
                        manager.sweep_idle().await;
                    }
                }
            },
        );
        let previous = self
            .sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(sweep.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        sweep
    }

    /// Stop the idle sweep and every pending deferred cleanup.
    ///
    /// Sessions stay in memory and on disk.
    pub async fn shutdown(&self) {
        if let Some(sweep) = self.sweep.lock().unwrap_or_else(PoisonError::into_inner).take() {
            sweep.cancel();
        }
        let mut state = self.state.write().await;
        let mut cancelled = 0;
        for entry in state.sessions.values_mut() {
            if let Some(pending) = entry.cleanup.take() {
                pending.cancel();
                cancelled += 1;
            }
        }
        tracing::debug!(cancelled, "Session manager shut down");
    }

    /// Reload persisted snapshots into memory.
    ///
    /// Restored sessions start with no connections and a fresh idle clock.
    /// Snapshots whose project directory vanished are discarded. Returns the
    /// number of sessions restored.
    pub async fn restore(&self) -> usize {
        let snapshots = match self.storage.load_all().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Failed to load session snapshots: {e}");
                return 0;
            }
        };

        let mut restored = 0;
        for snapshot in snapshots {
            if snapshot.status != SessionStatus::Active {
                continue;
            }
            let Ok(project_path) = validate_project_path(&snapshot.project_path).await else {
                tracing::debug!(session_id = %snapshot.id, "Discarding snapshot for missing project");
                if let Err(e) = self.storage.delete(&snapshot.id).await {
                    tracing::warn!(session_id = %snapshot.id, "Failed to delete stale snapshot: {e}");
                }
                continue;
            };

            let mut state = self.state.write().await;
            if state.sessions.len() >= self.config.max_sessions {
                tracing::warn!("Session capacity reached while restoring snapshots");
                break;
            }
            if state.sessions.contains_key(&snapshot.id) {
                continue;
            }
            state.index(Entry::new(Session {
                id: snapshot.id,
                project_path,
                client_id: snapshot.client_id,
                created_at: snapshot.created_at,
                last_activity: snapshot.last_activity,
                status: SessionStatus::Active,
                connections: HashSet::new(),
                metadata: snapshot.metadata,
            }));
            restored += 1;
        }

        if restored > 0 {
            tracing::info!(restored, "Restored persisted sessions");
        }
        restored
    }

    /// Aggregate counts.
    pub async fn stats(&self) -> SessionStats {
        let state = self.state.read().await;
        SessionStats {
            total_sessions: state.sessions.len(),
            active_projects: state.by_project.len(),
            total_connections: state.sessions.values().map(|e| e.session.connections.len()).sum(),
        }
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.storage.save(&session.snapshot()).await {
            tracing::warn!(session_id = %session.id, "Failed to persist session snapshot: {e}");
        }
    }
}

async fn validate_project_path(path: &Path) -> Result<PathBuf, SessionError> {
    let invalid = |reason: String| SessionError::Validation {
        path: path.to_path_buf(),
        reason,
    };
    if path.as_os_str().is_empty() {
        return Err(invalid("path is empty".to_string()));
    }
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| invalid(format!("cannot access: {e}")))?;
    if !meta.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    tokio::fs::canonicalize(path)
        .await
        .map_err(|e| invalid(format!("cannot canonicalize: {e}")))
}

async fn canonical_or_raw(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

fn generate_session_id(project: &Path, now: DateTime<Utc>) -> SessionId {
    let name: String = project
        .file_name()
        .map(|n| {
            n.to_string_lossy()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
                .collect::<String>()
        })
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "project".to_string());
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{name}-{}-{suffix}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::storage::MemoryStorage;

    struct Fixture {
        manager: Arc<SessionManager>,
        storage: Arc<MemoryStorage>,
        events: Arc<EventBus>,
        project: TempDir,
    }

    fn fixture(config: SessionConfig) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let events = Arc::new(EventBus::new());
        let manager = SessionManager::new(
            config,
            Arc::clone(&storage) as Arc<dyn SessionStorage>,
            Arc::clone(&events),
            Arc::new(Scheduler::new()),
        );
        Fixture {
            manager,
            storage,
            events,
            project: TempDir::new().unwrap(),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_create_then_lookup_by_project() {
        let fx = fixture(SessionConfig::default());
        let session = fx
            .manager
            .create_session(fx.project.path(), "cli", HashMap::new())
            .await
            .unwrap();

        assert!(session.is_active());
        let sessions = fx.manager.get_project_sessions(fx.project.path()).await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session.id);
        assert_eq!(fx.storage.len(), 1);
        assert!(
            fx.events
                .history()
                .iter()
                .any(|e| e.name() == "sessionCreated")
        );
    }

    #[tokio::test]
    async fn test_multiple_clients_share_project() {
        let fx = fixture(SessionConfig::default());
        let a = fx.manager.create_session(fx.project.path(), "ide", HashMap::new()).await.unwrap();
        let b = fx.manager.create_session(fx.project.path(), "cli", HashMap::new()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(fx.manager.get_project_sessions(fx.project.path()).await.len(), 2);

        let found = fx.manager.find_client_session(fx.project.path(), "cli").await.unwrap();
        assert_eq!(found.id, b.id);

        assert!(fx.manager.destroy_session(&a.id).await);
        let remaining = fx.manager.get_project_sessions(fx.project.path()).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
        assert_eq!(fx.manager.stats().await.active_projects, 1);
    }

    #[tokio::test]
    async fn test_rejects_missing_and_non_directory_paths() {
        let fx = fixture(SessionConfig::default());
        let missing = fx.project.path().join("does-not-exist");
        let err = fx.manager.create_session(&missing, "cli", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation { .. }));
        assert!(!err.is_retriable());

        let file = fx.project.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let err = fx.manager.create_session(&file, "cli", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation { .. }));

        let err = fx.manager.create_session(fx.project.path(), " ", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation { .. }));
        assert!(fx.manager.get_all_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_error_does_not_mutate_state() {
        let fx = fixture(SessionConfig {
            max_sessions: 2,
            ..SessionConfig::default()
        });
        for client in ["a", "b"] {
            fx.manager.create_session(fx.project.path(), client, HashMap::new()).await.unwrap();
        }
        let events_before = fx.events.history().len();

        let err = fx.manager.create_session(fx.project.path(), "c", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::Capacity { max: 2 }));
        assert!(err.is_retriable());
        assert_eq!(fx.manager.get_all_sessions().await.len(), 2);
        assert_eq!(fx.storage.len(), 2);
        assert_eq!(fx.events.history().len(), events_before);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let fx = fixture(SessionConfig::default());
        let session = fx.manager.create_session(fx.project.path(), "cli", HashMap::new()).await.unwrap();
        fx.manager.add_connection(&session.id, "c1").await.unwrap();

        assert!(fx.manager.destroy_session(&session.id).await);
        assert!(!fx.manager.destroy_session(&session.id).await);
        assert!(fx.manager.get_session(&session.id).await.is_none());
        assert!(fx.manager.get_project_sessions(fx.project.path()).await.is_empty());
        assert!(fx.storage.is_empty());

        let names: Vec<&str> = fx.events.history().iter().map(LifecycleEvent::name).collect();
        assert!(names.contains(&"connectionClosed"));
        assert!(names.contains(&"sessionDestroyed"));
        assert!(!fx.manager.destroy_session("unknown").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_within_grace_keeps_session() {
        let fx = fixture(SessionConfig::default());
        let session = fx.manager.create_session(fx.project.path(), "cli", HashMap::new()).await.unwrap();

        fx.manager.add_connection(&session.id, "c1").await.unwrap();
        assert!(fx.manager.remove_connection(&session.id, "c1").await.unwrap());
        fx.manager.add_connection(&session.id, "c2").await.unwrap();

        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        settle().await;

        let current = fx.manager.get_session(&session.id).await.unwrap();
        assert!(current.is_active());
        assert!(current.connections.contains("c2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_without_reconnect_is_cleaned_up() {
        let fx = fixture(SessionConfig::default());
        let session = fx.manager.create_session(fx.project.path(), "cli", HashMap::new()).await.unwrap();

        fx.manager.add_connection(&session.id, "c1").await.unwrap();
        fx.manager.remove_connection(&session.id, "c1").await.unwrap();

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        settle().await;
        assert!(fx.manager.get_session(&session.id).await.is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        settle().await;
        assert!(fx.manager.get_session(&session.id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_only_destroys_idle_connectionless_sessions() {
        let fx = fixture(SessionConfig {
            session_timeout: Duration::from_secs(60),
            ..SessionConfig::default()
        });
        let idle = fx.manager.create_session(fx.project.path(), "idle", HashMap::new()).await.unwrap();
        let busy = fx.manager.create_session(fx.project.path(), "busy", HashMap::new()).await.unwrap();
        let fresh = fx.manager.create_session(fx.project.path(), "fresh", HashMap::new()).await.unwrap();
        fx.manager.add_connection(&busy.id, "ws-1").await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(fx.manager.update_activity(&fresh.id).await);
        tokio::time::advance(Duration::from_secs(20)).await;

        let swept = fx.manager.sweep_idle().await;
        assert_eq!(swept, vec![idle.id.clone()]);
        assert!(fx.manager.get_session(&busy.id).await.is_some());
        assert!(fx.manager.get_session(&fresh.id).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_runs_on_interval() {
        let fx = fixture(SessionConfig {
            session_timeout: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(30),
            ..SessionConfig::default()
        });
        let session = fx.manager.create_session(fx.project.path(), "cli", HashMap::new()).await.unwrap();
        let sweep = fx.manager.start();

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(30)).await;
            settle().await;
        }
        assert!(fx.manager.get_session(&session.id).await.is_none());
        sweep.cancel();
    }

    #[tokio::test]
    async fn test_activity_is_persisted() {
        let fx = fixture(SessionConfig::default());
        let session = fx.manager.create_session(fx.project.path(), "cli", HashMap::new()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(fx.manager.update_activity(&session.id).await);
        assert!(!fx.manager.update_activity("unknown").await);

        let live = fx.manager.get_session(&session.id).await.unwrap();
        let stored = fx.storage.load_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].last_activity, live.last_activity);
        assert!(stored[0].last_activity > session.last_activity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_sweep_and_pending_cleanup() {
        let fx = fixture(SessionConfig {
            session_timeout: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(30),
            ..SessionConfig::default()
        });
        let session = fx.manager.create_session(fx.project.path(), "cli", HashMap::new()).await.unwrap();
        let sweep = fx.manager.start();
        fx.manager.add_connection(&session.id, "c1").await.unwrap();
        fx.manager.remove_connection(&session.id, "c1").await.unwrap();

        fx.manager.shutdown().await;
        assert!(sweep.is_cancelled());

        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        settle().await;
        assert!(fx.manager.get_session(&session.id).await.is_some());
    }

    #[tokio::test]
    async fn test_restore_from_storage() {
        let fx = fixture(SessionConfig::default());
        let session = fx.manager.create_session(fx.project.path(), "cli", HashMap::new()).await.unwrap();
        fx.manager.add_connection(&session.id, "c1").await.unwrap();

        let events = Arc::new(EventBus::new());
        let restarted = SessionManager::new(
            SessionConfig::default(),
            Arc::clone(&fx.storage) as Arc<dyn SessionStorage>,
            events,
            Arc::new(Scheduler::new()),
        );
        assert_eq!(restarted.restore().await, 1);

        let restored = restarted.get_session(&session.id).await.unwrap();
        assert!(restored.connections.is_empty());
        assert_eq!(restored.client_id, "cli");
        assert_eq!(restarted.get_project_sessions(fx.project.path()).await.len(), 1);
    }

    #[test]
    fn test_generated_ids_embed_project_name() {
        let now = Utc::now();
        let a = generate_session_id(Path::new("/work/My App"), now);
        let b = generate_session_id(Path::new("/work/My App"), now);
        assert!(a.starts_with("my-app-"));
        assert_ne!(a, b);
    }
}
