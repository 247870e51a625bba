//! Snapshot storage under each project's own state directory.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use paired_core::{
    PairedPaths,
    fs::{read_json, read_json_or_default, write_json_atomic},
    traits::{SessionSnapshot, SessionStorage, StorageError},
};
use tokio::sync::Mutex;

use super::file::snapshot_file;

/// Storage that writes each snapshot next to its project.
///
/// Directory structure:
/// ```text
/// <project>/.paired/sessions/
/// └── <session-id>.json
/// ```
///
/// A small index (session id to project path) lets `load_all` find every
/// project without scanning the filesystem.
pub struct ProjectStorage {
    index_path: PathBuf,
    index: Mutex<Option<BTreeMap<String, PathBuf>>>,
}

impl ProjectStorage {
    /// Create a storage whose index lives at `index_path`.
    #[must_use]
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            index: Mutex::new(None),
        }
    }

    /// Session directory of a project.
    #[must_use]
    pub fn sessions_dir(project: &Path) -> PathBuf {
        PairedPaths::project_dir(project).join("sessions")
    }

    async fn with_index<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, PathBuf>) -> (T, bool),
    ) -> Result<T, StorageError> {
        let mut guard = self.index.lock().await;
        if guard.is_none() {
            *guard = Some(read_json_or_default(&self.index_path).await?);
        }
        let Some(index) = guard.as_mut() else {
            return Err(StorageError::Internal("session index unavailable".to_string()));
        };
        let (value, changed) = f(index);
        if changed {
            write_json_atomic(&self.index_path, index).await?;
        }
        Ok(value)
    }
}

#[async_trait]
impl SessionStorage for ProjectStorage {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let path = snapshot_file(&Self::sessions_dir(&snapshot.project_path), &snapshot.id)?;
        write_json_atomic(&path, snapshot).await?;
        let project = snapshot.project_path.clone();
        self.with_index(|index| {
            let changed = index.get(&snapshot.id) != Some(&project);
            index.insert(snapshot.id.clone(), project);
            ((), changed)
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let Some(project) = self.with_index(|index| {
            let removed = index.remove(id);
            let changed = removed.is_some();
            (removed, changed)
        })
        .await?
        else {
            return Ok(false);
        };

        let path = snapshot_file(&Self::sessions_dir(&project), id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_all(&self) -> Result<Vec<SessionSnapshot>, StorageError> {
        let entries: Vec<(String, PathBuf)> = self
            .with_index(|index| (index.iter().map(|(k, v)| (k.clone(), v.clone())).collect(), false))
            .await?;

        let mut snapshots = Vec::new();
        let mut stale = Vec::new();
        for (id, project) in entries {
            let path = snapshot_file(&Self::sessions_dir(&project), &id)?;
            match read_json::<SessionSnapshot>(&path).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => stale.push(id),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable session snapshot: {e}");
                }
            }
        }

        if !stale.is_empty() {
            self.with_index(|index| {
                for id in &stale {
                    index.remove(id);
                }
                ((), true)
            })
            .await?;
        }

        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(snapshots)
    }
}
