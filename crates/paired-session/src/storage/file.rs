//! One-file-per-session snapshot storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use paired_core::{
    fs::{read_json, write_json_atomic},
    traits::{SessionSnapshot, SessionStorage, StorageError},
};

/// Directory-backed storage.
///
/// Directory structure:
/// ```text
/// sessions/
/// ├── <session-id-1>.json
/// └── <session-id-2>.json
/// ```
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        snapshot_file(&self.dir, id)
    }
}

/// `<dir>/<id>.json`, rejecting ids that would escape `dir`.
pub(crate) fn snapshot_file(dir: &Path, id: &str) -> Result<PathBuf, StorageError> {
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
        return Err(StorageError::Internal(format!("Invalid session id: {id}")));
    }
    Ok(dir.join(format!("{id}.json")))
}

#[async_trait]
impl SessionStorage for FileStorage {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let path = self.snapshot_path(&snapshot.id)?;
        write_json_atomic(&path, snapshot).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let path = self.snapshot_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_all(&self) -> Result<Vec<SessionSnapshot>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<SessionSnapshot>(&path).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable session snapshot: {e}");
                }
            }
        }

        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use paired_core::traits::SessionStatus;
    use tempfile::TempDir;

    use super::*;

    fn snapshot(id: &str) -> SessionSnapshot {
        let now = Utc::now();
        SessionSnapshot {
            id: id.to_string(),
            project_path: PathBuf::from("/proj/app"),
            client_id: "client".to_string(),
            created_at: now,
            last_activity: now,
            status: SessionStatus::Active,
            connections: vec![],
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("sessions"));

        storage.save(&snapshot("app-1-aaaaaa")).await.unwrap();
        storage.save(&snapshot("app-2-bbbbbb")).await.unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);

        assert!(storage.delete("app-1-aaaaaa").await.unwrap());
        assert!(!storage.delete("app-1-aaaaaa").await.unwrap());
        assert_eq!(storage.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_dir_loads_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("absent"));
        assert!(storage.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_skipped() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.save(&snapshot("good-1-cccccc")).await.unwrap();
        std::fs::write(dir.path().join("bad.json"), "garbage").unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "good-1-cccccc");
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.save(&snapshot("../escape")).await.is_err());
    }
}
