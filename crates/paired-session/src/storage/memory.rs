//! In-memory snapshot storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use paired_core::traits::{SessionSnapshot, SessionStorage, StorageError};

/// In-memory storage implementation.
///
/// Useful for development and tests.
/// Data is lost on restart.
#[derive(Default)]
pub struct MemoryStorage {
    snapshots: RwLock<HashMap<String, SessionSnapshot>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.read().map_or(0, |s| s.len())
    }

    /// Whether no snapshots are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        self.snapshots
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self
            .snapshots
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .remove(id)
            .is_some())
    }

    async fn load_all(&self) -> Result<Vec<SessionSnapshot>, StorageError> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let mut result: Vec<SessionSnapshot> = snapshots.values().cloned().collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }
}
