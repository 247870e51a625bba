//! In-memory knowledge store.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::traits::{
    HandoffPackage, KnowledgeStore, MemoryExcerpt, PatternObservation, StorageError, TaskRecord,
};

#[derive(Default)]
struct Inner {
    tasks: Vec<TaskRecord>,
    patterns: Vec<PatternObservation>,
    handoffs: Vec<HandoffPackage>,
    notes: Vec<String>,
}

/// In-memory knowledge store.
///
/// Useful for development and tests. Data is lost on restart.
#[derive(Default)]
pub struct InMemoryKnowledge {
    inner: RwLock<Inner>,
}

impl InMemoryKnowledge {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a free-text note that `recall` can return.
    pub async fn add_note(&self, note: impl Into<String>) {
        self.inner.write().await.notes.push(note.into());
    }

    /// Recorded significant tasks.
    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.inner.read().await.tasks.clone()
    }

    /// Recorded pattern observations.
    pub async fn patterns(&self) -> Vec<PatternObservation> {
        self.inner.read().await.patterns.clone()
    }

    /// Handoff packages not yet taken.
    pub async fn pending_handoffs(&self) -> Vec<HandoffPackage> {
        self.inner.read().await.handoffs.clone()
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn overlap(query: &HashSet<String>, text: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let hits = tokens(text).intersection(query).count();
    hits as f64 / query.len() as f64
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledge {
    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryExcerpt>, StorageError> {
        let query = tokens(query);
        let inner = self.inner.read().await;

        let candidates = inner
            .notes
            .iter()
            .cloned()
            .chain(inner.tasks.iter().map(|t| format!("{}: {}", t.request, t.summary)));

        let mut excerpts: Vec<MemoryExcerpt> = candidates
            .filter_map(|text| {
                let score = overlap(&query, &text);
                (score > 0.0).then(|| MemoryExcerpt {
                    text,
                    source: "local".to_string(),
                    score,
                })
            })
            .collect();
        excerpts.sort_by(|a, b| b.score.total_cmp(&a.score));
        excerpts.truncate(limit);
        Ok(excerpts)
    }

    async fn record_task(&self, record: TaskRecord) -> Result<(), StorageError> {
        self.inner.write().await.tasks.push(record);
        Ok(())
    }

    async fn record_pattern(&self, observation: PatternObservation) -> Result<(), StorageError> {
        self.inner.write().await.patterns.push(observation);
        Ok(())
    }

    async fn save_handoff(&self, package: &HandoffPackage) -> Result<(), StorageError> {
        self.inner.write().await.handoffs.push(package.clone());
        Ok(())
    }

    async fn take_handoffs(&self, agent_id: &str) -> Result<Vec<HandoffPackage>, StorageError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.handoffs)
            .into_iter()
            .partition(|p| p.to_agent == agent_id);
        inner.handoffs = rest;
        Ok(mine.into_iter().filter(|p| !p.is_expired(now)).collect())
    }
}
