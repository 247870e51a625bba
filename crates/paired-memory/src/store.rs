//! File-backed project memory.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paired_core::{
    KnowledgeStore, StorageError, fs,
    traits::{HandoffPackage, MemoryExcerpt, PatternObservation, TaskRecord},
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    insights::{self, PatternInsight, SUCCESS_CONFIDENCE},
    paths::MemoryPaths,
    record::{Category, MemoryRecord},
    relevance,
};

/// Entries kept per list in `learnings.json`.
pub const MAX_LOG_ENTRIES: usize = 1000;
/// Examples kept per pattern aggregate.
pub const MAX_PATTERN_EXAMPLES: usize = 5;

/// Contents of `learnings.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningLog {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub observations: Vec<PatternObservation>,
}

fn cap<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        items.drain(..items.len() - max);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternExample {
    pub context: HashMap<String, String>,
    pub outcome: String,
    pub confidence: f64,
}

/// Running totals for one `<agent>_<pattern_type>` key in `patterns.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAggregate {
    pub count: u64,
    pub success_count: u64,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub examples: Vec<PatternExample>,
}

impl PatternAggregate {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.count as f64
        }
    }

    fn observe(&mut self, observation: &PatternObservation) {
        self.count += 1;
        self.last_updated = observation.timestamp;
        if observation.confidence > SUCCESS_CONFIDENCE {
            self.success_count += 1;
        }
        self.examples.push(PatternExample {
            context: observation.context.clone(),
            outcome: observation.outcome.clone(),
            confidence: observation.confidence,
        });
        cap(&mut self.examples, MAX_PATTERN_EXAMPLES);
    }
}

/// Aggregate key for an observation.
#[must_use]
pub fn pattern_key(agent_id: &str, pattern_type: &str) -> String {
    format!("{agent_id}_{pattern_type}")
}

/// Memory of one project, stored under `<project>/.paired/memory`.
///
/// Writes are serialized through an internal lock; reads go straight to disk.
pub struct ProjectMemory {
    paths: MemoryPaths,
    write_lock: Mutex<()>,
}

impl ProjectMemory {
    #[must_use]
    pub fn new(project: impl AsRef<Path>) -> Self {
        Self {
            paths: MemoryPaths::for_project(project),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn paths(&self) -> &MemoryPaths {
        &self.paths
    }

    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Project directory name.
    #[must_use]
    pub fn project_name(&self) -> String {
        self.paths
            .project
            .file_name()
            .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// # Errors
    /// Returns error if the file exists but cannot be read.
    pub async fn learning_log(&self) -> Result<LearningLog, StorageError> {
        fs::read_json_or_default(&self.paths.learnings).await
    }

    /// # Errors
    /// Returns error if the file exists but cannot be read.
    pub async fn pattern_aggregates(&self) -> Result<BTreeMap<String, PatternAggregate>, StorageError> {
        fs::read_json_or_default(&self.paths.patterns).await
    }

    /// Narrative insights, empty when absent.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read.
    pub async fn insights_text(&self) -> Result<String, StorageError> {
        match tokio::fs::read_to_string(&self.paths.insights).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a paragraph to `insights.md`.
    ///
    /// # Errors
    /// Returns error on I/O failure.
    pub async fn append_insight(&self, paragraph: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut text = self.insights_text().await?;
        if !text.is_empty() && !text.ends_with("\n\n") {
            text.push_str(if text.ends_with('\n') { "\n" } else { "\n\n" });
        }
        text.push_str(paragraph.trim());
        text.push('\n');
        fs::write_atomic(&self.paths.insights, text.as_bytes()).await
    }

    /// Recurring patterns among recorded observations.
    ///
    /// # Errors
    /// Returns error if the learning log cannot be read.
    pub async fn pattern_insights(&self) -> Result<Vec<PatternInsight>, StorageError> {
        Ok(insights::analyze(&self.learning_log().await?.observations))
    }

    /// Downloaded global records of one category.
    ///
    /// # Errors
    /// Returns error if the cache exists but cannot be read.
    pub async fn cached(&self, category: Category) -> Result<Vec<MemoryRecord>, StorageError> {
        fs::read_json_or_default(&self.paths.cache(category)).await
    }

    /// Replace the cache of one category.
    ///
    /// # Errors
    /// Returns error on I/O failure.
    pub async fn write_cache(&self, category: Category, records: &[MemoryRecord]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        fs::write_json_atomic(&self.paths.cache(category), records).await
    }

    /// Pending handoff packages for all agents, expired ones included.
    ///
    /// # Errors
    /// Returns error if the handoff directory cannot be listed.
    pub async fn pending_handoffs(&self) -> Result<Vec<HandoffPackage>, StorageError> {
        Ok(self
            .read_handoffs()
            .await?
            .into_iter()
            .map(|(_, package)| package)
            .collect())
    }

    async fn read_handoffs(&self) -> Result<Vec<(std::path::PathBuf, HandoffPackage)>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.paths.handoffs).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut packages = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match fs::read_json::<HandoffPackage>(&path).await {
                Ok(Some(package)) => packages.push((path, package)),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable handoff: {e}"),
            }
        }
        packages.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at));
        Ok(packages)
    }

    async fn collect_candidates(&self) -> Result<Vec<(String, String)>, StorageError> {
        let log = self.learning_log().await?;
        let mut candidates: Vec<(String, String)> = log
            .tasks
            .iter()
            .map(|t| (format!("{}: {}", t.request, t.summary), "local".to_string()))
            .collect();

        for paragraph in self.insights_text().await?.split("\n\n") {
            let paragraph = paragraph.trim();
            if !paragraph.is_empty() {
                candidates.push((paragraph.to_string(), "local:insights".to_string()));
            }
        }

        for category in Category::ALL {
            for record in self.cached(category).await? {
                candidates.push((record.content, format!("global:{}", category.collection())));
            }
        }
        Ok(candidates)
    }
}

#[async_trait]
impl KnowledgeStore for ProjectMemory {
    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryExcerpt>, StorageError> {
        let query = relevance::tokens(query);
        let mut excerpts: Vec<MemoryExcerpt> = self
            .collect_candidates()
            .await?
            .into_iter()
            .filter_map(|(text, source)| {
                let score = relevance::keyword_overlap(&query, &text);
                (score > 0.0).then_some(MemoryExcerpt { text, source, score })
            })
            .collect();
        excerpts.sort_by(|a, b| b.score.total_cmp(&a.score));
        excerpts.truncate(limit);
        Ok(excerpts)
    }

    async fn record_task(&self, record: TaskRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut log = self.learning_log().await?;
        tracing::debug!(task_id = %record.task_id, agent_id = %record.agent_id, "Recording task");
        log.tasks.push(record);
        cap(&mut log.tasks, MAX_LOG_ENTRIES);
        fs::write_json_atomic(&self.paths.learnings, &log).await
    }

    async fn record_pattern(&self, observation: PatternObservation) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut aggregates = self.pattern_aggregates().await?;
        aggregates
            .entry(pattern_key(&observation.agent_id, &observation.pattern_type))
            .or_insert_with(|| PatternAggregate {
                count: 0,
                success_count: 0,
                last_updated: observation.timestamp,
                examples: Vec::new(),
            })
            .observe(&observation);
        fs::write_json_atomic(&self.paths.patterns, &aggregates).await?;

        let mut log = self.learning_log().await?;
        log.observations.push(observation);
        cap(&mut log.observations, MAX_LOG_ENTRIES);
        fs::write_json_atomic(&self.paths.learnings, &log).await
    }

    async fn save_handoff(&self, package: &HandoffPackage) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        fs::write_json_atomic(&self.paths.handoff(&package.id), package).await?;
        tracing::debug!(package_id = %package.id, to_agent = %package.to_agent, "Saved handoff package");
        Ok(())
    }

    async fn take_handoffs(&self, agent_id: &str) -> Result<Vec<HandoffPackage>, StorageError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();

        let mut taken = Vec::new();
        for (path, package) in self.read_handoffs().await? {
            let expired = package.is_expired(now);
            if !expired && package.to_agent != agent_id {
                continue;
            }
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), "Failed to remove handoff: {e}");
            }
            if expired {
                tracing::debug!(package_id = %package.id, "Discarded expired handoff");
            } else {
                taken.push(package);
            }
        }
        Ok(taken)
    }
}
