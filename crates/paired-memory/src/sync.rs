//! Privacy-aware sync between project memory and the global store.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use paired_core::{EventBus, LifecycleEvent, ScheduledTask, Scheduler, StorageError, fs};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    anonymize::{Anonymizer, PrivacyLevel},
    bundle::{self, ExportReport, ImportReport, MemoryBundle, MergeStrategy},
    config::SyncConfig,
    context::{ContextDetector, ManifestDetector, ProjectContext},
    error::{SyncError, SyncPhase},
    paths::MemoryPaths,
    record::{Category, GlobalStore, MemoryRecord, SyncManifest},
    relevance,
    store::ProjectMemory,
};

/// Cumulative sync counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_syncs: u64,
    pub uploaded: u64,
    pub downloaded: u64,
    pub conflicts: u64,
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Contents of `sync_history.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistory {
    #[serde(default)]
    pub manifests: Vec<SyncManifest>,
    #[serde(default)]
    pub stats: SyncStats,
}

/// A cached global item matched against a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub text: String,
    pub confidence: f64,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

fn item_text(record: &MemoryRecord) -> String {
    if record.tags.is_empty() {
        record.content.clone()
    } else {
        format!("{} {}", record.content, record.tags.join(" "))
    }
}

/// Memory files included in exports, relative to the memory root.
fn exportable(paths: &MemoryPaths) -> Vec<PathBuf> {
    let mut files = vec![
        paths.learnings.clone(),
        paths.patterns.clone(),
        paths.insights.clone(),
        paths.sync_history.clone(),
    ];
    files.extend(Category::ALL.map(|c| paths.cache(c)));
    files
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Sync engine for one project.
///
/// Runs are serialized; the global store is guarded by a lock that can be
/// shared between engines of the same process.
pub struct SyncEngine {
    memory: Arc<ProjectMemory>,
    global_store: PathBuf,
    config: SyncConfig,
    events: Arc<EventBus>,
    detector: Arc<dyn ContextDetector>,
    anonymizer: Anonymizer,
    running: Mutex<()>,
    global_lock: Arc<Mutex<()>>,
}

impl SyncEngine {
    /// Create an engine using the manifest-based context detector.
    ///
    /// # Errors
    /// Returns an error if redaction patterns fail to compile.
    pub fn new(
        memory: Arc<ProjectMemory>,
        global_store: impl Into<PathBuf>,
        config: SyncConfig,
        events: Arc<EventBus>,
    ) -> Result<Self, SyncError> {
        let anonymizer = Anonymizer::new(config.privacy, &[memory.project_name()])?;
        Ok(Self {
            memory,
            global_store: global_store.into(),
            config,
            events,
            detector: Arc::new(ManifestDetector),
            anonymizer,
            running: Mutex::new(()),
            global_lock: Arc::new(Mutex::new(())),
        })
    }

    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn ContextDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Share the global store lock with other engines.
    #[must_use]
    pub fn with_global_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.global_lock = lock;
        self
    }

    #[must_use]
    pub const fn memory(&self) -> &Arc<ProjectMemory> {
        &self.memory
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Inferred context of the project.
    pub async fn context(&self) -> ProjectContext {
        self.detector.detect(&self.memory.paths().project).await
    }

    /// Run upload, download, conflict resolution and bookkeeping in order.
    ///
    /// A failing phase aborts the remaining data phases; the run is still
    /// recorded in the history with `success = false`.
    ///
    /// # Errors
    /// Returns the error of the failing phase.
    pub async fn full_sync(&self) -> Result<SyncManifest, SyncError> {
        let _running = self.running.lock().await;
        let id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(manifest_id = %id, project = %self.memory.paths().project.display(), "Sync started");

        let outcome = self.run_phases().await;
        let (uploaded, downloaded, conflicts) = outcome.as_ref().map_or((0, 0, 0), |counts| *counts);
        let manifest = SyncManifest {
            id,
            started_at,
            finished_at: Utc::now(),
            uploaded,
            downloaded,
            conflicts,
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(ToString::to_string),
        };

        let bookkeeping = self
            .record(&manifest)
            .await
            .map_err(SyncError::phase(SyncPhase::Bookkeeping));

        match outcome.and(bookkeeping) {
            Ok(()) => {
                tracing::info!(manifest_id = %manifest.id, uploaded, downloaded, "Sync completed");
                self.events.emit(LifecycleEvent::SyncCompleted {
                    manifest_id: manifest.id.clone(),
                    uploaded,
                    downloaded,
                });
                Ok(manifest)
            }
            Err(e) => {
                tracing::warn!(manifest_id = %manifest.id, "Sync failed: {e}");
                self.events.emit(LifecycleEvent::SyncFailed {
                    manifest_id: manifest.id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_phases(&self) -> Result<(usize, usize, usize), SyncError> {
        let context = self.context().await;
        let uploaded = self.upload(&context).await?;
        let downloaded = self.download(&context).await?;
        let conflicts = Self::resolve_conflicts();
        Ok((uploaded, downloaded, conflicts))
    }

    fn shareable(&self, content: &str) -> Option<String> {
        let content = self.anonymizer.anonymize(content.trim());
        (!content.is_empty() && content.len() >= self.config.min_content_len).then_some(content)
    }

    async fn collect_uploads(&self, context: &ProjectContext) -> Result<Vec<MemoryRecord>, StorageError> {
        let origin = self.anonymizer.origin(&context.name);
        let tags: Vec<String> = context.keywords().into_iter().collect();
        let mut records = Vec::new();

        let log = self.memory.learning_log().await?;
        for task in log.tasks.iter().filter(|t| t.success) {
            if let Some(content) = self.shareable(&format!("{} -> {}", task.request, task.summary)) {
                let mut task_tags = tags.clone();
                task_tags.push(task.strategy.clone());
                records.push(
                    MemoryRecord::new(content, Category::Learning, &origin)
                        .with_agent(&task.agent_id)
                        .with_tags(task_tags),
                );
            }
        }

        for insight in crate::insights::analyze(&log.observations) {
            if let Some(content) = self.shareable(&insight.summary()) {
                let mut record = MemoryRecord::new(content, Category::Pattern, &origin).with_tags(tags.clone());
                if let [agent] = insight.agents.as_slice() {
                    record = record.with_agent(agent);
                }
                records.push(record);
            }
        }

        for paragraph in self.memory.insights_text().await?.split("\n\n") {
            if let Some(content) = self.shareable(paragraph) {
                records.push(MemoryRecord::new(content, Category::Insight, &origin).with_tags(tags.clone()));
            }
        }
        Ok(records)
    }

    async fn read_global(&self) -> Result<GlobalStore, StorageError> {
        Ok(fs::read_json(&self.global_store).await?.unwrap_or_default())
    }

    async fn upload(&self, context: &ProjectContext) -> Result<usize, SyncError> {
        let records = self
            .collect_uploads(context)
            .await
            .map_err(SyncError::phase(SyncPhase::Upload))?;

        let _global = self.global_lock.lock().await;
        let mut store = self
            .read_global()
            .await
            .map_err(SyncError::phase(SyncPhase::Upload))?;
        let added = store.merge(records);
        if added > 0 {
            fs::write_json_atomic(&self.global_store, &store)
                .await
                .map_err(SyncError::phase(SyncPhase::Upload))?;
        }
        tracing::debug!(added, "Upload phase finished");
        Ok(added)
    }

    async fn download(&self, context: &ProjectContext) -> Result<usize, SyncError> {
        let store = {
            let _global = self.global_lock.lock().await;
            self.read_global()
                .await
                .map_err(SyncError::phase(SyncPhase::Download))?
        };

        let keywords = context.keywords();
        let mut downloaded = 0;
        for category in Category::ALL {
            let relevant: Vec<MemoryRecord> = store
                .collection(category)
                .iter()
                .filter(|r| relevance::keyword_overlap(&keywords, &item_text(r)) >= self.config.quality_threshold)
                .cloned()
                .collect();
            downloaded += relevant.len();
            self.memory
                .write_cache(category, &relevant)
                .await
                .map_err(SyncError::phase(SyncPhase::Download))?;
        }
        tracing::debug!(downloaded, keywords = keywords.len(), "Download phase finished");
        Ok(downloaded)
    }

    /// Conflict resolution hook. Nothing conflicts yet: uploads are
    /// deduplicated by content hash and caches are replaced wholesale.
    const fn resolve_conflicts() -> usize {
        0
    }

    async fn record(&self, manifest: &SyncManifest) -> Result<(), StorageError> {
        let mut history = self.history().await?;
        let stats = &mut history.stats;
        stats.total_syncs += 1;
        stats.uploaded += manifest.uploaded as u64;
        stats.downloaded += manifest.downloaded as u64;
        stats.conflicts += manifest.conflicts as u64;
        if !manifest.success {
            stats.errors += 1;
        }
        stats.last_sync = Some(manifest.finished_at);

        history.manifests.push(manifest.clone());
        let excess = history.manifests.len().saturating_sub(self.config.manifest_cap);
        history.manifests.drain(..excess);

        let _guard = self.memory.lock_writes().await;
        fs::write_json_atomic(&self.memory.paths().sync_history, &history).await
    }

    /// Manifests and counters recorded so far.
    ///
    /// # Errors
    /// Returns error if the history file exists but cannot be read.
    pub async fn history(&self) -> Result<SyncHistory, StorageError> {
        fs::read_json_or_default(&self.memory.paths().sync_history).await
    }

    /// Cumulative counters.
    ///
    /// # Errors
    /// Returns error if the history file exists but cannot be read.
    pub async fn stats(&self) -> Result<SyncStats, StorageError> {
        Ok(self.history().await?.stats)
    }

    /// Cached global items ranked by overlap with `context`, optionally
    /// restricted to one originating agent.
    ///
    /// # Errors
    /// Returns error if a cache file cannot be read.
    pub async fn get_recommendations(
        &self,
        context: &str,
        agent: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Recommendation>, SyncError> {
        let query = relevance::tokens(context);
        let mut recommendations = Vec::new();
        for category in Category::ALL {
            for record in self.memory.cached(category).await? {
                if agent.is_some_and(|a| record.agent.as_deref() != Some(a)) {
                    continue;
                }
                let confidence = relevance::keyword_overlap(&query, &item_text(&record));
                if confidence > 0.0 {
                    recommendations.push(Recommendation {
                        text: record.content,
                        confidence,
                        source: format!("global:{}", category.collection()),
                        agent: record.agent,
                    });
                }
            }
        }
        recommendations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        recommendations.truncate(limit);
        Ok(recommendations)
    }

    /// Write all local memory files into a bundle at `path`.
    ///
    /// Content is fully anonymized unless `include_private` is set.
    /// Handoff packages are not exported.
    ///
    /// # Errors
    /// Returns error if a memory file cannot be read or the bundle written.
    pub async fn export_memory(&self, path: &Path, include_private: bool) -> Result<ExportReport, SyncError> {
        let paths = self.memory.paths();
        let redact = (!include_private).then(|| self.anonymizer.at_level(PrivacyLevel::Full));
        let project = redact
            .as_ref()
            .map_or_else(|| self.memory.project_name(), |a| a.origin(&self.memory.project_name()));

        let mut bundle = MemoryBundle::new(project, redact.is_some());
        for file in exportable(paths) {
            let content = match tokio::fs::read_to_string(&file).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let Some(name) = relative_name(&paths.root, &file) else {
                continue;
            };
            let content = match &redact {
                Some(anonymizer) => anonymizer.anonymize(&content),
                None => content,
            };
            bundle.files.insert(name, content);
        }

        fs::write_json_atomic(path, &bundle).await?;
        tracing::info!(path = %path.display(), files = bundle.files.len(), anonymized = bundle.anonymized, "Exported memory");
        Ok(ExportReport {
            files: bundle.files.len(),
            anonymized: bundle.anonymized,
        })
    }

    /// Load a bundle from `path` into this project's memory.
    ///
    /// # Errors
    /// Returns `InvalidBundle` for missing, malformed or unsafe bundles, and
    /// I/O errors from writing files.
    pub async fn import_memory(&self, path: &Path, strategy: MergeStrategy) -> Result<ImportReport, SyncError> {
        let bundle = match fs::read_json::<MemoryBundle>(path).await {
            Ok(Some(bundle)) => bundle,
            Ok(None) => {
                return Err(SyncError::InvalidBundle(format!(
                    "{} is missing or empty",
                    path.display()
                )));
            }
            Err(StorageError::Serialization(e)) => {
                return Err(SyncError::InvalidBundle(format!("malformed bundle: {e}")));
            }
            Err(e) => return Err(e.into()),
        };
        bundle.validate()?;

        let root = &self.memory.paths().root;
        let mut report = ImportReport::default();
        let _guard = self.memory.lock_writes().await;

        for (name, imported) in bundle.files {
            let target = root.join(&name);
            let existing = match tokio::fs::read_to_string(&target).await {
                Ok(content) => Some(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };

            let content = match (existing, strategy) {
                (None, _) => {
                    report.created += 1;
                    imported
                }
                (Some(_), MergeStrategy::Overwrite) => {
                    report.overwritten += 1;
                    imported
                }
                (Some(existing), MergeStrategy::Enhance) => {
                    report.merged += 1;
                    Self::enhance(&name, &existing, imported)?
                }
            };
            fs::write_atomic(&target, content.as_bytes()).await?;
        }

        tracing::info!(
            path = %path.display(),
            created = report.created,
            merged = report.merged,
            overwritten = report.overwritten,
            "Imported memory"
        );
        Ok(report)
    }

    fn enhance(name: &str, existing: &str, imported: String) -> Result<String, SyncError> {
        if !name.ends_with(".json") {
            return Ok(bundle::append_text(existing, &imported));
        }
        let incoming: serde_json::Value = serde_json::from_str(&imported)
            .map_err(|e| SyncError::InvalidBundle(format!("`{name}` is not valid JSON: {e}")))?;
        match serde_json::from_str(existing) {
            Ok(current) => Ok(serde_json::to_string_pretty(&bundle::merge_json(current, incoming))?),
            Err(e) => {
                tracing::warn!(file = name, "Existing file is malformed, replacing: {e}");
                Ok(imported)
            }
        }
    }

    /// Schedule periodic full syncs when enabled. Failures are logged and
    /// the schedule continues.
    pub fn start_auto_sync(self: &Arc<Self>, scheduler: &Scheduler) -> Option<ScheduledTask> {
        if !self.config.auto_sync {
            return None;
        }
        let engine = Arc::clone(self);
        Some(scheduler.spawn_interval("auto-sync", self.config.auto_sync_interval, move || {
            let engine = Arc::clone(&engine);
            async move {
                if let Err(e) = engine.full_sync().await {
                    tracing::warn!("Auto-sync failed: {e}");
                }
            }
        }))
    }
}
