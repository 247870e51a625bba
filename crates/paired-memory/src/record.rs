//! Memory records, the global store and sync manifests.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Global store format version.
pub const STORE_VERSION: u32 = 1;

/// Record category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Learning,
    Pattern,
    Insight,
}

impl Category {
    pub const ALL: [Self; 3] = [Self::Learning, Self::Pattern, Self::Insight];

    /// Collection name in the global store (`learnings`, ...).
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Learning => "learnings",
            Self::Pattern => "patterns",
            Self::Insight => "insights",
        }
    }
}

/// SHA-256 hex digest of `content`.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// A unit of retained knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub content: String,
    pub category: Category,
    /// Dedup key.
    pub hash: String,
    /// Originating project, possibly redacted.
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl MemoryRecord {
    /// Build a record, hashing its content.
    #[must_use]
    pub fn new(content: impl Into<String>, category: Category, origin: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            hash: content_hash(&content),
            content,
            category,
            origin: origin.into(),
            agent: None,
            tags: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Shared cross-project knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStore {
    pub version: u32,
    #[serde(default)]
    pub learnings: Vec<MemoryRecord>,
    #[serde(default)]
    pub patterns: Vec<MemoryRecord>,
    #[serde(default)]
    pub insights: Vec<MemoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for GlobalStore {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            learnings: Vec::new(),
            patterns: Vec::new(),
            insights: Vec::new(),
            updated_at: None,
        }
    }
}

impl GlobalStore {
    #[must_use]
    pub fn collection(&self, category: Category) -> &[MemoryRecord] {
        match category {
            Category::Learning => &self.learnings,
            Category::Pattern => &self.patterns,
            Category::Insight => &self.insights,
        }
    }

    fn collection_mut(&mut self, category: Category) -> &mut Vec<MemoryRecord> {
        match category {
            Category::Learning => &mut self.learnings,
            Category::Pattern => &mut self.patterns,
            Category::Insight => &mut self.insights,
        }
    }

    /// Every content hash in the store.
    #[must_use]
    pub fn hashes(&self) -> HashSet<&str> {
        Category::ALL
            .iter()
            .flat_map(|c| self.collection(*c))
            .map(|r| r.hash.as_str())
            .collect()
    }

    /// Total records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.learnings.len() + self.patterns.len() + self.insights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge records, skipping hashes already present. Returns how many were added.
    pub fn merge(&mut self, records: Vec<MemoryRecord>) -> usize {
        let mut seen: HashSet<String> = self.hashes().into_iter().map(str::to_string).collect();
        let mut added = 0;
        for record in records {
            if seen.insert(record.hash.clone()) {
                self.collection_mut(record.category).push(record);
                added += 1;
            }
        }
        if added > 0 {
            self.updated_at = Some(Utc::now());
        }
        added
    }
}

/// Audit record of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncManifest {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub uploaded: usize,
    pub downloaded: usize,
    pub conflicts: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_merge_skips_known_hashes() {
        let mut store = GlobalStore::default();
        let record = MemoryRecord::new("use connection pooling for postgres", Category::Learning, "anonymous");
        assert_eq!(store.merge(vec![record.clone(), record.clone()]), 1);
        assert_eq!(store.merge(vec![record]), 0);
        assert_eq!(store.len(), 1);
        assert!(store.updated_at.is_some());
    }

    #[test]
    fn test_same_content_other_category_is_still_a_duplicate() {
        let mut store = GlobalStore::default();
        store.merge(vec![MemoryRecord::new("same text here", Category::Pattern, "a")]);
        let added = store.merge(vec![MemoryRecord::new("same text here", Category::Insight, "b")]);
        assert_eq!(added, 0);
    }
}
