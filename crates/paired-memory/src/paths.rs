//! Per-project memory file layout.

use std::path::{Path, PathBuf};

use paired_core::PairedPaths;

use crate::record::Category;

/// Narrative insights file name.
pub const INSIGHTS_FILE: &str = "insights.md";
/// Handoff package directory name.
pub const HANDOFFS_DIR: &str = "handoffs";

/// Locations under `<project>/.paired/memory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPaths {
    pub project: PathBuf,
    pub root: PathBuf,
    pub learnings: PathBuf,
    pub patterns: PathBuf,
    pub insights: PathBuf,
    pub cache_dir: PathBuf,
    pub sync_history: PathBuf,
    pub handoffs: PathBuf,
}

impl MemoryPaths {
    #[must_use]
    pub fn for_project(project: impl AsRef<Path>) -> Self {
        let project = project.as_ref().to_path_buf();
        let root = PairedPaths::project_dir(&project).join("memory");
        Self {
            learnings: root.join("learnings.json"),
            patterns: root.join("patterns.json"),
            insights: root.join(INSIGHTS_FILE),
            cache_dir: root.join("cache"),
            sync_history: root.join("sync_history.json"),
            handoffs: root.join(HANDOFFS_DIR),
            project,
            root,
        }
    }

    /// Local cache of downloaded global items of one category.
    #[must_use]
    pub fn cache(&self, category: Category) -> PathBuf {
        self.cache_dir.join(format!("global_{}.json", category.collection()))
    }

    #[must_use]
    pub fn handoff(&self, id: &str) -> PathBuf {
        self.handoffs.join(format!("{id}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = MemoryPaths::for_project("/proj/app");
        assert_eq!(paths.root, PathBuf::from("/proj/app/.paired/memory"));
        assert_eq!(
            paths.cache(Category::Pattern),
            PathBuf::from("/proj/app/.paired/memory/cache/global_patterns.json")
        );
        assert_eq!(
            paths.handoff("h1"),
            PathBuf::from("/proj/app/.paired/memory/handoffs/h1.json")
        );
    }
}
