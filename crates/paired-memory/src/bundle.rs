//! Portable memory bundles for export and import.

use std::{
    collections::BTreeMap,
    path::{Component, Path},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::SyncError, paths::HANDOFFS_DIR, record::STORE_VERSION};

/// Exported memory files keyed by path relative to the memory root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBundle {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub project: String,
    pub anonymized: bool,
    pub files: BTreeMap<String, String>,
}

impl MemoryBundle {
    #[must_use]
    pub fn new(project: impl Into<String>, anonymized: bool) -> Self {
        Self {
            version: STORE_VERSION,
            exported_at: Utc::now(),
            project: project.into(),
            anonymized,
            files: BTreeMap::new(),
        }
    }

    /// Reject names that would escape the memory root or touch handoffs.
    ///
    /// # Errors
    /// Returns `InvalidBundle` naming the first bad entry.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.version > STORE_VERSION {
            return Err(SyncError::InvalidBundle(format!(
                "unsupported version {}",
                self.version
            )));
        }
        for name in self.files.keys() {
            let path = Path::new(name);
            let plain = !name.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
            let handoff = path
                .components()
                .next()
                .is_some_and(|c| c.as_os_str() == HANDOFFS_DIR);
            if !plain || handoff {
                return Err(SyncError::InvalidBundle(format!("illegal file name `{name}`")));
            }
        }
        Ok(())
    }
}

/// How imported files combine with existing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Union structured files, append narrative ones.
    #[default]
    Enhance,
    /// Replace existing files.
    Overwrite,
}

/// Counts from one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub created: usize,
    pub merged: usize,
    pub overwritten: usize,
}

/// Counts from one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub files: usize,
    pub anonymized: bool,
}

fn union(existing: &mut Vec<Value>, imported: Vec<Value>) {
    for item in imported {
        if !existing.contains(&item) {
            existing.push(item);
        }
    }
}

/// Merge two JSON documents.
///
/// Arrays are unioned. Objects are merged per key, unioning arrays found
/// under the same key and otherwise taking the imported value. Anything
/// else is replaced by the imported value.
#[must_use]
pub fn merge_json(existing: Value, imported: Value) -> Value {
    match (existing, imported) {
        (Value::Array(mut a), Value::Array(b)) => {
            union(&mut a, b);
            Value::Array(a)
        }
        (Value::Object(mut a), Value::Object(b)) => {
            for (key, value) in b {
                match (a.get_mut(&key), value) {
                    (Some(Value::Array(current)), Value::Array(incoming)) => union(current, incoming),
                    (_, value) => {
                        a.insert(key, value);
                    }
                }
            }
            Value::Object(a)
        }
        (_, imported) => imported,
    }
}

/// Append narrative text as a new paragraph.
#[must_use]
pub fn append_text(existing: &str, imported: &str) -> String {
    let existing = existing.trim_end();
    if existing.is_empty() {
        return imported.to_string();
    }
    format!("{existing}\n\n{}", imported.trim_start())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_merge_arrays_union() {
        let merged = merge_json(json!([1, 2]), json!([2, 3]));
        assert_eq!(merged, json!([1, 2, 3]));
    }

    #[test]
    fn test_merge_objects() {
        let merged = merge_json(
            json!({"tasks": [{"id": 1}], "version": 1, "keep": true}),
            json!({"tasks": [{"id": 1}, {"id": 2}], "version": 2}),
        );
        assert_eq!(
            merged,
            json!({"tasks": [{"id": 1}, {"id": 2}], "version": 2, "keep": true})
        );
    }

    #[test]
    fn test_append_text() {
        assert_eq!(append_text("one\n", "two\n"), "one\n\ntwo\n");
        assert_eq!(append_text("", "two"), "two");
    }

    #[test]
    fn test_validate_names() {
        let mut bundle = MemoryBundle::new("p", true);
        bundle.files.insert("cache/global_patterns.json".into(), "[]".into());
        assert!(bundle.validate().is_ok());

        for bad in ["../escape.json", "/etc/passwd", "handoffs/h1.json", ""] {
            let mut bundle = MemoryBundle::new("p", true);
            bundle.files.insert(bad.into(), "{}".into());
            assert!(matches!(bundle.validate(), Err(SyncError::InvalidBundle(_))), "{bad}");
        }
    }
}
