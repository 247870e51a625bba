//! Per-agent pattern and error learning.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Examples kept per pattern.
pub const MAX_EXAMPLES: usize = 5;

/// Counters for one observed pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternStats {
    pub count: u64,
    pub successes: u64,
    /// Most recent examples, oldest first.
    pub examples: VecDeque<String>,
}

impl PatternStats {
    /// Fraction of successful occurrences.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.successes as f64 / self.count as f64
        }
    }

    fn observe(&mut self, success: bool, example: &str) {
        self.count += 1;
        if success {
            self.successes += 1;
        }
        if self.examples.len() == MAX_EXAMPLES {
            self.examples.pop_front();
        }
        self.examples.push_back(example.to_string());
    }
}

/// Strategy/capability patterns and error counters of one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningStore {
    patterns: BTreeMap<String, PatternStats>,
    errors: HashMap<ErrorKind, u64>,
}

impl LearningStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished task under its strategy and each capability tag.
    pub fn record(&mut self, strategy: &str, capabilities: &[String], success: bool, example: &str) {
        self.patterns
            .entry(format!("strategy:{strategy}"))
            .or_default()
            .observe(success, example);
        for capability in capabilities {
            self.patterns
                .entry(format!("capability:{capability}"))
                .or_default()
                .observe(success, example);
        }
    }

    /// Count a failure class.
    pub fn record_error(&mut self, kind: ErrorKind) {
        *self.errors.entry(kind).or_default() += 1;
    }

    /// Stats for one pattern key (`strategy:<name>` or `capability:<tag>`).
    #[must_use]
    pub fn pattern(&self, key: &str) -> Option<&PatternStats> {
        self.patterns.get(key)
    }

    /// All patterns in key order.
    #[must_use]
    pub const fn patterns(&self) -> &BTreeMap<String, PatternStats> {
        &self.patterns
    }

    /// Occurrences of a failure class.
    #[must_use]
    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.errors.get(&kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_strategy_and_capabilities() {
        let mut store = LearningStore::new();
        let caps = vec!["testing".to_string()];
        store.record("full", &caps, true, "write tests");
        store.record("full", &caps, false, "write more tests");

        let full = store.pattern("strategy:full").unwrap();
        assert_eq!(full.count, 2);
        assert_eq!(full.successes, 1);
        assert!((full.success_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(store.pattern("capability:testing").unwrap().count, 2);
    }

    #[test]
    fn test_examples_keep_last_five() {
        let mut store = LearningStore::new();
        for i in 0..8 {
            store.record("lightweight", &[], true, &format!("task {i}"));
        }
        let examples = &store.pattern("strategy:lightweight").unwrap().examples;
        assert_eq!(examples.len(), MAX_EXAMPLES);
        assert_eq!(examples.front().map(String::as_str), Some("task 3"));
        assert_eq!(examples.back().map(String::as_str), Some("task 7"));
    }

    #[test]
    fn test_error_counters() {
        let mut store = LearningStore::new();
        store.record_error(ErrorKind::Timeout);
        store.record_error(ErrorKind::Timeout);
        assert_eq!(store.error_count(ErrorKind::Timeout), 2);
        assert_eq!(store.error_count(ErrorKind::Other), 0);
    }
}
