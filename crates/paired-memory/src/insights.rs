//! Recurring-pattern insights over pattern observations.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use paired_core::traits::PatternObservation;
use serde::{Deserialize, Serialize};

use crate::record::content_hash;

/// Minimum observations in a group before it becomes an insight.
pub const MIN_FREQUENCY: usize = 3;
/// Minimum success rate of a group.
pub const MIN_SUCCESS_RATE: f64 = 0.7;
/// Confidence above which an observation counts as successful.
pub const SUCCESS_CONFIDENCE: f64 = 0.7;

/// A pattern seen often enough, and successfully enough, to act on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInsight {
    pub pattern_id: String,
    pub pattern_type: String,
    pub signature: String,
    pub frequency: usize,
    pub success_rate: f64,
    pub agents: Vec<String>,
    pub recommendations: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

impl PatternInsight {
    /// One-line summary used as shareable content. Counts are left out so
    /// the text stays stable while the pattern keeps recurring.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Pattern {} is reliable for {}",
            self.signature,
            self.agents.join(", ")
        );
        if !self.recommendations.is_empty() {
            line.push_str(": ");
            line.push_str(&self.recommendations.join("; "));
        }
        line
    }
}

/// Grouping key: pattern type plus the first three sorted context keys.
#[must_use]
pub fn signature(observation: &PatternObservation) -> String {
    let mut keys: Vec<&str> = observation.context.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys.truncate(3);
    format!("{}_{}", observation.pattern_type, keys.join("_"))
}

/// Whether an observation counts toward a group's success rate.
#[must_use]
pub fn is_success(observation: &PatternObservation) -> bool {
    observation.outcome.to_lowercase().contains("success") || observation.confidence > SUCCESS_CONFIDENCE
}

fn recommendations<'a>(successes: impl Iterator<Item = &'a PatternObservation>) -> Vec<String> {
    const HINTS: [(&str, &str); 4] = [
        ("refactor", "Consider refactoring similar code patterns"),
        ("test", "Add comprehensive tests for this pattern"),
        ("performance", "Monitor performance impact of similar changes"),
        ("documentation", "Document this pattern for future reference"),
    ];

    let mut found = BTreeSet::new();
    for observation in successes {
        let outcome = observation.outcome.to_lowercase();
        for (keyword, hint) in HINTS {
            if outcome.contains(keyword) {
                found.insert(hint.to_string());
            }
        }
    }
    found.into_iter().collect()
}

/// Group observations by signature and keep the frequent, successful groups,
/// most frequent first.
#[must_use]
pub fn analyze(observations: &[PatternObservation]) -> Vec<PatternInsight> {
    let mut groups: BTreeMap<String, Vec<&PatternObservation>> = BTreeMap::new();
    for observation in observations {
        groups.entry(signature(observation)).or_default().push(observation);
    }

    let mut insights: Vec<PatternInsight> = groups
        .into_iter()
        .filter(|(_, entries)| entries.len() >= MIN_FREQUENCY)
        .filter_map(|(signature, entries)| {
            let frequency = entries.len();
            let successes: Vec<&PatternObservation> =
                entries.iter().copied().filter(|o| is_success(o)).collect();
            #[allow(clippy::cast_precision_loss)]
            let success_rate = successes.len() as f64 / frequency as f64;
            if success_rate < MIN_SUCCESS_RATE {
                return None;
            }

            let agents: BTreeSet<String> = entries.iter().map(|o| o.agent_id.clone()).collect();
            let last_seen = entries.iter().map(|o| o.timestamp).max()?;
            let mut pattern_id = content_hash(&signature);
            pattern_id.truncate(12);

            Some(PatternInsight {
                pattern_id,
                pattern_type: entries[0].pattern_type.clone(),
                recommendations: recommendations(successes.into_iter()),
                agents: agents.into_iter().collect(),
                signature,
                frequency,
                success_rate,
                last_seen,
            })
        })
        .collect();

    insights.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| b.success_rate.total_cmp(&a.success_rate))
    });
    insights
}
