//! Heuristic task analysis: complexity, urgency, risk, capabilities, effort.

use paired_core::TaskContext;
use serde::{Deserialize, Serialize};

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "architecture",
    "refactor",
    "migrate",
    "migration",
    "integrate",
    "distributed",
    "concurrency",
    "scalab",
    "performance",
    "security",
    "database",
    "redesign",
];

const RISK_KEYWORDS: &[&str] = &[
    "delete",
    "drop",
    "production",
    "migrate",
    "credential",
    "secret",
    "security",
    "deploy",
    "force",
    "rollback",
];

const CAPABILITY_TAGS: &[(&str, &str)] = &[
    ("test", "testing"),
    ("review", "code_review"),
    ("deploy", "deployment"),
    ("release", "deployment"),
    ("architect", "architecture"),
    ("design", "architecture"),
    ("bug", "debugging"),
    ("debug", "debugging"),
    ("fix", "debugging"),
    ("document", "documentation"),
    ("readme", "documentation"),
    ("performance", "performance"),
    ("optimi", "performance"),
    ("security", "security"),
    ("vulnerab", "security"),
    ("accessib", "ux"),
    ("ui", "ux"),
    ("requirement", "planning"),
    ("plan", "planning"),
];

/// How soon the task needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Critical,
}

/// Result of analyzing a task request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    /// 1..=10.
    pub complexity: u8,
    pub urgency: Urgency,
    /// 1..=10.
    pub risk: u8,
    /// Capability tags the request calls for, deduplicated, in detection order.
    pub required_capabilities: Vec<String>,
    /// Linear effort estimate in abstract units.
    pub effort: u32,
    /// Domain-specific notes added by specialized behaviors.
    #[serde(default)]
    pub notes: Vec<String>,
}

impl TaskAnalysis {
    /// Recompute effort after complexity or risk were adjusted.
    pub fn refresh_effort(&mut self) {
        self.effort = estimate_effort(self.complexity, self.risk);
    }

    /// Raise risk by `by`, clamped to 10.
    pub fn raise_risk(&mut self, by: u8) {
        self.risk = self.risk.saturating_add(by).clamp(1, 10);
        self.refresh_effort();
    }

    /// Add a capability tag if not present.
    pub fn require(&mut self, capability: &str) {
        if !self.required_capabilities.iter().any(|c| c == capability) {
            self.required_capabilities.push(capability.to_string());
        }
    }
}

/// Analyze a request in its context.
#[must_use]
pub fn analyze(request: &str, context: &TaskContext) -> TaskAnalysis {
    let lower = request.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let complexity = complexity(&lower, request.chars().count(), context.attachments.len());
    let risk = risk(&lower, context);
    let mut analysis = TaskAnalysis {
        complexity,
        urgency: urgency(&lower),
        risk,
        required_capabilities: Vec::new(),
        effort: estimate_effort(complexity, risk),
        notes: Vec::new(),
    };
    for (needle, tag) in CAPABILITY_TAGS {
        // short needles must match a whole word
        let hit = if needle.len() <= 3 {
            words.iter().any(|w| w == needle)
        } else {
            lower.contains(needle)
        };
        if hit {
            analysis.require(tag);
        }
    }
    analysis
}

fn complexity(lower: &str, length: usize, attachments: usize) -> u8 {
    let mut score: usize = 1;
    if length > 200 {
        score += 2;
    }
    if length > 500 {
        score += 1;
    }
    score += attachments.min(3);
    score += COMPLEXITY_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count()
        .min(4);
    clamp_score(score)
}

fn urgency(lower: &str) -> Urgency {
    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if any(&["critical", "emergency", "outage", "production down", "sev1"]) {
        Urgency::Critical
    } else if any(&["urgent", "asap", "immediately", "hotfix", "blocker"]) {
        Urgency::High
    } else if any(&["low priority", "when you can", "nice to have", "someday"]) {
        Urgency::Low
    } else {
        Urgency::Normal
    }
}

fn risk(lower: &str, context: &TaskContext) -> u8 {
    let mut score: usize = 1;
    score += 2 * RISK_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    if context.is_production() {
        score += 3;
    }
    clamp_score(score)
}

fn clamp_score(score: usize) -> u8 {
    u8::try_from(score.clamp(1, 10)).unwrap_or(10)
}

/// Effort grows linearly with complexity and risk.
#[must_use]
pub fn estimate_effort(complexity: u8, risk: u8) -> u32 {
    u32::from(complexity) * 4 + u32::from(risk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_request_is_low_everything() {
        let analysis = analyze("rename a variable", &TaskContext::default());
        assert_eq!(analysis.complexity, 1);
        assert_eq!(analysis.risk, 1);
        assert_eq!(analysis.urgency, Urgency::Normal);
        assert_eq!(analysis.effort, 5);
        assert!(analysis.required_capabilities.is_empty());
    }

    #[test]
    fn test_keywords_and_attachments_raise_complexity() {
        let ctx = TaskContext::default()
            .with_attachment("schema.sql")
            .with_attachment("diagram.png");
        let analysis = analyze("Refactor the database architecture for performance", &ctx);
        // 1 base + 2 attachments + 4 keywords
        assert_eq!(analysis.complexity, 7);
        assert!(analysis.required_capabilities.contains(&"performance".to_string()));
        assert!(analysis.required_capabilities.contains(&"architecture".to_string()));
    }

    #[test]
    fn test_complexity_is_capped() {
        let long = "refactor migrate integrate distributed database security ".repeat(20);
        let ctx = TaskContext::default()
            .with_attachment("a")
            .with_attachment("b")
            .with_attachment("c")
            .with_attachment("d");
        assert_eq!(analyze(&long, &ctx).complexity, 10);
    }

    #[test]
    fn test_production_environment_raises_risk() {
        let request = "deploy the release";
        let staging = analyze(request, &TaskContext::default().with_environment("staging"));
        let prod = analyze(request, &TaskContext::default().with_environment("production"));
        assert_eq!(staging.risk, 3);
        assert_eq!(prod.risk, 6);
        assert!(prod.effort > staging.effort);
        assert!(prod.required_capabilities.contains(&"deployment".to_string()));
    }

    #[test]
    fn test_urgency_levels() {
        let ctx = TaskContext::default();
        assert_eq!(analyze("production down, help", &ctx).urgency, Urgency::Critical);
        assert_eq!(analyze("need this asap", &ctx).urgency, Urgency::High);
        assert_eq!(analyze("low priority cleanup", &ctx).urgency, Urgency::Low);
    }

    #[test]
    fn test_short_tags_match_whole_words_only() {
        let ctx = TaskContext::default();
        assert!(analyze("tweak the ui spacing", &ctx).required_capabilities.contains(&"ux".to_string()));
        assert!(!analyze("build a guide", &ctx).required_capabilities.contains(&"ux".to_string()));
    }
}
