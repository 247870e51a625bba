//! Strategy selection.

use serde::{Deserialize, Serialize};

use super::analysis::TaskAnalysis;

/// Upper bounds for the lightweight path.
const LIGHT_COMPLEXITY: u8 = 3;
const LIGHT_RISK: u8 = 5;
/// How far past the lightweight bounds a task may be and still run hybrid.
const HYBRID_MARGIN: u8 = 2;

/// A handoff requested by an agent's behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffDirective {
    pub target: String,
    pub reason: String,
}

/// How a task will be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Delegated, low-ceremony execution.
    Lightweight,
    /// Local execution with full reasoning.
    Full,
    /// Both paths, results merged.
    Hybrid,
    /// Transfer to another agent.
    Handoff { target: String, reason: String },
    /// Multi-agent collaboration.
    Collaboration { partners: Vec<String> },
}

impl Strategy {
    /// Wire name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Lightweight => "lightweight",
            Self::Full => "full",
            Self::Hybrid => "hybrid",
            Self::Handoff { .. } => "handoff",
            Self::Collaboration { .. } => "collaboration",
        }
    }
}

/// Whether the task is small and safe enough for the lightweight path.
#[must_use]
pub const fn is_lightweight(analysis: &TaskAnalysis) -> bool {
    analysis.complexity <= LIGHT_COMPLEXITY && analysis.risk <= LIGHT_RISK
}

/// Whether the task sits just past the lightweight bounds.
#[must_use]
pub const fn is_hybrid(analysis: &TaskAnalysis) -> bool {
    !is_lightweight(analysis)
        && analysis.complexity <= LIGHT_COMPLEXITY + HYBRID_MARGIN
        && analysis.risk <= LIGHT_RISK + HYBRID_MARGIN
}

/// Pick a strategy.
///
/// Order: lightweight, then the behavior's handoff predicate, then its
/// collaboration predicate, then hybrid, else full. The predicates are only
/// evaluated when reached.
pub fn select<H, C>(analysis: &TaskAnalysis, handoff: H, collaboration: C) -> Strategy
where
    H: FnOnce() -> Option<HandoffDirective>,
    C: FnOnce() -> Option<Vec<String>>,
{
    if is_lightweight(analysis) {
        return Strategy::Lightweight;
    }
    if let Some(HandoffDirective { target, reason }) = handoff() {
        return Strategy::Handoff { target, reason };
    }
    if let Some(partners) = collaboration().filter(|p| !p.is_empty()) {
        return Strategy::Collaboration { partners };
    }
    if is_hybrid(analysis) {
        Strategy::Hybrid
    } else {
        Strategy::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::analysis::{Urgency, estimate_effort};

    fn analysis(complexity: u8, risk: u8) -> TaskAnalysis {
        TaskAnalysis {
            complexity,
            urgency: Urgency::Normal,
            risk,
            required_capabilities: vec![],
            effort: estimate_effort(complexity, risk),
            notes: vec![],
        }
    }

    fn handoff() -> Option<HandoffDirective> {
        Some(HandoffDirective {
            target: "devops".into(),
            reason: "deployment work".into(),
        })
    }

    #[test]
    fn test_lightweight_wins_over_predicates() {
        let strategy = select(&analysis(3, 5), handoff, || panic!("collaboration predicate evaluated"));
        assert_eq!(strategy, Strategy::Lightweight);
    }

    #[test]
    fn test_handoff_before_collaboration() {
        let strategy = select(&analysis(6, 2), handoff, || Some(vec!["qa".into()]));
        assert_eq!(strategy.name(), "handoff");
    }

    #[test]
    fn test_collaboration_when_no_handoff() {
        let strategy = select(&analysis(8, 2), || None, || Some(vec!["qa".into()]));
        assert_eq!(
            strategy,
            Strategy::Collaboration {
                partners: vec!["qa".into()]
            }
        );
        let strategy = select(&analysis(8, 2), || None, || Some(vec![]));
        assert_eq!(strategy, Strategy::Full);
    }

    #[test]
    fn test_hybrid_near_the_lightweight_bounds() {
        assert_eq!(select(&analysis(5, 2), || None, || None), Strategy::Hybrid);
        assert_eq!(select(&analysis(2, 7), || None, || None), Strategy::Hybrid);
        assert_eq!(select(&analysis(6, 2), || None, || None), Strategy::Full);
        assert_eq!(select(&analysis(3, 8), || None, || None), Strategy::Full);
    }
}
