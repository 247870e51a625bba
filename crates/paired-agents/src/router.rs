//! Task-to-agent scoring.

use paired_core::TaskContext;
use serde::{Deserialize, Serialize};

use crate::definition::{AgentDefinition, CompiledRule};

/// Score added per matching expertise area.
pub const EXPERTISE_BONUS: f64 = 0.3;

/// One scored agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub agent_id: String,
    pub score: f64,
}

/// Routing result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub agent_id: String,
    pub score: f64,
    /// Every scored agent in load order.
    pub candidates: Vec<Candidate>,
}

/// Text the rules are matched against: description plus context tags.
#[must_use]
pub fn routing_text(description: &str, context: &TaskContext) -> String {
    if context.tags.is_empty() {
        description.to_string()
    } else {
        format!("{description} {}", context.tags.join(" "))
    }
}

/// Score one agent against `text`.
///
/// Rule matches are weighted by confidence and action polarity, expertise
/// substring matches add a fixed bonus, capability name matches add their
/// confidence. The sum is scaled by `priority / 10`.
#[must_use]
pub fn score(definition: &AgentDefinition, rules: &[CompiledRule], text: &str) -> f64 {
    let lower = text.to_lowercase();

    let rules_score: f64 = rules
        .iter()
        .filter(|r| r.matches(text))
        .map(|r| r.confidence * r.action.polarity())
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let expertise_score = definition
        .expertise
        .iter()
        .filter(|e| !e.is_empty() && lower.contains(&e.to_lowercase()))
        .count() as f64
        * EXPERTISE_BONUS;

    let capability_score: f64 = definition
        .capabilities
        .iter()
        .filter(|c| {
            let name = c.name.to_lowercase();
            !name.is_empty() && (lower.contains(&name) || lower.contains(&name.replace('_', " ")))
        })
        .map(|c| c.confidence)
        .sum();

    (rules_score + expertise_score + capability_score) * f64::from(definition.priority) / 10.0
}

/// Pick the highest positive score. Equal scores keep the earliest agent in
/// iteration order.
#[must_use]
pub fn best<'a, I>(agents: I, text: &str) -> Option<RouteDecision>
where
    I: IntoIterator<Item = (&'a AgentDefinition, &'a [CompiledRule])>,
{
    let candidates: Vec<Candidate> = agents
        .into_iter()
        .map(|(definition, rules)| Candidate {
            agent_id: definition.id.clone(),
            score: score(definition, rules, text),
        })
        .collect();

    let mut winner: Option<&Candidate> = None;
    for candidate in candidates.iter().filter(|c| c.score > 0.0) {
        if winner.is_none_or(|w| candidate.score > w.score) {
            winner = Some(candidate);
        }
    }
    let winner = winner?.clone();
    tracing::debug!(agent_id = %winner.agent_id, score = winner.score, "Routed task");

    Some(RouteDecision {
        agent_id: winner.agent_id,
        score: winner.score,
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::compile_rules;

    fn agent(toml: &str) -> (AgentDefinition, Vec<CompiledRule>) {
        let def = AgentDefinition::from_toml(toml, None).unwrap();
        let rules = compile_rules(&def).unwrap();
        (def, rules)
    }

    fn roster() -> Vec<(AgentDefinition, Vec<CompiledRule>)> {
        vec![
            agent(
                r#"
id = "architect"
name = "A"
role = "Architecture"
version = "1.0.0"
priority = 8
expertise = ["system design"]

[[routing]]
pattern = "\\b(architecture|design)\\b"
confidence = 0.9

[[routing]]
pattern = "deploy"
action = "handoff"
"#,
            ),
            agent(
                r#"
id = "qa"
name = "Q"
role = "Testing"
version = "1.0.0"
priority = 6

[[routing]]
pattern = "\\btests?\\b"

[[capabilities]]
name = "test_automation"
confidence = 0.7
"#,
            ),
        ]
    }

    fn route(roster: &[(AgentDefinition, Vec<CompiledRule>)], text: &str) -> Option<RouteDecision> {
        best(roster.iter().map(|(d, r)| (d, r.as_slice())), text)
    }

    #[test]
    fn test_score_components() {
        let roster = roster();
        let (architect, rules) = &roster[0];
        // rule 0.9 + expertise 0.3, scaled by 0.8
        let s = score(architect, rules, "sketch the system design");
        assert!((s - 0.96).abs() < 1e-9);

        // handoff rule pulls the score negative
        assert!(score(architect, rules, "deploy it") < 0.0);

        let (qa, rules) = &roster[1];
        // rule 1.0 + capability 0.7 via the spaced name, scaled by 0.6
        let s = score(qa, rules, "add test automation");
        assert!((s - 1.02).abs() < 1e-9);
    }

    #[test]
    fn test_best_agent_wins() {
        let roster = roster();
        assert_eq!(route(&roster, "write tests for the parser").unwrap().agent_id, "qa");
        assert_eq!(route(&roster, "review the architecture").unwrap().agent_id, "architect");
    }

    #[test]
    fn test_no_positive_score_is_no_route() {
        let roster = roster();
        assert!(route(&roster, "bake a cake").is_none());
        assert!(route(&roster, "deploy now").is_none());
        assert!(route(&[], "anything").is_none());
    }

    #[test]
    fn test_routing_is_deterministic_and_ties_keep_load_order() {
        let twin = |id: &str| {
            agent(&format!(
                "id = \"{id}\"\nname = \"x\"\nrole = \"r\"\nversion = \"1.0.0\"\n[[routing]]\npattern = \"lint\"\n"
            ))
        };
        let roster = vec![twin("first"), twin("second")];
        for _ in 0..10 {
            let decision = route(&roster, "lint the code").unwrap();
            assert_eq!(decision.agent_id, "first");
            assert_eq!(decision.candidates.len(), 2);
        }
    }

    #[test]
    fn test_context_tags_take_part() {
        let roster = roster();
        let context = TaskContext::default().with_tag("tests");
        let text = routing_text("look at the parser", &context);
        assert_eq!(route(&roster, &text).unwrap().agent_id, "qa");
    }
}
