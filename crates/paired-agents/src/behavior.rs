//! Agent behaviors and the id -> constructor lookup table.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    definition::{AgentDefinition, CompiledRule, RoutingAction},
    error::ExecutionError,
    runtime::{HandoffDirective, Task, TaskAnalysis},
};

/// Id of the designated fallback behavior.
pub const DEFAULT_BEHAVIOR: &str = "generic";

/// Which execution path a strategy dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Delegated, low-ceremony path.
    Lightweight,
    /// Local execution with full reasoning.
    Full,
}

/// Specialization hooks of an agent.
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    /// Behavior name (table key of its constructor).
    fn name(&self) -> &'static str;

    /// Domain-specific analysis on top of the generic heuristics.
    fn analyze(&self, _request: &str, _analysis: &mut TaskAnalysis) {}

    /// Handoff predicate. `Some` requires a handoff to the named target.
    fn handoff_target(&self, request: &str, analysis: &TaskAnalysis) -> Option<HandoffDirective>;

    /// Collaboration predicate. `Some` with partners requires collaboration.
    fn collaborators(&self, request: &str, analysis: &TaskAnalysis) -> Option<Vec<String>>;

    /// Run the task on one path and return its payload.
    async fn execute(&self, mode: ExecutionMode, task: &Task) -> Result<Value, ExecutionError>;
}

/// Builds a behavior for a definition and its compiled rules.
pub type BehaviorConstructor = fn(&AgentDefinition, &[CompiledRule]) -> Arc<dyn AgentBehavior>;

/// Behavior driven entirely by the descriptor.
///
/// `handoff` rules with a target feed the handoff predicate, `collaborate`
/// rules with a target feed the collaboration predicate.
pub struct GenericBehavior {
    agent_id: String,
    role: String,
    expertise: Vec<String>,
    rules: Vec<CompiledRule>,
}

impl GenericBehavior {
    /// Build from a definition.
    #[must_use]
    pub fn new(definition: &AgentDefinition, rules: &[CompiledRule]) -> Self {
        Self {
            agent_id: definition.id.clone(),
            role: definition.role.clone(),
            expertise: definition.expertise.clone(),
            rules: rules
                .iter()
                .filter(|r| r.action != RoutingAction::Accept && r.target.is_some())
                .cloned()
                .collect(),
        }
    }

    /// Table constructor.
    pub fn construct(definition: &AgentDefinition, rules: &[CompiledRule]) -> Arc<dyn AgentBehavior> {
        Arc::new(Self::new(definition, rules))
    }

    fn targets<'a>(&'a self, action: RoutingAction, request: &'a str) -> impl Iterator<Item = (&'a CompiledRule, &'a str)> {
        self.rules
            .iter()
            .filter(move |r| r.action == action && r.matches(request))
            .filter_map(|r| r.target.as_deref().map(|t| (r, t)))
            .filter(move |(_, target)| *target != self.agent_id)
    }

    fn plan(&self, mode: ExecutionMode, task: &Task) -> Value {
        let mut steps: Vec<String> = Vec::new();
        if !task.memory().is_empty() {
            steps.push(format!("Review {} related memory excerpt(s)", task.memory().len()));
        }
        if let Some(notes) = task.enrichment.as_ref().map(|e| &e.handoff_notes) {
            steps.extend(notes.iter().map(|n| format!("Account for handoff: {n}")));
        }

        let analysis = task.analysis.as_ref();
        match mode {
            ExecutionMode::Lightweight => {
                steps.push(format!("Apply the change: {}", task.request));
            }
            ExecutionMode::Full => {
                for capability in analysis.map(|a| a.required_capabilities.as_slice()).unwrap_or_default() {
                    steps.push(format!("Apply {capability} expertise"));
                }
                steps.push(format!("Design the approach as {}", self.role));
                steps.push(format!("Implement: {}", task.request));
                steps.push("Validate the result".to_string());
                if analysis.is_some_and(|a| a.risk > 5) {
                    steps.push("Confirm with the user before applying changes".to_string());
                }
            }
        }

        json!({
            "agent": self.agent_id,
            "mode": match mode {
                ExecutionMode::Lightweight => "lightweight",
                ExecutionMode::Full => "full",
            },
            "summary": format!("{} plan for: {}", self.role, task.request),
            "expertise": self.expertise,
            "steps": steps,
            "notes": analysis.map(|a| a.notes.clone()).unwrap_or_default(),
        })
    }
}

/// Attachments must exist under the project when one is set.
async fn check_attachments(task: &Task) -> Result<(), ExecutionError> {
    let Some(project) = task.context.project_path.as_ref() else {
        return Ok(());
    };
    for attachment in &task.context.attachments {
        let path = project.join(attachment);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ExecutionError::NotFound(format!(
                    "attachment {}",
                    path.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ExecutionError::PermissionDenied(format!(
                    "attachment {}",
                    path.display()
                )));
            }
            Err(e) => return Err(ExecutionError::classify(e.to_string())),
        }
    }
    Ok(())
}

#[async_trait]
impl AgentBehavior for GenericBehavior {
    fn name(&self) -> &'static str {
        DEFAULT_BEHAVIOR
    }

    fn handoff_target(&self, request: &str, _analysis: &TaskAnalysis) -> Option<HandoffDirective> {
        self.targets(RoutingAction::Handoff, request)
            .next()
            .map(|(rule, target)| HandoffDirective {
                target: target.to_string(),
                reason: format!("request matches handoff rule `{}`", rule.regex.as_str()),
            })
    }

    fn collaborators(&self, request: &str, _analysis: &TaskAnalysis) -> Option<Vec<String>> {
        let mut partners: Vec<String> = Vec::new();
        for (_, target) in self.targets(RoutingAction::Collaborate, request) {
            if !partners.iter().any(|p| p == target) {
                partners.push(target.to_string());
            }
        }
        (!partners.is_empty()).then_some(partners)
    }

    async fn execute(&self, mode: ExecutionMode, task: &Task) -> Result<Value, ExecutionError> {
        check_attachments(task).await?;
        Ok(self.plan(mode, task))
    }
}

const SECURITY_TERMS: &[&str] = &[
    "auth",
    "password",
    "token",
    "injection",
    "xss",
    "csrf",
    "crypto",
    "secret",
    "permission",
];

/// Code-review behavior: security-aware analysis and a review checklist.
pub struct ReviewerBehavior {
    inner: GenericBehavior,
}

impl ReviewerBehavior {
    /// Table constructor.
    pub fn construct(definition: &AgentDefinition, rules: &[CompiledRule]) -> Arc<dyn AgentBehavior> {
        Arc::new(Self {
            inner: GenericBehavior::new(definition, rules),
        })
    }
}

#[async_trait]
impl AgentBehavior for ReviewerBehavior {
    fn name(&self) -> &'static str {
        "reviewer"
    }

    fn analyze(&self, request: &str, analysis: &mut TaskAnalysis) {
        analysis.require("code_review");
        let lower = request.to_lowercase();
        let hits: Vec<&str> = SECURITY_TERMS
            .iter()
            .copied()
            .filter(|t| lower.contains(t))
            .collect();
        if !hits.is_empty() {
            analysis.raise_risk(2);
            analysis.require("security");
            analysis
                .notes
                .push(format!("Security-sensitive change ({})", hits.join(", ")));
        }
    }

    fn handoff_target(&self, request: &str, analysis: &TaskAnalysis) -> Option<HandoffDirective> {
        self.inner.handoff_target(request, analysis)
    }

    fn collaborators(&self, request: &str, analysis: &TaskAnalysis) -> Option<Vec<String>> {
        self.inner.collaborators(request, analysis)
    }

    async fn execute(&self, mode: ExecutionMode, task: &Task) -> Result<Value, ExecutionError> {
        let mut plan = self.inner.execute(mode, task).await?;
        let security = task
            .analysis
            .as_ref()
            .is_some_and(|a| a.required_capabilities.iter().any(|c| c == "security"));

        let mut checklist = vec![
            "Correctness against the stated intent",
            "Error handling on every fallible path",
            "Tests cover the change",
        ];
        if security {
            checklist.push("Input validation and output encoding");
            checklist.push("Secrets never logged or committed");
        }
        if let Some(obj) = plan.as_object_mut() {
            obj.insert("checklist".to_string(), json!(checklist));
        }
        Ok(plan)
    }
}

/// Agent id -> behavior constructor, with a designated default.
#[derive(Clone)]
pub struct BehaviorTable {
    entries: HashMap<String, BehaviorConstructor>,
}

impl Default for BehaviorTable {
    fn default() -> Self {
        let mut table = Self {
            entries: HashMap::new(),
        };
        table.register(DEFAULT_BEHAVIOR, GenericBehavior::construct);
        table.register("reviewer", ReviewerBehavior::construct);
        table
    }
}

impl BehaviorTable {
    /// Table with the built-in behaviors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for an agent id.
    pub fn register(&mut self, agent_id: impl Into<String>, constructor: BehaviorConstructor) {
        self.entries.insert(agent_id.into(), constructor);
    }

    /// Constructor for `agent_id`, falling back to the default.
    #[must_use]
    pub fn resolve(&self, agent_id: &str) -> BehaviorConstructor {
        self.entries
            .get(agent_id)
            .or_else(|| self.entries.get(DEFAULT_BEHAVIOR))
            .copied()
            .unwrap_or(GenericBehavior::construct)
    }
}
