//! Declarative agent descriptors.
//!
//! One TOML file per agent:
//!
//! ```toml
//! id = "architect"
//! name = "Leonardo"
//! role = "Architecture"
//! version = "1.2.0"
//! priority = 8
//! expertise = ["system design", "api design"]
//!
//! [[routing]]
//! pattern = "\\b(architecture|design)\\b"
//! action = "accept"
//! confidence = 0.9
//!
//! [[capabilities]]
//! name = "architecture"
//! confidence = 0.8
//! ```

use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

const fn default_priority() -> u8 {
    5
}

const fn default_confidence() -> f64 {
    1.0
}

/// Declared activation status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredStatus {
    #[default]
    Active,
    Inactive,
}

/// What a matching routing rule means for this agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAction {
    #[default]
    Accept,
    Collaborate,
    Handoff,
}

impl RoutingAction {
    /// Score weight of the action.
    #[must_use]
    pub const fn polarity(self) -> f64 {
        match self {
            Self::Accept => 1.0,
            Self::Collaborate => 0.5,
            Self::Handoff => -0.5,
        }
    }
}

/// Regex routing rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub pattern: String,
    #[serde(default)]
    pub action: RoutingAction,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Agent to hand off to or collaborate with when the rule matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Named capability with a confidence weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An agent descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub role: String,
    pub version: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub status: DeclaredStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "routing")]
    pub routing_rules: Vec<RoutingRule>,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// File the descriptor was loaded from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl AgentDefinition {
    /// Parse and structurally validate a TOML descriptor.
    ///
    /// # Errors
    /// Returns `Validation` on malformed TOML or invalid fields.
    pub fn from_toml(content: &str, source: Option<&Path>) -> Result<Self, RegistryError> {
        let label = source.map_or_else(|| "<inline>".to_string(), |p| p.display().to_string());
        let mut definition: Self =
            toml::from_str(content).map_err(|e| RegistryError::validation(&label, e.to_string()))?;
        definition.source = source.map(Path::to_path_buf);
        definition.validate()?;
        Ok(definition)
    }

    /// Structural validation: id format, required fields, semantic version, priority range.
    ///
    /// # Errors
    /// Returns `Validation` describing the first problem found.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let label = self.label();
        let invalid = |reason: String| RegistryError::validation(&label, reason);

        if self.id.is_empty() || !self.id.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
            return Err(invalid(format!("id `{}` must match [a-z_]+", self.id)));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name is required".to_string()));
        }
        if self.role.trim().is_empty() {
            return Err(invalid("role is required".to_string()));
        }
        semver::Version::parse(&self.version)
            .map_err(|e| invalid(format!("version `{}` is not semantic x.y.z: {e}", self.version)))?;
        if !(1..=10).contains(&self.priority) {
            return Err(invalid(format!("priority {} outside 1..=10", self.priority)));
        }
        Ok(())
    }

    /// Whether the descriptor declares the agent active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == DeclaredStatus::Active
    }

    /// Apply per-instance overrides.
    pub fn apply(&mut self, overrides: &DefinitionOverride) {
        if let Some(priority) = overrides.priority {
            self.priority = priority;
        }
        if let Some(ref expertise) = overrides.expertise {
            self.expertise.clone_from(expertise);
        }
        if let Some(ref capabilities) = overrides.capabilities {
            self.capabilities.clone_from(capabilities);
        }
        if let Some(status) = overrides.status {
            self.status = status;
        }
    }

    fn label(&self) -> String {
        self.source
            .as_ref()
            .map_or_else(|| self.id.clone(), |p| p.display().to_string())
    }
}

/// Per-instance adjustments applied on top of a definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionOverride {
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub expertise: Option<Vec<String>>,
    #[serde(default)]
    pub capabilities: Option<Vec<Capability>>,
    #[serde(default)]
    pub status: Option<DeclaredStatus>,
}

/// Routing rule with its pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub regex: Regex,
    pub action: RoutingAction,
    pub confidence: f64,
    pub target: Option<String>,
}

impl CompiledRule {
    /// Whether the rule matches `text`.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Compile routing patterns (case-insensitive) and check confidence ranges.
///
/// # Errors
/// Returns `Instantiation` for an invalid pattern or out-of-range confidence.
pub fn compile_rules(definition: &AgentDefinition) -> Result<Vec<CompiledRule>, RegistryError> {
    for capability in &definition.capabilities {
        if !(0.0..=1.0).contains(&capability.confidence) {
            return Err(RegistryError::instantiation(
                &definition.id,
                format!("capability `{}` confidence {} outside 0..=1", capability.name, capability.confidence),
            ));
        }
    }

    definition
        .routing_rules
        .iter()
        .map(|rule| {
            if !(0.0..=1.0).contains(&rule.confidence) {
                return Err(RegistryError::instantiation(
                    &definition.id,
                    format!("rule `{}` confidence {} outside 0..=1", rule.pattern, rule.confidence),
                ));
            }
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .size_limit(1 << 20)
                .build()
                .map_err(|e| RegistryError::instantiation(&definition.id, format!("invalid pattern: {e}")))?;
            Ok(CompiledRule {
                regex,
                action: rule.action,
                confidence: rule.confidence,
                target: rule.target.clone(),
            })
        })
        .collect()
}
