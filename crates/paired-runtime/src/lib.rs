//! Paired runtime: wires sessions, agents and project memory into one daemon.
//!
//! - `Coordinator` - owns the registries and serves protocol requests
//! - `PairedConfig` - TOML configuration with `PAIRED_*` overrides
//! - `protocol` - line-delimited JSON messages spoken by `pairedd`

pub mod config;
pub mod coordinator;
pub mod protocol;

pub use config::{ConfigError, PairedConfig};
pub use coordinator::{Coordinator, CoordinatorError, StartReport, TaskResult, TaskSubmission};
pub use protocol::{AgentSummary, Request, Response};
