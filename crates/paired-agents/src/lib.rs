//! Agent registry, routing and the per-task agent runtime.
//!
//! - `AgentFactory` - loads descriptors, instantiates agents, routes tasks
//! - `AgentInstance` - runs a task through enrich, analyze, strategize,
//!   execute and learn
//! - `BehaviorTable` - id to behavior constructor lookup with a generic default

pub mod behavior;
pub mod definition;
pub mod error;
pub mod factory;
pub mod instance;
pub mod loader;
pub mod router;
pub mod runtime;

pub use behavior::{AgentBehavior, BehaviorTable, ExecutionMode};
pub use definition::{AgentDefinition, DefinitionOverride, RoutingAction};
pub use error::{ErrorKind, ExecutionError, RecoveryAction, RegistryError};
pub use factory::{AgentFactory, InitOutcome, InitStatus};
pub use instance::{AgentInstance, AgentStats, InstanceStatus};
pub use router::RouteDecision;
pub use runtime::{RuntimeConfig, Strategy, TaskOutcome, TaskReport, TaskState};
