//! Core abstractions for the paired agent orchestration runtime.
//!
//! This crate provides the fundamental building blocks:
//! - `EventBus` - Lifecycle notifications with broadcast + history
//! - `Scheduler` - Cancellable background timers
//! - `TaskContext` - Context carried with every task
//! - Session storage and project knowledge traits

pub mod config;
pub mod context;
pub mod event;
pub mod fs;
pub mod knowledge;
pub mod scheduler;
pub mod traits;

pub use config::PairedPaths;
pub use context::TaskContext;
pub use event::{EventBus, LifecycleEvent};
pub use knowledge::InMemoryKnowledge;
pub use scheduler::{ScheduledTask, Scheduler};
pub use traits::{KnowledgeStore, SessionStorage, StorageError};
