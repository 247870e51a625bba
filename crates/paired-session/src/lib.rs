//! Session tracking for the paired runtime.
//!
//! Provides:
//! - `SessionManager` - Sessions per (project, client), connection sets, idle eviction
//! - Snapshot storage implementations (per-project, file, memory)

pub mod config;
pub mod manager;
pub mod storage;

pub use config::SessionConfig;
pub use manager::{Session, SessionError, SessionManager, SessionStats};
