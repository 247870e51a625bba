//! Project memory and privacy-aware sync with the global knowledge store.
//!
//! - `ProjectMemory` - file-backed `KnowledgeStore` for one project
//! - `SyncEngine` - upload / download / conflicts / bookkeeping runs,
//!   recommendations, export and import
//! - `Anonymizer` - pattern-based redaction at three privacy levels
//! - `ContextDetector` - project language/framework inference

pub mod anonymize;
pub mod bundle;
pub mod config;
pub mod context;
pub mod error;
pub mod insights;
pub mod paths;
pub mod record;
pub mod relevance;
pub mod store;
pub mod sync;

pub use anonymize::{Anonymizer, PrivacyLevel};
pub use bundle::{ExportReport, ImportReport, MemoryBundle, MergeStrategy};
pub use config::SyncConfig;
pub use context::{ContextDetector, ManifestDetector, ProjectContext};
pub use error::{SyncError, SyncPhase};
pub use insights::PatternInsight;
pub use paths::MemoryPaths;
pub use record::{Category, GlobalStore, MemoryRecord, SyncManifest};
pub use store::ProjectMemory;
pub use sync::{Recommendation, SyncEngine, SyncHistory, SyncStats};
