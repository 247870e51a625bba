//! Snapshot storage implementations.

pub mod file;
pub mod project;

#[cfg(feature = "memory")]
pub mod memory;

pub use file::FileStorage;
pub use project::ProjectStorage;

#[cfg(feature = "memory")]
pub use memory::MemoryStorage;
