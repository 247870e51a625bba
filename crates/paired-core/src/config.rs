//! Shared configuration pieces: data paths and duration encoding.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directory name used under both the user home and each project.
pub const PAIRED_DIR: &str = ".paired";

/// Locations of the shared (non-project) state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedPaths {
    /// Root of the shared state (`~/.paired`).
    pub home: PathBuf,
    /// Agent descriptor directory (`~/.paired/agents`).
    pub agents_dir: PathBuf,
    /// Global knowledge store file.
    pub global_store: PathBuf,
}

impl PairedPaths {
    /// Paths rooted at `home`.
    #[must_use]
    pub fn new(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref().to_path_buf();
        Self {
            agents_dir: home.join("agents"),
            global_store: home.join("memory").join("global_knowledge.json"),
            home,
        }
    }

    /// Paths rooted at `~/.paired`, falling back to `./.paired` when no home exists.
    #[must_use]
    pub fn user_default() -> Self {
        let home = dirs::home_dir().map_or_else(|| PathBuf::from(PAIRED_DIR), |h| h.join(PAIRED_DIR));
        Self::new(home)
    }

    /// Per-project state directory (`<project>/.paired`).
    #[must_use]
    pub fn project_dir(project: &Path) -> PathBuf {
        project.join(PAIRED_DIR)
    }
}

/// `Duration` as whole seconds.
pub mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a duration as seconds.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    /// Deserialize a duration from seconds.
    ///
    /// # Errors
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// `Option<Duration>` as optional whole seconds.
pub mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize an optional duration as seconds.
    ///
    /// # Errors
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional duration from seconds.
    ///
    /// # Errors
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_secs))
    }
}
