//! Daemon configuration: TOML file plus environment overrides.

use std::path::{Path, PathBuf};

use paired_agents::RuntimeConfig;
use paired_core::PairedPaths;
use paired_memory::{PrivacyLevel, SyncConfig};
use paired_session::SessionConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairedConfig {
    /// Shared state root (`~/.paired`).
    pub home: PathBuf,
    /// Agent descriptor directory; `<home>/agents` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents_dir: Option<PathBuf>,
    pub session: SessionConfig,
    pub runtime: RuntimeConfig,
    pub sync: SyncConfig,
}

impl Default for PairedConfig {
    fn default() -> Self {
        Self {
            home: PairedPaths::user_default().home,
            agents_dir: None,
            session: SessionConfig::default(),
            runtime: RuntimeConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl PairedConfig {
    /// Defaults rooted at `home`.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Read a TOML file. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `PAIRED_*` overrides from the process environment.
    ///
    /// # Errors
    /// Returns error if a variable holds an unparsable value.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.apply_env(|var| std::env::var(var).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns error if a variable holds an unparsable value.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(home) = lookup("PAIRED_HOME") {
            self.home = PathBuf::from(home);
        }
        if let Some(dir) = lookup("PAIRED_AGENTS_DIR") {
            self.agents_dir = Some(PathBuf::from(dir));
        }
        if let Some(max) = lookup("PAIRED_MAX_SESSIONS") {
            self.session.max_sessions = max.trim().parse().map_err(|e| ConfigError::Env {
                var: "PAIRED_MAX_SESSIONS",
                reason: format!("{e}"),
            })?;
        }
        if let Some(level) = lookup("PAIRED_PRIVACY") {
            self.sync.privacy = level
                .parse::<PrivacyLevel>()
                .map_err(|reason| ConfigError::Env {
                    var: "PAIRED_PRIVACY",
                    reason,
                })?;
        }
        if let Some(flag) = lookup("PAIRED_AUTO_SYNC") {
            self.sync.auto_sync = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ConfigError::Env {
                        var: "PAIRED_AUTO_SYNC",
                        reason: format!("expected a boolean, got `{other}`"),
                    });
                }
            };
        }
        Ok(self)
    }

    /// Resolved shared-state paths.
    #[must_use]
    pub fn paths(&self) -> PairedPaths {
        let mut paths = PairedPaths::new(&self.home);
        if let Some(dir) = &self.agents_dir {
            paths.agents_dir.clone_from(dir);
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paired.toml");
        std::fs::write(
            &path,
            r#"
home = "/srv/paired"

[session]
max_sessions = 5
session_timeout_secs = 120

[runtime]
task_timeout_secs = 30

[sync]
privacy = "full"
auto_sync = false
"#,
        )
        .unwrap();

        let config = PairedConfig::load(&path).unwrap();
        assert_eq!(config.home, PathBuf::from("/srv/paired"));
        assert_eq!(config.session.max_sessions, 5);
        assert_eq!(config.session.session_timeout, Duration::from_secs(120));
        assert_eq!(config.runtime.task_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.sync.privacy, PrivacyLevel::Full);
        assert!(!config.sync.auto_sync);
        assert_eq!(config.sync.manifest_cap, 50);
        assert_eq!(config.paths().agents_dir, PathBuf::from("/srv/paired/agents"));
    }

    #[test]
    fn test_missing_file_is_default_and_bad_file_errors() {
        let dir = TempDir::new().unwrap();
        let config = PairedConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.session.max_sessions, 50);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "session = 3").unwrap();
        assert!(matches!(PairedConfig::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PAIRED_HOME", "/tmp/ph"),
            ("PAIRED_AGENTS_DIR", "/etc/paired/agents"),
            ("PAIRED_MAX_SESSIONS", "7"),
            ("PAIRED_PRIVACY", "none"),
            ("PAIRED_AUTO_SYNC", "off"),
        ]);
        let config = PairedConfig::default()
            .apply_env(|k| vars.get(k).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.home, PathBuf::from("/tmp/ph"));
        assert_eq!(config.paths().agents_dir, PathBuf::from("/etc/paired/agents"));
        assert_eq!(config.paths().global_store, PathBuf::from("/tmp/ph/memory/global_knowledge.json"));
        assert_eq!(config.session.max_sessions, 7);
        assert_eq!(config.sync.privacy, PrivacyLevel::None);
        assert!(!config.sync.auto_sync);

        let err = PairedConfig::default()
            .apply_env(|k| (k == "PAIRED_MAX_SESSIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "PAIRED_MAX_SESSIONS", .. }));
    }
}
