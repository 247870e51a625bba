//! Session manager configuration.

use std::time::Duration;

use paired_core::config::secs;
use serde::{Deserialize, Serialize};

/// Tunables for session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Global cap on concurrent sessions.
    pub max_sessions: usize,
    /// Idle time after which a connection-less session is swept.
    #[serde(rename = "session_timeout_secs", with = "secs")]
    pub session_timeout: Duration,
    /// How often the idle sweep runs.
    #[serde(rename = "cleanup_interval_secs", with = "secs")]
    pub cleanup_interval: Duration,
    /// Grace period between the last disconnect and deferred cleanup.
    #[serde(rename = "disconnect_grace_secs", with = "secs")]
    pub disconnect_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 50,
            session_timeout: Duration::from_secs(60 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            disconnect_grace: Duration::from_secs(5 * 60),
        }
    }
}
