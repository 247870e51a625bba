//! Sync engine configuration.

use std::time::Duration;

use paired_core::config::secs;
use serde::{Deserialize, Serialize};

use crate::anonymize::PrivacyLevel;

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Redaction applied to uploaded content.
    pub privacy: PrivacyLevel,
    /// Minimum keyword overlap for a global item to be downloaded.
    pub quality_threshold: f64,
    /// Minimum trimmed content length, in bytes, for upload.
    pub min_content_len: usize,
    /// Run a full sync periodically.
    pub auto_sync: bool,
    #[serde(rename = "auto_sync_interval_secs", with = "secs")]
    pub auto_sync_interval: Duration,
    /// Manifests kept in the sync history.
    pub manifest_cap: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            privacy: PrivacyLevel::ProjectNames,
            quality_threshold: 0.8,
            min_content_len: 20,
            auto_sync: true,
            auto_sync_interval: Duration::from_secs(24 * 60 * 60),
            manifest_cap: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SyncConfig = toml::from_str("privacy = \"full\"\nauto_sync_interval_secs = 3600\n").unwrap();
        assert_eq!(config.privacy, PrivacyLevel::Full);
        assert_eq!(config.auto_sync_interval, Duration::from_secs(3600));
        assert_eq!(config.manifest_cap, 50);
        assert!((config.quality_threshold - 0.8).abs() < f64::EPSILON);
    }
}
