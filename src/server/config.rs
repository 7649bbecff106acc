//! Server configuration types

use serde::Deserialize;
use std::time::Duration;
use strata_collab::CollabConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub collab: CollabSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Token signing settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub signing_key: String,
    #[serde(default = "default_bearer_ttl")]
    pub bearer_ttl_secs: i64,
    #[serde(default = "default_invite_ttl")]
    pub invite_ttl_secs: i64,
}

fn default_bearer_ttl() -> i64 {
    86_400
}

fn default_invite_ttl() -> i64 {
    604_800
}

/// Project store settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Room runtime settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollabSettings {
    pub autosave_interval_secs: u64,
    pub autosave_threshold: u32,
    pub ping_interval_secs: u64,
    pub outbound_buffer: usize,
    pub join_retries: u32,
    pub history_limit: Option<usize>,
}

impl Default for CollabSettings {
    fn default() -> Self {
        let defaults = CollabConfig::default();
        Self {
            autosave_interval_secs: defaults.autosave_interval.as_secs(),
            autosave_threshold: defaults.autosave_threshold,
            ping_interval_secs: defaults.ping_interval.as_secs(),
            outbound_buffer: defaults.outbound_buffer,
            join_retries: defaults.join_retries,
            history_limit: defaults.history_limit,
        }
    }
}

impl From<&CollabSettings> for CollabConfig {
    fn from(settings: &CollabSettings) -> Self {
        Self {
            autosave_interval: Duration::from_secs(settings.autosave_interval_secs),
            autosave_threshold: settings.autosave_threshold.max(1),
            ping_interval: Duration::from_secs(settings.ping_interval_secs.max(1)),
            outbound_buffer: settings.outbound_buffer.max(1),
            join_retries: settings.join_retries,
            history_limit: settings.history_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collab_settings_conversion() {
        let settings = CollabSettings {
            autosave_interval_secs: 60,
            autosave_threshold: 0,
            ping_interval_secs: 0,
            outbound_buffer: 0,
            join_retries: 5,
            history_limit: Some(100),
        };
        let config = CollabConfig::from(&settings);

        assert_eq!(config.autosave_interval, Duration::from_secs(60));
        assert_eq!(config.autosave_threshold, 1);
        assert_eq!(config.ping_interval, Duration::from_secs(1));
        assert_eq!(config.outbound_buffer, 1);
        assert_eq!(config.join_retries, 5);
        assert_eq!(config.history_limit, Some(100));
    }

    #[test]
    fn test_collab_settings_default_matches_runtime_default() {
        let config = CollabConfig::from(&CollabSettings::default());
        let runtime = CollabConfig::default();
        assert_eq!(config.autosave_interval, runtime.autosave_interval);
        assert_eq!(config.autosave_threshold, runtime.autosave_threshold);
        assert_eq!(config.history_limit, None);
    }
}
