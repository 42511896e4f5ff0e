//! Configuration management for surveysync.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "surveysync";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "pending.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SURVEYSYNC_`)
/// 2. TOML config file at `~/.config/surveysync/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local store configuration.
    pub storage: StorageConfig,
    /// Submission endpoint configuration.
    pub endpoint: EndpointConfig,
    /// Connectivity monitor configuration.
    pub connectivity: ConnectivityConfig,
    /// Sync engine configuration.
    pub sync: SyncConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the pending-submission database.
    /// Defaults to `~/.local/share/surveysync/pending.db`
    pub database_path: Option<PathBuf>,
}

/// Endpoint-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// URL that accepts `POST`ed survey payloads.
    pub url: String,
    /// Per-request timeout in seconds. 0 keeps the transport's default.
    pub timeout_secs: u64,
}

/// Where the online/offline signal comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityMode {
    /// Follow the platform's link state.
    #[default]
    Auto,
    /// Always report online.
    Online,
    /// Always report offline.
    Offline,
}

/// Connectivity-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Signal source.
    pub mode: ConnectivityMode,
    /// Interval between link-state samples in milliseconds.
    pub poll_interval_ms: u64,
    /// How long the link must stay up before a reconnect sync starts.
    pub debounce_ms: u64,
}

/// Sync-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Periodic sync interval in seconds. 0 disables periodic sync.
    pub interval_secs: u64,
    /// Run one sync pass when the watcher starts.
    pub on_start: bool,
    /// Maximum deliveries in flight during one pass.
    pub pipeline_depth: usize,
    /// Warn about surveys pending longer than this many days. 0 disables.
    pub stale_after_days: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/submit-survey".to_string(),
            timeout_secs: 0,
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            mode: ConnectivityMode::Auto,
            poll_interval_ms: 2_000,
            debounce_ms: 500,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            on_start: true,
            pipeline_depth: 1,
            stale_after_days: 30,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SURVEYSYNC_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let url = self.endpoint.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::ConfigValidation {
                message: format!("endpoint.url must include http:// or https://: {url}"),
            });
        }

        if self.connectivity.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "connectivity.poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.sync.pipeline_depth == 0 {
            return Err(Error::ConfigValidation {
                message: "sync.pipeline_depth must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the link-state polling interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.connectivity.poll_interval_ms)
    }

    /// Get the reconnect debounce window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.connectivity.debounce_ms)
    }

    /// Get the periodic sync interval, if enabled.
    #[must_use]
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync.interval_secs > 0).then(|| Duration::from_secs(self.sync.interval_secs))
    }

    /// Get the stale-survey threshold, if enabled.
    #[must_use]
    pub fn stale_after(&self) -> Option<chrono::Duration> {
        (self.sync.stale_after_days > 0)
            .then(|| chrono::Duration::days(i64::from(self.sync.stale_after_days)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert_eq!(config.endpoint.url, "http://localhost:3000/submit-survey");
        assert_eq!(config.endpoint.timeout_secs, 0);
        assert_eq!(config.connectivity.mode, ConnectivityMode::Auto);
        assert_eq!(config.sync.pipeline_depth, 1);
        assert!(config.sync.on_start);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.endpoint.url = "ftp://example.com/upload".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("endpoint.url"));
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.connectivity.poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_zero_pipeline_depth() {
        let mut config = Config::default();
        config.sync.pipeline_depth = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("pipeline_depth"));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("surveysync"));
        assert!(path.to_string_lossy().ends_with("pending.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_durations() {
        let mut config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.sync_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.stale_after(), Some(chrono::Duration::days(30)));

        config.sync.interval_secs = 0;
        config.sync.stale_after_days = 0;
        assert_eq!(config.sync_interval(), None);
        assert_eq!(config.stale_after(), None);
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[endpoint]
url = "https://survey.example.org/submit-survey"
timeout_secs = 20

[connectivity]
mode = "offline"

[sync]
pipeline_depth = 4
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.endpoint.url, "https://survey.example.org/submit-survey");
        assert_eq!(config.endpoint.timeout_secs, 20);
        assert_eq!(config.connectivity.mode, ConnectivityMode::Offline);
        assert_eq!(config.sync.pipeline_depth, 4);
        assert_eq!(config.sync.interval_secs, 300);
    }

    #[test]
    fn test_file_sections_are_not_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[storage]\ndatabase_path = \"/data/surveys.db\"\n\n[connectivity]\ndebounce_ms = 0\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/data/surveys.db"));
        assert_eq!(config.connectivity.debounce_ms, 0);
        assert_eq!(config.connectivity.mode, ConnectivityMode::Auto);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\npipeline_depth = 0\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(err.to_string().contains("pipeline_depth"));
    }

    #[test]
    fn test_connectivity_mode_deserialize() {
        let config: ConnectivityConfig =
            serde_json::from_str(r#"{"mode": "online", "debounce_ms": 0}"#).unwrap();
        assert_eq!(config.mode, ConnectivityMode::Online);
        assert_eq!(config.debounce_ms, 0);
        assert_eq!(config.poll_interval_ms, 2_000);
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("pipeline_depth"));
        assert!(json.contains("submit-survey"));
    }
}
