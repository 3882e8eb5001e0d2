use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub recording: RecordingConfig,
    pub polling: PollingConfig,
    pub notifications: NotificationsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend, including the version prefix.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Authenticated user the service tracks notifications for.
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Captures shorter than this are discarded without uploading.
    pub min_duration_ms: u64,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub timeout_secs: u64,
    /// Consecutive failed status requests tolerated before the job is failed.
    pub max_consecutive_errors: u32,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsetLastSeenPolicy {
    /// First observation stores "now" as the baseline; nothing is unread yet.
    Baseline,
    /// Treat an unset value as epoch zero; every entity is unread.
    Epoch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Delay between a refresh signal and the conversation fetch.
    pub check_delay_ms: u64,
    pub unset_last_seen: UnsetLastSeenPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            token: None,
            user_id: None,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: 2000,
            sample_rate: 16000,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1500,
            timeout_secs: 300,
            max_consecutive_errors: 5,
            max_backoff_ms: 10_000,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            check_delay_ms: 1000,
            unset_last_seen: UnsetLastSeenPolicy::Baseline,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3747 }
    }
}

impl RecordingConfig {
    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }
}

impl NotificationsConfig {
    pub fn check_delay(&self) -> Duration {
        Duration::from_millis(self.check_delay_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config = Self::parse(&content)?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
