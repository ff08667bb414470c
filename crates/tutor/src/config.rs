use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;

use crate::history::HistoryStore;
use crate::transport::{ChatEndpoint, ChatMode};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {env_var}: {message}")]
    InvalidValue { env_var: String, message: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a dotted settings key to the environment variable that sets it
pub fn to_env_var(key: &str) -> String {
    format!("TUTOR_{}", key.replace('.', "__").to_uppercase())
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    #[serde(default = "default_min_update_interval_ms")]
    pub min_update_interval_ms: u64,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            min_update_interval_ms: default_min_update_interval_ms(),
            timeout_secs: None,
        }
    }
}

impl StreamSettings {
    pub fn min_update_interval(&self) -> Duration {
        Duration::from_millis(self.min_update_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistorySettings {
    #[serde(default = "default_history_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            enabled: default_history_enabled(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub endpoint: ChatEndpoint,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub history: HistorySettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("endpoint.base_url", default_base_url())?
            .set_default("endpoint.mode", ChatMode::default().to_string())?
            .set_default("stream.min_update_interval_ms", default_min_update_interval_ms())?
            .set_default("history.enabled", default_history_enabled())?
            .add_source(
                Environment::with_prefix("TUTOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.endpoint.base_url).map_err(|e| ConfigError::InvalidValue {
            env_var: to_env_var("endpoint.base_url"),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                env_var: to_env_var("endpoint.base_url"),
                message: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if self.stream.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                env_var: to_env_var("stream.timeout_secs"),
                message: "timeout must be at least one second".to_string(),
            });
        }
        Ok(())
    }

    /// The history store configured for this run, if history is enabled
    pub fn history_store(&self) -> Option<HistoryStore> {
        if !self.history.enabled {
            return None;
        }
        match &self.history.dir {
            Some(dir) => Some(HistoryStore::new(dir.clone())),
            None => HistoryStore::default_location(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_min_update_interval_ms() -> u64 {
    100
}

fn default_history_enabled() -> bool {
    true
}
