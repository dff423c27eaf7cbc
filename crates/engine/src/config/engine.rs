//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Persistence backend selected at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `TASKFLOW_`:
/// - `TASKFLOW_STORE`: `memory` or `postgres` (default: memory)
/// - `TASKFLOW_PERSISTENCE_TIMEOUT_MS`: bound on each store or directory call (default: 5000)
/// - `TASKFLOW_NOTIFICATION_TIMEOUT_MS`: bound on each notification (default: 2000)
/// - `TASKFLOW_DIRECTORY_FILE`: YAML role table for the static directory
/// - `TASKFLOW_NATS_URL`: publish assignments to NATS when set
/// - `TASKFLOW_LOG_FORMAT`: `text` or `json` (default: text)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreBackend,

    #[serde(default = "default_persistence_timeout_ms")]
    pub persistence_timeout_ms: u64,

    #[serde(default = "default_notification_timeout_ms")]
    pub notification_timeout_ms: u64,

    #[serde(default)]
    pub directory_file: Option<String>,

    #[serde(default)]
    pub nats_url: Option<String>,

    #[serde(default = "default_nats_subject")]
    pub nats_subject: String,

    #[serde(default = "default_nats_stream")]
    pub nats_stream: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_persistence_timeout_ms() -> u64 {
    5000
}

fn default_notification_timeout_ms() -> u64 {
    2000
}

fn default_nats_subject() -> String {
    crate::notify::nats::DEFAULT_SUBJECT.to_string()
}

fn default_nats_stream() -> String {
    crate::notify::nats::DEFAULT_STREAM.to_string()
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `TASKFLOW_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("TASKFLOW_").from_env::<EngineConfig>()
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_timeout_ms)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::default(),
            persistence_timeout_ms: default_persistence_timeout_ms(),
            notification_timeout_ms: default_notification_timeout_ms(),
            directory_file: None,
            nats_url: None,
            nats_subject: default_nats_subject(),
            nats_stream: default_nats_stream(),
            log_format: LogFormat::default(),
        }
    }
}
