//! PostgreSQL settings for the `postgres` store backend.

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

/// Database configuration loaded from environment variables.
///
/// Environment variables are prefixed with `POSTGRES_`:
/// - `POSTGRES_URL`: full connection URL, overrides the fields below
/// - `POSTGRES_HOST` / `POSTGRES_PORT` (default: localhost:5432)
/// - `POSTGRES_USER` / `POSTGRES_PASSWORD` (default user: taskflow)
/// - `POSTGRES_DATABASE` (default: taskflow)
/// - `POSTGRES_POOL_SIZE` (default: 10)
/// - `POSTGRES_ACQUIRE_TIMEOUT_SECS` (default: 10)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_name")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_name")]
    pub database: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_name() -> String {
    "taskflow".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

impl DatabaseConfig {
    /// Load configuration from `POSTGRES_*` environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("POSTGRES_").from_env::<DatabaseConfig>()
    }

    /// Connection options, from `url` when set and the discrete fields
    /// otherwise.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        let options = match &self.url {
            Some(url) => url.parse::<PgConnectOptions>()?,
            None => PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.database),
        };
        Ok(options.application_name("taskflow"))
    }

    /// Connection target with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        match &self.url {
            Some(url) => match url.rsplit_once('@') {
                Some((_, target)) => format!("postgres://***@{}", target),
                None => url.clone(),
            },
            None => format!(
                "postgres://{}:***@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            user: default_name(),
            password: String::new(),
            database: default_name(),
            pool_size: default_pool_size(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}
