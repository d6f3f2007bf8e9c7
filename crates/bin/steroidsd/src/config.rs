//! Configuration loading: a TOML file with environment variable overrides.
//!
//! Looks for `steroids.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use steroids_app::settings::Settings;
use steroids_domain::id::WorkerId;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Process-wide service invocation defaults.
    pub services: Settings,
    /// Background worker settings.
    pub worker: WorkerConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Background worker configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How often the queue is polled for pending jobs.
    pub poll_interval_ms: u64,
    /// How long a heartbeat keeps this worker live.
    pub heartbeat_ttl_secs: u64,
    /// Stable worker identity. A random one is generated when unset.
    pub id: Option<WorkerId>,
}

impl Config {
    /// Load configuration from `steroids.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or an
    /// override or the merged result is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("steroids.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("STEROIDS_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = lookup("STEROIDS_ENV") {
            self.services.environment = val
                .parse()
                .map_err(|err| ConfigError::Validation(format!("STEROIDS_ENV: {err}")))?;
        }
        if let Some(val) = lookup("STEROIDS_WRAP_IN_TRANSACTION") {
            self.services.wrap_in_transaction = val.parse().map_err(|_| {
                ConfigError::Validation(format!(
                    "STEROIDS_WRAP_IN_TRANSACTION must be true or false, got {val}"
                ))
            })?;
        }
        if let Some(val) = lookup("STEROIDS_WORKER_ID") {
            let id = val
                .parse()
                .map_err(|err| ConfigError::Validation(format!("STEROIDS_WORKER_ID: {err}")))?;
            self.worker.id = Some(id);
        }
        if let Some(val) = lookup("STEROIDS_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.worker.heartbeat_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "heartbeat_ttl_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Beat three times per TTL so one late beat does not drop the worker.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs((self.heartbeat_ttl_secs / 3).max(1))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:steroids.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "steroidsd=info,steroids=info,sqlx=warn".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            heartbeat_ttl_secs: 60,
            id: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
