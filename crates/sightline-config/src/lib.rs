//! Engine configuration loaded from TOML, plus tracing initialization.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working engine. Unknown keys are rejected so typos surface early.

mod logging;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sightline_scheduler::{RetryPolicy, SchedulerConfig};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig, LOG_ENV_VAR};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config value `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // Keep the message only; the default `Display` embeds a source snippet.
        ConfigError::Toml(err.message().to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub lens: LensConfig,
}

impl EngineConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "discovery.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.index.maintenance_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "index.maintenance_interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.lens.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "lens.refresh_interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Worker pool sizes. `None` keeps the scheduler's own default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    #[serde(default)]
    pub compute_threads: Option<usize>,
    #[serde(default)]
    pub background_threads: Option<usize>,
    #[serde(default)]
    pub io_threads: Option<usize>,
}

impl SchedulerSection {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();
        SchedulerConfig {
            compute_threads: self.compute_threads.unwrap_or(defaults.compute_threads).max(1),
            background_threads: self
                .background_threads
                .unwrap_or(defaults.background_threads)
                .max(1),
            io_threads: self.io_threads.unwrap_or(defaults.io_threads).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Quiet period after an edit before the file is rescanned.
    #[serde(default = "DiscoveryConfig::default_debounce_ms")]
    pub debounce_ms: u64,
    /// Total scan attempts per discovery pass.
    #[serde(default = "DiscoveryConfig::default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff step between failed attempts.
    #[serde(default = "DiscoveryConfig::default_backoff_increment_ms")]
    pub backoff_increment_ms: u64,
    /// Window during which further edits do not cancel a retried scan again.
    #[serde(default = "DiscoveryConfig::default_mutation_blackout_ms")]
    pub mutation_blackout_ms: u64,
    #[serde(default = "DiscoveryConfig::default_cancel_on_mutation")]
    pub cancel_on_mutation: bool,
}

impl DiscoveryConfig {
    fn default_debounce_ms() -> u64 {
        150
    }

    fn default_max_attempts() -> u32 {
        3
    }

    fn default_backoff_increment_ms() -> u64 {
        50
    }

    fn default_mutation_blackout_ms() -> u64 {
        300
    }

    fn default_cancel_on_mutation() -> bool {
        true
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn mutation_blackout(&self) -> Duration {
        Duration::from_millis(self.mutation_blackout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_increment: Duration::from_millis(self.backoff_increment_ms),
            cancel_on_mutation: self.cancel_on_mutation,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce_ms(),
            max_attempts: Self::default_max_attempts(),
            backoff_increment_ms: Self::default_backoff_increment_ms(),
            mutation_blackout_ms: Self::default_mutation_blackout_ms(),
            cancel_on_mutation: Self::default_cancel_on_mutation(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    #[serde(default = "IndexConfig::default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,
}

impl IndexConfig {
    fn default_maintenance_interval_ms() -> u64 {
        30_000
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            maintenance_interval_ms: Self::default_maintenance_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LensConfig {
    /// Catch-all refresh of every cached file.
    #[serde(default = "LensConfig::default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Minimum gap between two reported insight failures for the same file.
    #[serde(default = "LensConfig::default_failure_report_interval_ms")]
    pub failure_report_interval_ms: u64,
}

impl LensConfig {
    fn default_refresh_interval_ms() -> u64 {
        60_000
    }

    fn default_failure_report_interval_ms() -> u64 {
        300_000
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn failure_report_interval(&self) -> Duration {
        Duration::from_millis(self.failure_report_interval_ms)
    }
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: Self::default_refresh_interval_ms(),
            failure_report_interval_ms: Self::default_failure_report_interval_ms(),
        }
    }
}
