//! Configuration for the provider integration engine.
//!
//! Values here are plumbed once at startup into an immutable [`EngineConfig`]
//! and handed to the scheduler/executor by value or `Arc` — never read back
//! out of a global, so a single process can run more than one configuration
//! in tests without interference.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors that can occur while assembling [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnvVar(String),

    #[error("environment variable {0} has an invalid value: {1}")]
    InvalidEnvVar(String, String),

    #[error("config file {path} could not be read: {message}")]
    FileRead { path: String, message: String },

    #[error("config file is not valid TOML: {0}")]
    InvalidToml(String),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Scheduling band thresholds, tick intervals, and per-cycle caps (§4.6).
///
/// Kept as one immutable value rather than module-level constants so the
/// "source has multiple conflicting band definitions" ambiguity noted in the
/// original system has exactly one codified answer here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    /// Events starting within this many hours, or that started within
    /// `high_lookback` ago, fall in the high-priority band.
    pub high_lookahead_hours: i64,
    pub high_lookback_hours: i64,
    pub high_resync_interval_secs: u64,
    pub high_cycle_cap: usize,

    /// Events starting within this many hours (and not already in the high
    /// band) fall in the medium-priority band.
    pub medium_lookahead_hours: i64,
    pub medium_resync_interval_secs: u64,
    pub medium_cycle_cap: usize,

    pub low_resync_interval_secs: u64,
    pub low_cycle_cap: usize,

    /// Grace period past an event's start after which the scheduler no
    /// longer selects it for periodic resync; only on-demand syncs apply.
    pub grace_period_hours: i64,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            high_lookahead_hours: 4,
            high_lookback_hours: 1,
            high_resync_interval_secs: 60,
            high_cycle_cap: 50,

            medium_lookahead_hours: 24,
            medium_resync_interval_secs: 15 * 60,
            medium_cycle_cap: 20,

            low_resync_interval_secs: 4 * 60 * 60,
            low_cycle_cap: 10,

            grace_period_hours: 1,
        }
    }
}

impl BandConfig {
    pub fn high_resync_interval(&self) -> Duration {
        Duration::from_secs(self.high_resync_interval_secs)
    }

    pub fn medium_resync_interval(&self) -> Duration {
        Duration::from_secs(self.medium_resync_interval_secs)
    }

    pub fn low_resync_interval(&self) -> Duration {
        Duration::from_secs(self.low_resync_interval_secs)
    }
}

/// Per-provider token bucket sizing (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRateLimit {
    /// Maximum tokens in the bucket (also the max burst).
    pub bucket_size: u32,
    /// Tokens added per hour.
    pub refill_per_hour: u32,
}

fn default_rate_limits() -> HashMap<String, ProviderRateLimit> {
    let mut map = HashMap::new();
    map.insert(
        "runsignup".to_string(),
        ProviderRateLimit {
            bucket_size: 1000,
            refill_per_hour: 1000,
        },
    );
    map.insert(
        "haku".to_string(),
        ProviderRateLimit {
            bucket_size: 500,
            refill_per_hour: 500,
        },
    );
    map.insert(
        "race_roster".to_string(),
        ProviderRateLimit {
            bucket_size: 500,
            refill_per_hour: 500,
        },
    );
    map.insert(
        "lets_do_this".to_string(),
        ProviderRateLimit {
            bucket_size: 500,
            refill_per_hour: 500,
        },
    );
    map.insert(
        "chronotrack".to_string(),
        ProviderRateLimit {
            bucket_size: 500,
            refill_per_hour: 500,
        },
    );
    map
}

/// Non-secret, non-per-partner settings loaded from a TOML file (§13).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub band: BandConfig,
    pub discovery_hours_of_day: Vec<u32>,
    pub incremental_horizon_days: i64,
    pub tick_interval_secs: u64,
    pub per_partner_concurrency: usize,
    pub http_timeout_secs: u64,
    pub discovery_grace_minutes: i64,
    pub rate_limits: HashMap<String, ProviderRateLimit>,
    pub lock_file_path: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            band: BandConfig::default(),
            discovery_hours_of_day: vec![6, 18],
            incremental_horizon_days: 7,
            tick_interval_secs: 10,
            per_partner_concurrency: 4,
            http_timeout_secs: 30,
            discovery_grace_minutes: 60,
            rate_limits: default_rate_limits(),
            lock_file_path: "/var/run/provider-engine.lock".to_string(),
        }
    }
}

impl FileConfig {
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::InvalidToml(e.to_string()))
    }

    pub fn load(path: &std::path::Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }
}

/// Fully assembled, immutable configuration handed to every runtime
/// component at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub band: BandConfig,
    pub discovery_hours_of_day: Vec<u32>,
    pub incremental_horizon_days: i64,
    pub tick_interval: Duration,
    pub per_partner_concurrency: usize,
    pub http_timeout: Duration,
    pub discovery_grace: chrono::Duration,
    pub rate_limits: HashMap<String, ProviderRateLimit>,
    pub lock_file_path: std::path::PathBuf,
    pub database_url: String,
}

impl EngineConfig {
    /// Builds the final config from a file-sourced [`FileConfig`] plus
    /// infra secrets read from the environment (`DATABASE_URL` only —
    /// per-partner credentials never come from env, they live in Postgres).
    pub fn assemble(file: FileConfig) -> ConfigResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        Ok(Self {
            band: file.band,
            discovery_hours_of_day: file.discovery_hours_of_day,
            incremental_horizon_days: file.incremental_horizon_days,
            tick_interval: Duration::from_secs(file.tick_interval_secs),
            per_partner_concurrency: file.per_partner_concurrency,
            http_timeout: Duration::from_secs(file.http_timeout_secs),
            discovery_grace: chrono::Duration::minutes(file.discovery_grace_minutes),
            rate_limits: file.rate_limits,
            lock_file_path: std::path::PathBuf::from(file.lock_file_path),
            database_url,
        })
    }

    /// Convenience constructor combining an optional TOML config file with
    /// environment-sourced secrets.
    pub fn load(config_path: Option<&std::path::Path>) -> ConfigResult<Self> {
        let file = match config_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::assemble(file)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database_url.is_empty() {
            return Err(ConfigError::Validation("DATABASE_URL is empty".to_string()));
        }
        if self.discovery_hours_of_day.iter().any(|h| *h > 23) {
            return Err(ConfigError::Validation(
                "discovery_hours_of_day must be in 0..=23".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_config_has_two_discovery_runs() {
        let config = FileConfig::default();
        assert_eq!(config.discovery_hours_of_day, vec![6, 18]);
    }

    #[test]
    fn runsignup_bucket_matches_documented_limit() {
        let config = FileConfig::default();
        let runsignup = config.rate_limits.get("runsignup").unwrap();
        assert_eq!(runsignup.bucket_size, 1000);
    }

    #[test]
    fn assemble_fails_without_database_url() {
        std::env::remove_var("DATABASE_URL");
        let result = EngineConfig::assemble(FileConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn assemble_succeeds_with_database_url() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        let result = EngineConfig::assemble(FileConfig::default());
        assert!(result.is_ok());
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    fn invalid_discovery_hour_fails_validation() {
        let mut file = FileConfig::default();
        file.discovery_hours_of_day = vec![25];
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        let config = EngineConfig::assemble(file).unwrap();
        assert!(config.validate().is_err());
        std::env::remove_var("DATABASE_URL");
    }
}
