//! TOML configuration for the feed.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! standard setup: Bitcoin in USD from CoinGecko, 90 days back, sampled at
//! 11:00 and 16:00 US/Eastern, 3 attempts per gap, pacing every 5 new points.

use crate::data::backfill::BackfillConfig;
use crate::data::coingecko::DEFAULT_BASE_URL;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete feed configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub store: StoreSection,
    pub upstream: UpstreamSection,
    pub schedule: ScheduleSection,
    pub backfill: BackfillSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("BITCOIN_price_history.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamSection {
    /// Full URL of the market-chart range endpoint.
    pub base_url: String,
    pub vs_currency: String,
    /// Half-width of the search window around each target.
    pub window_secs: u64,
    pub timeout_secs: u64,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            vs_currency: "usd".to_string(),
            window_secs: 3600,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleSection {
    /// IANA name of the reference timezone.
    pub timezone: String,
    pub lookback_days: u32,
    /// Local hours sampled each day.
    pub hours: Vec<u32>,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            timezone: "US/Eastern".to_string(),
            lookback_days: 90,
            hours: vec![11, 16],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackfillSection {
    pub max_attempts: u32,
    pub gap_cooldown_secs: u64,
    pub pacing_batch: usize,
    pub pacing_cooldown_secs: u64,
}

impl Default for BackfillSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            gap_cooldown_secs: 60,
            pacing_batch: 5,
            pacing_cooldown_secs: 60,
        }
    }
}

impl FeedConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;

        if self.schedule.hours.is_empty() {
            return Err(ConfigError::Invalid("schedule.hours must not be empty".into()));
        }
        if let Some(h) = self.schedule.hours.iter().find(|h| **h > 23) {
            return Err(ConfigError::Invalid(format!(
                "schedule.hours entry {h} is not an hour of the day"
            )));
        }
        if self.backfill.max_attempts == 0 {
            return Err(ConfigError::Invalid("backfill.max_attempts must be at least 1".into()));
        }
        if self.backfill.pacing_batch == 0 {
            return Err(ConfigError::Invalid("backfill.pacing_batch must be at least 1".into()));
        }
        if self.upstream.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("upstream.base_url must not be empty".into()));
        }
        Ok(())
    }

    /// The reference timezone.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.schedule.timezone.parse::<Tz>().map_err(|e| {
            ConfigError::Invalid(format!(
                "unknown timezone '{}': {e}",
                self.schedule.timezone
            ))
        })
    }

    pub fn backfill_config(&self) -> BackfillConfig {
        BackfillConfig {
            max_attempts: self.backfill.max_attempts,
            gap_cooldown: Duration::from_secs(self.backfill.gap_cooldown_secs),
            pacing_batch: self.backfill.pacing_batch,
            pacing_cooldown: Duration::from_secs(self.backfill.pacing_cooldown_secs),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.upstream.window_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }
}
