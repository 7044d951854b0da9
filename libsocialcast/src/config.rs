//! Configuration management for Socialcast
//!
//! Configuration lives in a TOML file. Every section has defaults, so an empty
//! file (or no `[section]` at all) is valid:
//!
//! ```toml
//! [database]
//! path = "~/.local/share/socialcast/posts.db"
//!
//! [publishing]
//! acquire_timeout = "10m"
//!
//! [health]
//! warning_after_errors = 2
//! error_after_errors = 5
//! token_warning_window = "24h"
//!
//! [rate_limits.tiktok]
//! max_requests = 100
//! window = "1h"
//! max_publishes_per_day = 10
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::rate_limiter::{RateBudget, RateBudgets};

/// Longest accepted rate-limit window; longer budgets belong in the daily quota
pub const MAX_RATE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    /// Per-platform overrides of the built-in rate budgets
    #[serde(default)]
    pub rate_limits: HashMap<String, RateBudget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/socialcast/posts.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Upper bound on waiting for a rate-limit slot; unbounded when absent
    #[serde(default, with = "optional_duration_str")]
    pub acquire_timeout: Option<Duration>,
    /// Buffered progress events per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    100
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: None,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Thresholds for account health classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_warning_after_errors")]
    pub warning_after_errors: u32,
    #[serde(default = "default_error_after_errors")]
    pub error_after_errors: u32,
    /// Tokens expiring within this window downgrade the account to Warning
    #[serde(default = "default_day", with = "duration_str")]
    pub token_warning_window: Duration,
}

fn default_warning_after_errors() -> u32 {
    2
}

fn default_error_after_errors() -> u32 {
    5
}

fn default_day() -> Duration {
    Duration::from_secs(24 * 3600)
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            warning_after_errors: default_warning_after_errors(),
            error_after_errors: default_error_after_errors(),
            token_warning_window: default_day(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Refresh tokens that expire within this window
    #[serde(default = "default_day", with = "duration_str")]
    pub refresh_window: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh_window: default_day(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Budget table with the configured overrides applied
    pub fn rate_budgets(&self) -> RateBudgets {
        RateBudgets::new(self.rate_limits.clone())
    }

    /// Reject values the limiter and health tracker cannot work with
    pub fn validate(&self) -> Result<()> {
        for (platform, budget) in &self.rate_limits {
            if budget.max_requests == 0 {
                return Err(invalid(format!("rate_limits.{platform}.max_requests must be > 0")));
            }
            if budget.window.is_zero() {
                return Err(invalid(format!("rate_limits.{platform}.window must be > 0")));
            }
            if budget.window > MAX_RATE_WINDOW {
                return Err(invalid(format!(
                    "rate_limits.{platform}.window must not exceed {}",
                    humantime::format_duration(MAX_RATE_WINDOW)
                )));
            }
            if budget.max_publishes_per_day == 0 {
                return Err(invalid(format!(
                    "rate_limits.{platform}.max_publishes_per_day must be > 0"
                )));
            }
            if !(budget.backoff_base >= 1.0 && budget.backoff_base.is_finite()) {
                return Err(invalid(format!(
                    "rate_limits.{platform}.backoff_base must be a finite number >= 1.0"
                )));
            }
        }

        if self.health.warning_after_errors > self.health.error_after_errors {
            return Err(invalid(
                "health.warning_after_errors must not exceed health.error_after_errors".to_string(),
            ));
        }

        if self.publishing.event_capacity == 0 {
            return Err(invalid("publishing.event_capacity must be > 0".to_string()));
        }

        Ok(())
    }
}

fn invalid(message: String) -> crate::error::SocialcastError {
    ConfigError::Invalid(message).into()
}

/// Resolve the configuration file path (`$SOCIALCAST_CONFIG`, then the XDG config dir)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SOCIALCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("socialcast").join("config.toml"))
}

/// Humantime (de)serialization for `Duration` fields ("15m", "24h")
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Humantime (de)serialization for `Option<Duration>` fields
pub mod optional_duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                serializer.serialize_some(&humantime::format_duration(*duration).to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
