//! Engine configuration management.
//!
//! Handles loading, saving, and validating the tunable parts of the rules core:
//! - Safety thresholds (theft idle window, speeding factors, late-return escalation)
//! - Earnings calendar settings (time zone, rolling-week length)
//!
//! Values are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `CARSHARE__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The layered sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Writing the configuration file failed.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A field holds a value outside its allowed range.
    #[error("Invalid value for '{field}': {message}")]
    Validation {
        /// Dotted field path, e.g. `safety.speeding_high_factor`.
        field: String,
        /// What is wrong with the value.
        message: String,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Safety monitor thresholds.
    pub safety: SafetyConfig,

    /// Earnings aggregation settings.
    pub earnings: EarningsConfig,
}

/// Thresholds used by the safety monitor rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Hours without a fresh sample before a vehicle is treated as a theft risk.
    pub theft_idle_hours: u32,

    /// Multiple of the speed limit above which speeding is `MEDIUM`.
    pub speeding_medium_factor: f64,

    /// Multiple of the speed limit above which speeding is `HIGH`.
    pub speeding_high_factor: f64,

    /// Overdue hours after which a late return escalates from `MEDIUM` to `HIGH`.
    pub late_return_escalation_hours: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            theft_idle_hours: 3,
            speeding_medium_factor: 1.2,
            speeding_high_factor: 1.5,
            late_return_escalation_hours: 24,
        }
    }
}

impl SafetyConfig {
    /// Idle window after which the theft rule fires.
    #[must_use]
    pub fn theft_idle_threshold(&self) -> Duration {
        Duration::hours(i64::from(self.theft_idle_hours))
    }

    /// Overdue duration at which a late return becomes `HIGH`.
    #[must_use]
    pub fn late_return_escalation(&self) -> Duration {
        Duration::hours(i64::from(self.late_return_escalation_hours))
    }
}

/// Calendar settings for the earnings aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarningsConfig {
    /// Time zone whose calendar defines "today", "this month" and "this year".
    #[serde(with = "timezone_serde")]
    pub timezone: Tz,

    /// Length of the rolling "week" bucket in days.
    pub rolling_week_days: u32,
}

impl Default for EarningsConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            rolling_week_days: 7,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default location, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file or environment override cannot be
    /// parsed, or if the result fails validation.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path` (optional) layered with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be parsed or the result is invalid.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        debug!(path = %path.display(), "Loading engine configuration");
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("CARSHARE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration from `path`, failing if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing.
    pub fn load_required(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_from(path)
    }

    /// Save configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate all values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> ConfigResult<()> {
        let safety = &self.safety;
        if safety.theft_idle_hours == 0 {
            return Err(invalid("safety.theft_idle_hours", "must be at least 1"));
        }
        for (field, factor) in [
            ("safety.speeding_medium_factor", safety.speeding_medium_factor),
            ("safety.speeding_high_factor", safety.speeding_high_factor),
        ] {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(invalid(field, "must be a positive number"));
            }
        }
        if safety.speeding_high_factor < safety.speeding_medium_factor {
            return Err(invalid(
                "safety.speeding_high_factor",
                "must not be lower than speeding_medium_factor",
            ));
        }
        if safety.late_return_escalation_hours == 0 {
            return Err(invalid(
                "safety.late_return_escalation_hours",
                "must be at least 1",
            ));
        }
        if self.earnings.rolling_week_days == 0 {
            return Err(invalid("earnings.rolling_week_days", "must be at least 1"));
        }
        Ok(())
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        // On Linux servers: /etc/carshare/engine.toml
        // Elsewhere: the platform config dir, e.g. ~/Library/Application Support/carshare
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/carshare/engine.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "carshare").map_or_else(
                || PathBuf::from("./engine.toml"),
                |dirs| dirs.config_dir().join("engine.toml"),
            )
        }
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

mod timezone_serde {
    use chrono_tz::Tz;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Tz, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
