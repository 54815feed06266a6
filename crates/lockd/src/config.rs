//! Configuration management for the Shackle lock daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/shackle/lockd.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hardware::HardwareModel;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("unlock_pulse_ms must be between 100 and 10000, got {0}")]
    InvalidUnlockPulse(u64),

    #[error("max_events must be between 1 and 100000, got {0}")]
    InvalidMaxEvents(usize),

    #[error("name must not be empty")]
    EmptyName,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the lock daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General lock configuration.
    pub lock: LockConfig,

    /// Hardware actuation configuration.
    pub hardware: HardwareConfig,

    /// Event log configuration.
    pub events: EventsConfig,
}

/// General lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    /// Human-readable name of this lock.
    pub name: String,

    /// Directory for storing lock state (keys, events, identity).
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            name: "Lock".to_string(),
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
        }
    }
}

/// Hardware actuation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HardwareConfig {
    /// Which physical lock model drives the actuator lines.
    pub model: HardwareModel,

    /// How long the relay stays engaged per unlock, in milliseconds.
    pub unlock_pulse_ms: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            model: HardwareModel::Mock,
            unlock_pulse_ms: 1000,
        }
    }
}

/// Event log configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Maximum number of events retained; oldest entries are dropped.
    pub max_events: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { max_events: 10_000 }
    }
}

impl Config {
    /// Returns the default configuration file path.
    ///
    /// Uses `~/.config/shackle/lockd.toml`, falling back to a relative
    /// path if the config directory cannot be determined.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shackle")
            .join("lockd.toml")
    }

    /// Loads configuration from the given path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default path, or returns defaults
    /// if no file exists there.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config file at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Saves this configuration to the given path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validates every section of this configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.lock.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if !VALID_LOG_LEVELS.contains(&self.lock.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.lock.log_level.clone()));
        }
        if !(100..=10_000).contains(&self.hardware.unlock_pulse_ms) {
            return Err(ConfigError::InvalidUnlockPulse(self.hardware.unlock_pulse_ms));
        }
        if !(1..=100_000).contains(&self.events.max_events) {
            return Err(ConfigError::InvalidMaxEvents(self.events.max_events));
        }
        Ok(())
    }
}

/// Returns the default data directory, `~/.local/share/shackle`.
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shackle")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock.log_level, "info");
        assert_eq!(config.hardware.model, HardwareModel::Mock);
        assert_eq!(config.hardware.unlock_pulse_ms, 1000);
        assert_eq!(config.events.max_events, 10_000);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lockd.toml");

        let mut config = Config::default();
        config.lock.name = "Front door".to_string();
        config.hardware.unlock_pulse_ms = 500;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_rejects_invalid_log_level() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lockd.toml");

        let mut config = Config::default();
        config.lock.log_level = "verbose".to_string();
        // Write without validation.
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_pulse() {
        let mut config = Config::default();
        config.hardware.unlock_pulse_ms = 50;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidUnlockPulse(50))
        );

        config.hardware.unlock_pulse_ms = 60_000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidUnlockPulse(60_000))
        );
    }

    #[test]
    fn test_validate_rejects_zero_max_events() {
        let mut config = Config::default();
        config.events.max_events = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxEvents(0)));
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let mut config = Config::default();
        config.lock.name = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyName));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lockd.toml");
        fs::write(&path, "[lock]\nname = \"Side gate\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.lock.name, "Side gate");
        assert_eq!(config.lock.log_level, "info");
        assert_eq!(config.hardware.model, HardwareModel::Mock);
    }
}
