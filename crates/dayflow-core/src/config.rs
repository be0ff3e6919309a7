//! Engine configuration.
//!
//! A small TOML file holding the deployment's scheduling zone and the
//! default working window. Times are `HH:MM` strings in the scheduling
//! zone, the same shape they take on the wire.

use std::fs;
use std::path::Path;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::clock::parse_hhmm;
use crate::error::{ConfigError, ValidationError};

/// Minimum accepted break duration in minutes.
pub const MIN_BREAK_MINUTES: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// IANA name of the zone all dates and windows are interpreted in.
    pub scheduling_zone: Tz,
    /// Default working-window start, `HH:MM`.
    pub day_start: String,
    /// Default working-window end, `HH:MM`.
    pub day_end: String,
    /// Breaks shorter than this are rejected.
    pub min_break_minutes: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            scheduling_zone: Tz::UTC,
            day_start: "09:00".to_string(),
            day_end: "17:00".to_string(),
            min_break_minutes: MIN_BREAK_MINUTES,
        }
    }
}

impl CoreConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: CoreConfig = toml::from_str(&text).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when absent.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        fs::write(path, text).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let as_config_err = |field: &str, e: ValidationError| ConfigError::InvalidValue {
            key: field.to_string(),
            message: e.to_string(),
        };
        parse_hhmm(&self.day_start).map_err(|e| as_config_err("day_start", e))?;
        parse_hhmm(&self.day_end).map_err(|e| as_config_err("day_end", e))?;
        if self.min_break_minutes < 1 {
            return Err(ConfigError::InvalidValue {
                key: "min_break_minutes".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Default window start as a clock time.
    pub fn day_start_time(&self) -> Result<NaiveTime, ValidationError> {
        parse_hhmm(&self.day_start)
    }

    /// Default window end as a clock time.
    pub fn day_end_time(&self) -> Result<NaiveTime, ValidationError> {
        parse_hhmm(&self.day_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduling_zone, Tz::UTC);
        assert_eq!(config.day_start_time().unwrap().to_string(), "09:00:00");
    }

    #[test]
    fn toml_roundtrip_keeps_zone_name() {
        let mut config = CoreConfig::default();
        config.scheduling_zone = chrono_tz::Europe::Berlin;
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("Europe/Berlin"));
        let back: CoreConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.scheduling_zone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn malformed_window_time_is_rejected() {
        let mut config = CoreConfig::default();
        config.day_start = "nine".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = std::env::temp_dir().join("dayflow_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let mut config = CoreConfig::default();
        config.day_end = "18:30".to_string();
        config.save(&path).unwrap();
        let back = CoreConfig::load(&path).unwrap();
        assert_eq!(back.day_end, "18:30");
        std::fs::remove_dir_all(dir).unwrap();
    }
}
