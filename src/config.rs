//! Configuration for the update limit notifier.

use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default message posted when the threshold is reached.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "[Update limit] You are close to the posting limit. \
The limit is expected to lift at {release}. You have posted {count} times in this section.{annotation}";

/// Default strftime format of the release time.
pub const DEFAULT_RELEASE_TIME_FORMAT: &str = "%H:%M:%S";

/// Default text appended when the section start is only estimated.
pub const DEFAULT_INACCURACY_ANNOTATION: &str = " (This limit estimate is inaccurate.)";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Handle of the tracked account
    #[serde(default)]
    pub account: Option<String>,

    /// Notification settings, changeable while tracking
    #[serde(default)]
    pub notify: NotifySettings,

    /// Path for storing activity counters
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("update-limit-notifier");

        Self {
            account: None,
            notify: NotifySettings::default(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.notify.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.notify.validate()?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("update-limit-notifier")
            .join("config.json")
    }

    /// Path of the persisted activity counters.
    pub fn activity_path(&self) -> PathBuf {
        self.data_path.join("activity.json")
    }
}

/// Settings that can be swapped without resetting the tracked section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Posts in a section before a warning is sent
    pub notify_threshold: usize,
    /// Message with `{count}`, `{release}` and `{annotation}` placeholders
    pub message_template: String,
    /// strftime format of the release time
    pub release_time_format: String,
    /// Appended when the section start is an estimate
    pub inaccuracy_annotation: String,
    /// IANA time zone the release time is shown in
    pub time_zone: String,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            notify_threshold: 100,
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
            release_time_format: DEFAULT_RELEASE_TIME_FORMAT.to_string(),
            inaccuracy_annotation: DEFAULT_INACCURACY_ANNOTATION.to_string(),
            time_zone: "UTC".to_string(),
        }
    }
}

impl NotifySettings {
    /// Default settings with another threshold.
    pub fn with_threshold(notify_threshold: usize) -> Self {
        Self {
            notify_threshold,
            ..Self::default()
        }
    }

    /// Check every field that could make a later notification fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notify_threshold == 0 {
            return Err(ConfigError::InvalidThreshold);
        }
        if StrftimeItems::new(&self.release_time_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidTimeFormat(
                self.release_time_format.clone(),
            ));
        }
        self.tz()?;
        Ok(())
    }

    /// The parsed time zone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimeZone(self.time_zone.clone()))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidThreshold,
    InvalidTimeFormat(String),
    InvalidTimeZone(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidThreshold => write!(f, "Notify threshold must be greater than zero"),
            ConfigError::InvalidTimeFormat(fmt) => {
                write!(f, "Invalid release time format: {fmt:?}")
            }
            ConfigError::InvalidTimeZone(tz) => write!(f, "Unknown time zone: {tz}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.notify.notify_threshold, 100);
        assert_eq!(config.notify.time_zone, "UTC");
        assert!(config.account.is_none());
        assert!(config.notify.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let settings = NotifySettings::with_threshold(0);
        assert_eq!(settings.validate(), Err(ConfigError::InvalidThreshold));

        let settings = NotifySettings {
            release_time_format: "%Q".to_string(),
            ..NotifySettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidTimeFormat(_))
        ));

        let settings = NotifySettings {
            time_zone: "Mars/Olympus".to_string(),
            ..NotifySettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidTimeZone(_))
        ));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = std::env::temp_dir()
            .join(format!("update-limit-config-{}", uuid::Uuid::new_v4()))
            .join("config.json");

        let mut config = Config::default();
        config.account = Some("alice".to_string());
        config.notify.notify_threshold = 42;
        config.notify.time_zone = "Asia/Tokyo".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.account.as_deref(), Some("alice"));
        assert_eq!(loaded.notify, config.notify);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("update-limit-does-not-exist.json");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.notify, NotifySettings::default());
    }

    #[test]
    fn test_partial_notify_section_uses_defaults() {
        let json = r#"{"notify": {"notify_threshold": 7}, "data_path": "/tmp/x"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.notify.notify_threshold, 7);
        assert_eq!(config.notify.time_zone, "UTC");
    }
}
