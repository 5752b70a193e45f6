//! Configuration file management.
//!
//! The CLI reads `prana.toml` from the platform config directory unless
//! `--config` points elsewhere. Every section is optional; command-line flags
//! override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use prana_core::{PollOptions, SessionConfig, SpeedScale};
use serde::{Deserialize, Serialize};

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which unit to talk to.
    pub device: DeviceSection,
    /// Watch loop settings.
    pub polling: PollingSection,
    /// Fan speed scaling.
    pub fan: FanSection,
    /// Request timing.
    pub session: SessionSection,
}

/// `[device]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// BLE address of the unit.
    pub address: Option<String>,
}

/// `[polling]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    /// Seconds between state requests.
    pub interval_secs: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_secs: prana_core::poller::DEFAULT_POLL_INTERVAL.as_secs(),
        }
    }
}

/// `[fan]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanSection {
    /// Highest speed level used when mapping percentages.
    pub max_speed: u8,
}

impl Default for FanSection {
    fn default() -> Self {
        Self {
            max_speed: prana_core::DEFAULT_MAX_SPEED,
        }
    }
}

/// `[session]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// How long to wait for a state frame, in milliseconds.
    pub response_timeout_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            response_timeout_ms: prana_core::session::DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration.
    ///
    /// Checks that the address (if set) is not blank, the poll interval is
    /// between 1 s and 1 hour, `max_speed` is 1..=10 and the response
    /// timeout is between 100 ms and 60 s.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Some(address) = &self.device.address
            && address.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "device.address".to_string(),
                message: "address cannot be empty".to_string(),
            });
        }

        if !(1..=3600).contains(&self.polling.interval_secs) {
            errors.push(ValidationError {
                field: "polling.interval_secs".to_string(),
                message: format!(
                    "interval {} is out of range (1 - 3600 seconds)",
                    self.polling.interval_secs
                ),
            });
        }

        if let Err(e) = SpeedScale::new(self.fan.max_speed) {
            errors.push(ValidationError {
                field: "fan.max_speed".to_string(),
                message: e.to_string(),
            });
        }

        if !(100..=60_000).contains(&self.session.response_timeout_ms) {
            errors.push(ValidationError {
                field: "session.response_timeout_ms".to_string(),
                message: format!(
                    "timeout {} is out of range (100 - 60000 ms)",
                    self.session.response_timeout_ms
                ),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Session settings derived from the `[session]` section.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .response_timeout(Duration::from_millis(self.session.response_timeout_ms))
    }

    /// Poll options derived from the `[polling]` section.
    pub fn poll_options(&self) -> PollOptions {
        PollOptions::with_interval(Duration::from_secs(self.polling.interval_secs))
    }

    /// Speed scale derived from the `[fan]` section.
    pub fn speed_scale(&self) -> Result<SpeedScale, ConfigError> {
        SpeedScale::new(self.fan.max_speed).map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: "fan.max_speed".to_string(),
                message: e.to_string(),
            }])
        })
    }
}

/// Resolve the device address: explicit argument first, then config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device
        .filter(|d| !d.trim().is_empty())
        .or_else(|| config.device.address.clone())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `fan.max_speed`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prana")
        .join("prana.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.device.address, None);
        assert_eq!(config.polling.interval_secs, 30);
        assert_eq!(config.fan.max_speed, 5);
        assert_eq!(config.session.response_timeout_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parse_full() {
        let toml = r#"
            [device]
            address = "AA:BB:CC:DD:EE:FF"

            [polling]
            interval_secs = 60

            [fan]
            max_speed = 10

            [session]
            response_timeout_ms = 2500
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.device.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(config.polling.interval_secs, 60);
        assert_eq!(config.fan.max_speed, 10);
        assert_eq!(
            config.session_config().response_timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(config.poll_options().interval, Duration::from_secs(60));
        assert_eq!(config.speed_scale().unwrap().max_speed(), 10);
    }

    #[test]
    fn test_config_partial_uses_defaults() {
        let config: Config = toml::from_str("[fan]\nmax_speed = 3\n").unwrap();
        assert_eq!(config.fan.max_speed, 3);
        assert_eq!(config.polling.interval_secs, 30);
        assert_eq!(config.device.address, None);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("prana.toml");

        let config = Config {
            device: DeviceSection {
                address: Some("11:22:33:44:55:66".to_string()),
            },
            polling: PollingSection { interval_secs: 15 },
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load_validated(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/prana.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("prana.toml");
        std::fs::write(&path, "[polling\ninterval_secs = ").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = Config {
            device: DeviceSection {
                address: Some("  ".to_string()),
            },
            polling: PollingSection { interval_secs: 0 },
            fan: FanSection { max_speed: 11 },
            session: SessionSection {
                response_timeout_ms: 10,
            },
        };

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(
                    fields,
                    [
                        "device.address",
                        "polling.interval_secs",
                        "fan.max_speed",
                        "session.response_timeout_ms"
                    ]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_error_display() {
        let error = ConfigError::Validation(vec![ValidationError {
            field: "fan.max_speed".to_string(),
            message: "out of range".to_string(),
        }]);
        let message = error.to_string();
        assert!(message.contains("validation failed"));
        assert!(message.contains("  - fan.max_speed: out of range"));
    }

    #[test]
    fn test_resolve_device_prefers_arg() {
        let config = Config {
            device: DeviceSection {
                address: Some("config-device".to_string()),
            },
            ..Default::default()
        };
        assert_eq!(
            resolve_device(Some("arg-device".to_string()), &config),
            Some("arg-device".to_string())
        );
        assert_eq!(
            resolve_device(None, &config),
            Some("config-device".to_string())
        );
        assert_eq!(resolve_device(None, &Config::default()), None);
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("prana/prana.toml"));
    }
}
