//! Link configuration
//!
//! Settings are stored as pretty-printed JSON. Missing fields fall back to
//! their defaults so older files keep loading.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::kinematics::{KinematicsError, KinematicsProcessor, DEFAULT_PULSES_PER_REVOLUTION};
use crate::protocol::DEFAULT_BAUD_RATE;

/// Name of the config file inside the user config directory
const CONFIG_FILE_NAME: &str = "link.json";

/// Errors loading or validating a [`LinkConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for this type
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Encoder settings rejected by the kinematics processor
    #[error("Invalid kinematics settings: {0}")]
    Kinematics(#[from] KinematicsError),

    /// A setting is out of range
    #[error("Invalid setting '{field}': {reason}")]
    Invalid {
        /// Name of the offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_pulses_per_revolution() -> u32 {
    DEFAULT_PULSES_PER_REVOLUTION
}

fn default_poll_interval_ms() -> u64 {
    5
}

fn default_read_chunk_size() -> usize {
    1024
}

fn default_startup_delay_ms() -> u64 {
    2000
}

/// Settings for one controller link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial port name (e.g., "/dev/ttyACM0" or "COM12")
    #[serde(default)]
    pub port_name: String,

    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Encoder resolution used to convert counts to degrees
    #[serde(default = "default_pulses_per_revolution")]
    pub pulses_per_revolution: u32,

    /// Sleep between polls when no bytes are waiting
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on bytes pulled from the stream per read
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Delay after opening the port while the board resets
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: default_baud_rate(),
            pulses_per_revolution: default_pulses_per_revolution(),
            poll_interval_ms: default_poll_interval_ms(),
            read_chunk_size: default_read_chunk_size(),
            startup_delay_ms: default_startup_delay_ms(),
        }
    }
}

impl LinkConfig {
    /// Default location, `<config dir>/encoderlink/link.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("encoderlink").join(CONFIG_FILE_NAME))
    }

    /// Load and validate a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: LinkConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config, creating parent directories as needed
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check every setting, so bad values fail here rather than mid-session
    pub fn validate(&self) -> Result<(), ConfigError> {
        KinematicsProcessor::new(self.pulses_per_revolution)?;

        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "baud_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be at least 1ms so the poller yields".to_string(),
            });
        }
        if self.read_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "read_chunk_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Kinematics processor for the configured encoder resolution
    pub fn processor(&self) -> Result<KinematicsProcessor, ConfigError> {
        Ok(KinematicsProcessor::new(self.pulses_per_revolution)?)
    }

    /// Poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.baud_rate, 1_000_000);
        assert_eq!(config.pulses_per_revolution, 8000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ppr_rejected() {
        let config = LinkConfig {
            pulses_per_revolution: 0,
            ..LinkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Kinematics(KinematicsError::DivisionByZero))
        ));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = LinkConfig {
            poll_interval_ms: 0,
            ..LinkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LinkConfig = serde_json::from_str(r#"{"port_name": "COM12"}"#).unwrap();
        assert_eq!(config.port_name, "COM12");
        assert_eq!(config.pulses_per_revolution, 8000);
        assert_eq!(config.poll_interval_ms, 5);
    }
}
