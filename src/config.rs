//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the water-telemetry.toml
//! file. Endpoint credentials, calibration constants, retry and buffer limits, and the
//! validation policy all live here, so the collector receives one immutable value at
//! construction instead of reading process-wide globals.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "water-telemetry.toml";

/// Errors raised while saving or checking a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("config serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Application configuration loaded from water-telemetry.toml
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Remote data store
    pub endpoint: EndpointConfig,
    /// Serial link to the sensor board
    pub serial: SerialConfig,
    /// Linear corrections applied to raw values
    pub calibration: CalibrationConfig,
    /// Range policy for calibrated values
    pub validation: ValidationConfig,
    /// Retry behaviour for a single payload
    pub delivery: DeliveryConfig,
    /// Retry buffer sizing
    pub buffer: BufferConfig,
    /// Main loop cadence and fallback gating
    pub collector: CollectorConfig,
}

/// REST endpoint of the `sensor_readings` table
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Full resource URL, e.g. `https://<project>.supabase.co/rest/v1/sensor_readings`
    pub url: String,
    /// API key sent both as `apikey` and as a bearer token
    pub api_key: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Serial port settings
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyACM0`, `COM3`) or `auto` to detect the board
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout; an expired read yields an empty line
    pub read_timeout_ms: u64,
    /// Pause after opening the port, the board resets on connect
    pub settle_ms: u64,
}

/// Calibration constants
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// When false, raw values pass through unchanged before validation
    pub enabled: bool,
    pub temp_factor: f64,
    pub temp_offset: f64,
    pub ph_offset: f64,
    /// Temperature (°C) at which pH needs no compensation
    pub reference_temp: f64,
    /// pH units added per °C above the reference temperature
    pub ph_temp_coefficient: f64,
}

/// How calibrated values outside their physical bounds are treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Clamp into bounds, warn, and keep the reading
    Clamp,
    /// Reject the reading and count it toward the error streak
    Strict,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub policy: ValidationPolicy,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Total attempts per payload, including the first
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub retry_delay_secs: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Undelivered payloads kept before the oldest is evicted
    pub capacity: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Pause after an accepted (or simulated) reading
    pub cycle_interval_secs: u64,
    /// Pause after a malformed or rejected reading
    pub invalid_backoff_secs: u64,
    /// Consecutive bad readings that switch the collector to simulation
    pub error_streak_threshold: u32,
    /// Whether simulation may replace a failed sensor
    pub fallback_enabled: bool,
    /// Fixed offset from UTC used for `created_at` (330 = UTC+05:30)
    pub utc_offset_minutes: i32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 5,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: "auto".to_string(),
            baud_rate: 9600,
            read_timeout_ms: 1000,
            settle_ms: 2000,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            enabled: true,
            temp_factor: 1.0,
            temp_offset: 0.0,
            ph_offset: 0.0,
            reference_temp: 25.0,
            ph_temp_coefficient: 0.03,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            policy: ValidationPolicy::Clamp,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig {
            max_attempts: 3,
            retry_delay_secs: 5,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig { capacity: 10 }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            cycle_interval_secs: 300,
            invalid_backoff_secs: 30,
            error_streak_threshold: 5,
            fallback_enabled: true,
            utc_offset_minutes: 330,
        }
    }
}

impl DeliveryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl CollectorConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn invalid_backoff(&self) -> Duration {
        Duration::from_secs(self.invalid_backoff_secs)
    }
}

impl Config {
    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(
                        "Loaded configuration from {} ({:?} validation)",
                        path.display(),
                        config.validation.policy
                    );
                    config
                }
                Err(e) => {
                    warn!("Invalid config file format: {}", e);
                    warn!("Using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                info!(
                    "No config file at {}, using default configuration",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Save current configuration to the given path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Reject settings the collector cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint.url is empty".into()));
        }
        if !self.endpoint.url.starts_with("http://") && !self.endpoint.url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(
                "endpoint.url must start with http:// or https://".into(),
            ));
        }
        if self.delivery.max_attempts == 0 {
            return Err(ConfigError::Invalid("delivery.max_attempts must be >= 1".into()));
        }
        if self.buffer.capacity == 0 {
            return Err(ConfigError::Invalid("buffer.capacity must be >= 1".into()));
        }
        if self.collector.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid(
                "collector.utc_offset_minutes must be within a day".into(),
            ));
        }
        Ok(())
    }
}
