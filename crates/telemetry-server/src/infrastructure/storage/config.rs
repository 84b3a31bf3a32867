//! TOML configuration for the telemetry server.
//!
//! The file is read once at startup and never written back; the server keeps
//! no state on disk.
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 9000
//! broadcast_period_ms = 100
//!
//! [[sensors]]
//! kind = "gpsd"
//! poll_period_ms = 500
//!
//! [[sensors]]
//! kind = "serial_orientation"
//! device_candidates = ["/dev/ttyACM0", "/dev/ttyACM1"]
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, so an empty file (or no file at
//! all) yields a working configuration.  Without a `[[sensors]]` table the
//! server reads gpsd and a serial orientation sensor.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::outbound_queue::DEFAULT_QUEUE_CAPACITY;
use crate::application::sample_reader::ReaderTiming;
use crate::infrastructure::network::ServerSettings;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but makes no sense.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorConfig>,
}

/// Listener, timing and queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// IP address to listen on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pending-connection queue length.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Acceptor wait before re-checking for shutdown.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Deadline for completing a client frame.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_broadcast_period_ms")]
    pub broadcast_period_ms: u64,
    /// Deadline for one broadcast write to one client.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Outbound queue capacity; `0` means unbounded.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Supported sensor backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Gpsd,
    SerialOrientation,
    I2cOrientation,
    SimulatedGps,
    SimulatedOrientation,
}

/// One `[[sensors]]` entry.
///
/// Backend-specific keys are ignored by the other backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorConfig {
    pub kind: SensorKind,
    /// Defaults to 500 ms for GPS and 100 ms for orientation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_period_ms: Option<u64>,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_gpsd_host")]
    pub gpsd_host: String,
    #[serde(default = "default_gpsd_port")]
    pub gpsd_port: u16,
    #[serde(default = "default_device_candidates")]
    pub device_candidates: Vec<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u16,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9000
}
fn default_backlog() -> u32 {
    8
}
fn default_wait_timeout_ms() -> u64 {
    5_000
}
fn default_read_timeout_ms() -> u64 {
    15_000
}
fn default_broadcast_period_ms() -> u64 {
    100
}
fn default_write_timeout_ms() -> u64 {
    5_000
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_backoff_ms() -> u64 {
    1_000
}
fn default_gpsd_host() -> String {
    crate::infrastructure::sensors::gpsd::DEFAULT_GPSD_HOST.to_string()
}
fn default_gpsd_port() -> u16 {
    crate::infrastructure::sensors::gpsd::DEFAULT_GPSD_PORT
}
fn default_device_candidates() -> Vec<String> {
    crate::infrastructure::sensors::serial_orientation::default_candidates()
}
fn default_baud_rate() -> u32 {
    crate::infrastructure::sensors::serial_orientation::DEFAULT_BAUD_RATE
}
fn default_i2c_bus() -> u8 {
    1
}
fn default_i2c_address() -> u16 {
    0x05
}
fn default_sensors() -> Vec<SensorConfig> {
    vec![
        SensorConfig::new(SensorKind::Gpsd),
        SensorConfig::new(SensorKind::SerialOrientation),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sensors: default_sensors(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            backlog: default_backlog(),
            wait_timeout_ms: default_wait_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            broadcast_period_ms: default_broadcast_period_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl SensorConfig {
    /// A sensor of `kind` with every other field at its default.
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            poll_period_ms: None,
            retry_delay_ms: default_retry_delay_ms(),
            backoff_ms: default_backoff_ms(),
            gpsd_host: default_gpsd_host(),
            gpsd_port: default_gpsd_port(),
            device_candidates: default_device_candidates(),
            baud_rate: default_baud_rate(),
            i2c_bus: default_i2c_bus(),
            i2c_address: default_i2c_address(),
        }
    }

    /// Reader timing, filling in the kind-specific poll period.
    pub fn timing(&self) -> ReaderTiming {
        let default_poll_ms = match self.kind {
            SensorKind::Gpsd | SensorKind::SimulatedGps => 500,
            SensorKind::SerialOrientation
            | SensorKind::I2cOrientation
            | SensorKind::SimulatedOrientation => 100,
        };
        ReaderTiming {
            poll_period: Duration::from_millis(self.poll_period_ms.unwrap_or(default_poll_ms)),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

// ── Conversion ────────────────────────────────────────────────────────────────

impl ServerConfig {
    /// Validates the section and converts it into runtime settings.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for an unparsable bind address, or a zero
    /// wait timeout, read timeout or broadcast period.
    pub fn to_settings(&self) -> Result<ServerSettings, ConfigError> {
        let bind_address: IpAddr = self.bind_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("bind_address {:?} is not an IP address", self.bind_address))
        })?;
        for (name, value) in [
            ("wait_timeout_ms", self.wait_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("broadcast_period_ms", self.broadcast_period_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }

        Ok(ServerSettings {
            bind_address,
            port: self.port,
            backlog: self.backlog,
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            broadcast_period: Duration::from_millis(self.broadcast_period_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            queue_capacity: self.queue_capacity,
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the text is not valid for the schema.
pub fn parse_config(text: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Loads configuration from `path`, or returns the defaults when `path` is
/// `None`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if an explicitly given file cannot be read,
/// or [`ConfigError::Parse`] if it is not valid TOML for the schema.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
