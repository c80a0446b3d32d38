//! Monitor configuration loaded once at startup
//!
//! A change of settings means a new connection manager, never mutation in place.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FilaScaleError, Result};
use crate::protocol::DEFAULT_BAUD_RATE;
use crate::thresholds::ThresholdTable;

/// Which serial port to use and how fast to talk to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Port to try first, if it is present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_port: Option<String>,
    /// Port that must never be opened (the printer's own port)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_port: Option<String>,
    /// Serial speed
    pub baud_rate: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            preferred_port: None,
            excluded_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Protocol timing, as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a read waits for new bytes
    pub read_timeout_ms: u64,
    /// Upper bound for handing a frame to the driver
    pub write_timeout_ms: u64,
    /// Reply attempts per exchange
    pub retries: u32,
    /// How long the reset line is held low
    pub reset_hold_ms: u64,
    /// Pause after releasing the reset line
    pub reset_settle_ms: u64,
    /// Poll period
    pub poll_interval_secs: u64,
    /// Log TX/RX frames as hex
    pub debug_uart: bool,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
            retries: 3,
            reset_hold_ms: 2000,
            reset_settle_ms: 4000,
            poll_interval_secs: 5,
            debug_uart: false,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Runtime form of [`TimingConfig`] handed to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub retries: u32,
    pub reset_hold: Duration,
    pub reset_settle: Duration,
    pub debug_uart: bool,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for LinkTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            retries: config.retries,
            reset_hold: Duration::from_millis(config.reset_hold_ms),
            reset_settle: Duration::from_millis(config.reset_settle_ms),
            debug_uart: config.debug_uart,
        }
    }
}

/// What the poll loop watches for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Material loaded in the drybox, key into the threshold table
    pub material: String,
    /// Append connection and status events to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_log: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            material: "PLA".to_string(),
            event_log: None,
        }
    }
}

/// Complete monitor configuration.
///
/// Located at `~/.config/filascale/config.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilaScaleConfig {
    pub connection: ConnectionConfig,
    pub timing: TimingConfig,
    pub monitor: MonitorConfig,
    pub thresholds: ThresholdTable,
}

impl FilaScaleConfig {
    /// Parse from TOML string.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check values the transport layer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.connection.baud_rate == 0 {
            return Err(FilaScaleError::Config("baud_rate must be > 0".to_string()));
        }
        if self.timing.retries == 0 {
            return Err(FilaScaleError::Config("retries must be >= 1".to_string()));
        }
        if self.timing.read_timeout_ms == 0 {
            return Err(FilaScaleError::Config(
                "read_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.timing.poll_interval_secs == 0 {
            return Err(FilaScaleError::Config(
                "poll_interval_secs must be > 0".to_string(),
            ));
        }
        if !self.thresholds.contains(&self.monitor.material) {
            let known: Vec<&str> = self.thresholds.materials().map(String::as_str).collect();
            return Err(FilaScaleError::Config(format!(
                "no thresholds configured for material '{}' (known: {})",
                self.monitor.material,
                known.join(", ")
            )));
        }
        Ok(())
    }

    pub fn link_timing(&self) -> LinkTiming {
        LinkTiming::from(&self.timing)
    }
}
