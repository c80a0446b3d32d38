//! Configuration types for FilaScale
//!
//! # Architecture
//!
//! A single TOML file holds everything the monitor needs:
//! - [`ConnectionConfig`] - preferred/excluded ports and baud rate
//! - [`TimingConfig`] - timeouts, retry ceiling, reset durations, poll period
//! - [`MonitorConfig`] - selected material and optional event log
//! - [`ThresholdTable`](crate::ThresholdTable) - per-material limits

mod paths;
mod settings;

pub use paths::{default_config_path, default_event_log_path};
pub use settings::{ConnectionConfig, FilaScaleConfig, LinkTiming, MonitorConfig, TimingConfig};
