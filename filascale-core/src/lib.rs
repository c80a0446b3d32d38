//! FilaScale Core Library
//!
//! Shared types, thresholds, and configuration for the FilaScale spool monitor.
//! This crate is used by both the hardware transport and the polling daemon.

pub mod config;
pub mod error;
pub mod protocol;
pub mod status;
pub mod thresholds;

// Re-export commonly used types
pub use config::{
    default_config_path, default_event_log_path, ConnectionConfig, FilaScaleConfig, LinkTiming,
    MonitorConfig, TimingConfig,
};
pub use error::*;
pub use protocol::*;
pub use status::{StatusRecord, MAX_SPOOL_ID};
pub use thresholds::{
    evaluate_thresholds, Bound, Quantity, Range, ThresholdSet, ThresholdTable, ThresholdViolation,
};
