//! Status publishing
//!
//! Sinks receive the latest status with its threshold violations after every
//! poll, plus connection lifecycle events.

use async_trait::async_trait;
use filascale_core::{FilaScaleError, Result, StatusRecord, ThresholdViolation};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Consumer of monitor output
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Device found on `port`
    async fn connected(&self, _port: &str) {}

    /// Session to the device ended
    async fn disconnected(&self, _reason: &str) {}

    /// Device reset after it stopped answering
    async fn device_reset(&self) {}

    /// Latest known status and its out-of-range conditions
    async fn publish(&self, status: &StatusRecord, violations: &[ThresholdViolation]);
}

/// Publishes through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl StatusSink for LogSink {
    async fn publish(&self, status: &StatusRecord, violations: &[ThresholdViolation]) {
        info!(
            "Spool {} ({}): {:.1} C, {:.1} %RH, {:.0} g",
            status.spool_id,
            status.printer_name,
            status.temperature,
            status.humidity,
            status.weight
        );
        for violation in violations {
            warn!("Threshold exceeded on spool {}: {}", status.spool_id, violation);
        }
    }
}

/// Appends one line per event to a text file
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Open (creating parent directories) the log at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    FilaScaleError::Config(format!(
                        "Failed to create event log directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        info!("Event log: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `message` with a unix timestamp.
    pub async fn record(&self, message: &str) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{} {}\n", timestamp, message).as_bytes())
            .await?;
        file.flush().await?;
        Ok(())
    }

    async fn record_logged(&self, message: &str) {
        if let Err(e) = self.record(message).await {
            warn!(
                "Failed to write event log {}: {}",
                self.path().display(),
                e
            );
        } else {
            debug!("Event: {}", message);
        }
    }
}

#[async_trait]
impl StatusSink for EventLog {
    async fn connected(&self, port: &str) {
        self.record_logged(&format!("connected {}", port)).await;
    }

    async fn disconnected(&self, reason: &str) {
        self.record_logged(&format!("disconnected ({})", reason))
            .await;
    }

    async fn device_reset(&self) {
        self.record_logged("reset").await;
    }

    /// Only out-of-range readings are worth a line
    async fn publish(&self, status: &StatusRecord, violations: &[ThresholdViolation]) {
        for violation in violations {
            self.record_logged(&format!("spool {} {}", status.spool_id, violation))
                .await;
        }
    }
}
