//! Daemon configuration loading
//!
//! The TOML file is read once at startup (and created with defaults when
//! missing), then command-line overrides are layered on top.

use filascale_core::{
    default_config_path, default_event_log_path, FilaScaleConfig, FilaScaleError, Result,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "FILASCALE_CONFIG";

/// Command-line values that take precedence over the config file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Serial port to try first (e.g., /dev/ttyUSB1)
    #[arg(long, value_name = "PATH")]
    pub port: Option<String>,

    /// Serial port never to open, normally the printer's
    #[arg(long, value_name = "PATH")]
    pub exclude: Option<String>,

    /// Baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Material loaded in the drybox (key into [thresholds])
    #[arg(long)]
    pub material: Option<String>,

    /// Append connection and threshold events to a file
    #[arg(long, value_name = "PATH")]
    pub event_log: Option<PathBuf>,

    /// Append events to the default event log in the data directory
    #[arg(long, conflicts_with = "event_log")]
    pub event_log_default: bool,

    /// Seconds between status polls
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Log every frame sent and received as hex
    #[arg(long)]
    pub debug_uart: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut FilaScaleConfig) {
        if let Some(port) = &self.port {
            config.connection.preferred_port = Some(port.clone());
        }
        if let Some(exclude) = &self.exclude {
            config.connection.excluded_port = Some(exclude.clone());
        }
        if let Some(baud) = self.baud {
            config.connection.baud_rate = baud;
        }
        if let Some(material) = &self.material {
            config.monitor.material = material.clone();
        }
        if let Some(event_log) = &self.event_log {
            config.monitor.event_log = Some(event_log.clone());
        } else if self.event_log_default {
            config.monitor.event_log = Some(default_event_log_path());
        }
        if let Some(interval) = self.interval {
            config.timing.poll_interval_secs = interval;
        }
        if self.debug_uart {
            config.timing.debug_uart = true;
        }
    }
}

/// Config path: CLI flag > env var > default
pub fn resolve_config_path(cli: Option<PathBuf>) -> PathBuf {
    cli.unwrap_or_else(|| {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path())
    })
}

/// Load the config file, creating it with defaults if missing.
pub async fn load_config(path: &Path) -> Result<FilaScaleConfig> {
    if !path.exists() {
        info!(
            "Config not found at {}. Creating with defaults.",
            path.display()
        );

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                FilaScaleError::Config(format!(
                    "Failed to create config directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let config = FilaScaleConfig::default();
        let toml_str = config
            .to_toml()
            .map_err(|e| FilaScaleError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, &toml_str)
            .await
            .map_err(|e| FilaScaleError::Config(format!("Failed to write config file: {}", e)))?;

        return Ok(config);
    }

    info!("Loading configuration from: {}", path.display());
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| FilaScaleError::Config(format!("Failed to read config file: {}", e)))?;

    FilaScaleConfig::from_toml(&content)
        .map_err(|e| FilaScaleError::Config(format!("Failed to parse config file: {}", e)))
}
