//! Default path resolution for configuration files
//!
//! Uses XDG Base Directory specification when available, with sensible fallbacks.

use std::path::PathBuf;

/// Returns the default path for the configuration file.
///
/// Uses XDG config directory if available:
/// - Linux/macOS: `~/.config/filascale/config.toml`
/// - Fallback: `/etc/filascale/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("filascale")
        .join("config.toml")
}

/// Returns the default location of the human-readable event log.
///
/// - Linux/macOS: `~/.local/share/filascale/events.log`
/// - Fallback: `/var/lib/filascale/events.log`
pub fn default_event_log_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("filascale")
        .join("events.log")
}
