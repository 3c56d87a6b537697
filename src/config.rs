//! Settings file for the `topicwatch` binary
//!
//! ```toml
//! log_level = "info"
//!
//! [connection]
//! broker_uri = "tcp://10.0.0.5:1883"
//! topic = "visitor/count"
//! keep_alive_secs = 60
//!
//! [connection.reconnect]
//! min_delay_ms = 500
//! max_delay_ms = 30000
//! connect_timeout_ms = 10000
//! shutdown_grace_ms = 2000
//!
//! [display]
//! label = "Visitors"
//! ```
//!
//! Missing keys fall back to their defaults, so a file containing only
//! `[connection]` is enough.

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};

use crate::mqtt::config::ConnectionConfig;

const CONFIG_DIR: &str = "topicwatch";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// error, warn, info, debug or trace
    pub log_level: String,
    pub connection: ConnectionConfig,
    pub display: DisplayConfig,
}

/// How received payloads are shown
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Printed in front of every payload, `Visitors: 42`
    pub label: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            label: "Visitors".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            connection: ConnectionConfig::new("tcp://localhost:1883", "visitor/count"),
            display: DisplayConfig::default(),
        }
    }
}

impl Settings {
    /// Reads and parses a settings file
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading settings from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read settings file {}: {}", path.display(), e))?;

        toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse settings file {}: {}", path.display(), e))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| eyre!("Failed to create settings directory: {}", e))?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize settings: {}", e))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write settings file {}: {}", path.display(), e))?;

        info!("Settings written to {}", path.display());
        Ok(())
    }

    /// Writes default settings to `path` unless a file already exists there.
    /// Returns true if the file was created.
    pub async fn ensure_default(path: &Path) -> Result<bool> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if settings file exists: {}", e))?;

        if exists {
            return Ok(false);
        }
        info!("Creating default settings at {}", path.display());
        Settings::default().save(path).await?;
        Ok(true)
    }

    /// Tracing level from `log_level`, INFO for anything unrecognised
    pub fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" | "warning" => Level::WARN,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        }
    }
}

/// `<config dir>/topicwatch/config.toml`
pub fn default_settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}
