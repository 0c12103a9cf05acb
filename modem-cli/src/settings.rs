//! Tool configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use modem_core::{ModemOptions, SerialSettings};
use serde::{Deserialize, Serialize};

/// Saved configuration: which port to open and how to drive the modem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_serial")]
    pub serial: SerialSettings,
    #[serde(default)]
    pub modem: ModemOptions,
}

fn default_serial() -> SerialSettings {
    SerialSettings::new(default_port())
}

fn default_port() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else {
        "/dev/ttyUSB0"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: default_serial(),
            modem: ModemOptions::default(),
        }
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".config").join("gsm-modem"))
    }

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load from `path`, or from the default location
    ///
    /// A missing default file yields the defaults. A file named explicitly
    /// must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Save to `path`, or to the default location
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().context("Could not determine config path")?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(path)
    }
}
