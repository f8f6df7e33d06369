//! Provider settings
//!
//! Read from `~/.k3d-provider/config.yaml`. Every field is optional; command
//! line flags and environment variables override the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kubeconfig::default_kubeconfig_path;
use crate::runtime::image::{DEFAULT_CHANNEL, DEFAULT_CHANNEL_URL};

/// Default settings file location: ~/.k3d-provider/config.yaml
pub fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".k3d-provider")
        .join("config.yaml")
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to parse settings: {0}")]
    Parse(String),

    #[error("Failed to write settings: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// k3d executable, looked up on PATH when relative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k3d_binary: Option<PathBuf>,

    /// Kubeconfig file that cluster credentials are merged into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// k3s release channel for the default image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,

    /// Skips the channel lookup entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image: Option<String>,
}

/// Values given on the command line or in the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub k3d_binary: Option<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub default_image: Option<String>,
}

impl Settings {
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if overrides.k3d_binary.is_some() {
            self.k3d_binary = overrides.k3d_binary;
        }
        if overrides.kubeconfig.is_some() {
            self.kubeconfig = overrides.kubeconfig;
        }
        if overrides.default_image.is_some() {
            self.default_image = overrides.default_image;
        }
        self
    }

    pub fn k3d_binary(&self) -> PathBuf {
        self.k3d_binary
            .clone()
            .unwrap_or_else(|| PathBuf::from("k3d"))
    }

    pub fn kubeconfig_path(&self) -> PathBuf {
        self.kubeconfig
            .clone()
            .unwrap_or_else(default_kubeconfig_path)
    }

    pub fn image_channel(&self) -> &str {
        self.image_channel.as_deref().unwrap_or(DEFAULT_CHANNEL)
    }

    pub fn channel_url(&self) -> &str {
        self.channel_url.as_deref().unwrap_or(DEFAULT_CHANNEL_URL)
    }
}

// ============================================================================
// SBIO: Pure parsing (no I/O)
// ============================================================================

pub fn parse_settings(content: &str) -> Result<Settings, SettingsError> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(content).map_err(|e| SettingsError::Parse(e.to_string()))
}

pub fn serialize_settings(settings: &Settings) -> Result<String, SettingsError> {
    serde_yaml::to_string(settings).map_err(|e| SettingsError::Write(e.to_string()))
}

// ============================================================================
// I/O boundary
// ============================================================================

/// Load settings, falling back to defaults when the file does not exist
pub fn load_settings_from(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serialize_settings(settings)?)?;
    Ok(())
}
