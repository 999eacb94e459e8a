//! Configuration system for helpnet.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $HELPNET_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/helpnet/config.toml
//!   3. ~/.config/helpnet/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::topic::DEFAULT_NETWORK_NAME;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpnetConfig {
    pub network: NetworkConfig,
    pub session: SessionConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Human-readable network name. Hashed into the discovery topic.
    pub name: String,
    /// Network interface for multicast. Empty = OS default.
    pub interface: String,
    /// UDP port announcements are sent to and received on.
    pub announce_port: u16,
    /// TCP port for inbound links. 0 = OS-assigned.
    pub link_port: u16,
    /// Look up announcers on the topic and dial them.
    pub discoverable: bool,
    /// Advertise this node and accept inbound links.
    pub announce: bool,
    /// Seconds between announcements.
    pub announce_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frames queued per peer before writes start failing with `Full`.
    pub outbound_queue: usize,
    /// Frames queued per peer between the socket and the session.
    pub inbound_queue: usize,
    /// Session events buffered for slow subscribers.
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Port of the local HTTP API (bound to 127.0.0.1).
    pub port: u16,
    /// Chat/SOS entries kept for `GET /api/messages`.
    pub message_history: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NETWORK_NAME.to_string(),
            interface: String::new(),
            announce_port: 9000,
            link_port: 0,
            discoverable: true,
            announce: true,
            announce_interval_secs: 2,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 64,
            inbound_queue: 256,
            event_buffer: 256,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 9001,
            message_history: 500,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("helpnet")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl HelpnetConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            HelpnetConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("HELPNET_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&HelpnetConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply HELPNET_* overrides. `lookup` is `std::env::var` outside tests.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("HELPNET_NETWORK__NAME") {
            self.network.name = v;
        }
        if let Some(v) = lookup("HELPNET_NETWORK__INTERFACE") {
            self.network.interface = v;
        }
        if let Some(p) = lookup("HELPNET_NETWORK__LINK_PORT").and_then(|v| v.parse().ok()) {
            self.network.link_port = p;
        }
        if let Some(v) = lookup("HELPNET_NETWORK__DISCOVERABLE") {
            self.network.discoverable = v == "true" || v == "1";
        }
        if let Some(v) = lookup("HELPNET_NETWORK__ANNOUNCE") {
            self.network.announce = v == "true" || v == "1";
        }
        if let Some(p) = lookup("HELPNET_API__PORT").and_then(|v| v.parse().ok()) {
            self.api.port = p;
        }
    }
}
