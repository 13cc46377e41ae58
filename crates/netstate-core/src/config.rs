//! Configuration for NetState.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $NETSTATE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/netstate/config.toml
//!   3. ~/.config/netstate/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::{ANNOUNCE_INTERVAL_SECS, ANNOUNCE_PORT, PEER_TTL_SECS};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetStateConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    /// Resources this process publishes at startup.
    pub registrations: Vec<RegistrationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Member identifier shared by every registration and the notifiers
    /// of this process. Empty = generate one per run.
    pub member_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network interface name. Empty = use the command-line argument.
    pub interface: String,
    /// UDP port announcements are sent to and received on.
    pub port: u16,
    /// Seconds between re-announcements of each live registration.
    pub announce_interval_secs: u64,
    /// Seconds after which a silent peer is dropped.
    pub peer_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub group: String,
    pub name: String,
    /// Initial state, published as UTF-8 bytes.
    #[serde(default)]
    pub state: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            port: ANNOUNCE_PORT,
            announce_interval_secs: ANNOUNCE_INTERVAL_SECS,
            peer_ttl_secs: PEER_TTL_SECS,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("netstate")
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
    #[error("{0}: {1} must be at least 1")]
    ZeroInterval(PathBuf, &'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl NetStateConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path, falling back to defaults if it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            Self::parse(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            NetStateConfig::default()
        };
        config.apply_env_overrides();
        config.validate(path)?;
        Ok(config)
    }

    /// Reject values the daemon's timers cannot run with.
    fn validate(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if self.network.announce_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval(
                path.to_path_buf(),
                "network.announce_interval_secs",
            ));
        }
        if self.network.peer_ttl_secs == 0 {
            return Err(ConfigError::ZeroInterval(path.to_path_buf(), "network.peer_ttl_secs"));
        }
        Ok(())
    }

    /// Parse config text without touching the environment.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("NETSTATE_CONFIG")
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
            let text = toml::to_string_pretty(&NetStateConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply NETSTATE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NETSTATE_IDENTITY__MEMBER_ID") {
            self.identity.member_id = v;
        }
        if let Ok(v) = std::env::var("NETSTATE_NETWORK__INTERFACE") {
            self.network.interface = v;
        }
        if let Ok(v) = std::env::var("NETSTATE_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
    }
}
