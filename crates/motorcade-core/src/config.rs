use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;
use crate::traits::SettingsSink;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_port() -> u16 {
    2000
}
const fn default_timeout_ms() -> u64 {
    10_000
}
const fn default_true() -> bool {
    true
}
const fn default_number_of_vehicles() -> u32 {
    15
}
const fn default_number_of_pedestrians() -> u32 {
    30
}
const fn default_seed() -> u64 {
    123_456_789
}

// ---------------------------------------------------------------------------
// ServerSettings
// ---------------------------------------------------------------------------

/// Transport-facing settings for one episode session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// TCP port the session listens on (default: 2000).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Session timeout in milliseconds for blocking operations (default: 10000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// When true the tick loop blocks on the client's control command;
    /// when false a missing command is skipped with a warning.
    #[serde(default = "default_true")]
    pub synchronous_mode: bool,

    /// Include non-player agents in measurement snapshots.
    #[serde(default = "default_true")]
    pub send_non_player_agents: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            synchronous_mode: default_true(),
            send_non_player_agents: default_true(),
        }
    }
}

impl ServerSettings {
    /// Session timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// LevelSettings
// ---------------------------------------------------------------------------

/// World population and weather settings for one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSettings {
    #[serde(default = "default_number_of_vehicles")]
    pub number_of_vehicles: u32,

    #[serde(default = "default_number_of_pedestrians")]
    pub number_of_pedestrians: u32,

    /// Weather preset id; negative selects the level default.
    #[serde(default)]
    pub weather_id: i32,

    #[serde(default = "default_seed")]
    pub seed_vehicles: u64,

    #[serde(default = "default_seed")]
    pub seed_pedestrians: u64,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            number_of_vehicles: default_number_of_vehicles(),
            number_of_pedestrians: default_number_of_pedestrians(),
            weather_id: 0,
            seed_vehicles: default_seed(),
            seed_pedestrians: default_seed(),
        }
    }
}

// ---------------------------------------------------------------------------
// EpisodeSettings
// ---------------------------------------------------------------------------

/// Complete episode settings, loaded from TOML at startup and replaced by
/// the configuration blob the client sends with each episode request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSettings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub level: LevelSettings,
}

impl EpisodeSettings {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(self.server.timeout_ms));
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }

    /// Parse from TOML text.
    pub fn from_text(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_text(&content)
    }
}

impl SettingsSink for EpisodeSettings {
    /// Replace the settings with the received blob. A malformed blob keeps
    /// the previous settings; the protocol never sees the failure.
    fn load_text(&mut self, text: &str) {
        match Self::from_text(text) {
            Ok(settings) => *self = settings,
            Err(e) => warn!("ignoring malformed episode settings: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
