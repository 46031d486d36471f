//! Authority configuration.
//!
//! One JSON document with a section per subsystem. Every field has a
//! default, so an empty object (or no file at all) is a valid config.

use anyhow::{Context, Result};
use gamesync_consistency::ValidatorConfig;
use gamesync_realtime::RealtimeConfig;
use gamesync_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    pub http_port: u16,
    /// Directory for persisted snapshots.
    pub data_dir: PathBuf,
    /// Period of the snapshot loop; 0 disables it.
    pub snapshot_interval_ms: u64,
    pub sync: SyncConfig,
    pub realtime: RealtimeConfig,
    pub validator: ValidatorConfig,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            http_port: 4100,
            data_dir: PathBuf::from("gamesync-data"),
            snapshot_interval_ms: 60_000,
            sync: SyncConfig::default(),
            realtime: RealtimeConfig::default(),
            validator: ValidatorConfig::default(),
        }
    }
}

impl AuthorityConfig {
    /// Loads a config file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn snapshot_interval(&self) -> Option<Duration> {
        (self.snapshot_interval_ms > 0).then(|| Duration::from_millis(self.snapshot_interval_ms))
    }
}
