//! Versioned snapshots and the bounded snapshot history.

use gamesync_types::{GameState, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;

/// History ceiling; exceeding it trims back to [`HISTORY_TRIM_TO`].
pub const HISTORY_CAPACITY: usize = 50;
pub const HISTORY_TRIM_TO: usize = 30;

/// A game state captured at a version, with a content checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedSnapshot {
    pub version: u64,
    pub state: GameState,
    pub timestamp: Timestamp,
    /// Hex SHA-256 of the serialized state.
    pub checksum: String,
}

impl VersionedSnapshot {
    pub fn new(version: u64, state: GameState) -> Self {
        let checksum = checksum(&state);
        Self {
            version,
            state,
            timestamp: Timestamp::now(),
            checksum,
        }
    }

    /// Id under which the snapshot is persisted.
    pub fn snapshot_id(&self) -> String {
        format!("snapshot-{:010}", self.version)
    }

    /// Returns true if the checksum still matches the state.
    pub fn verify(&self) -> bool {
        checksum(&self.state) == self.checksum
    }
}

fn checksum(state: &GameState) -> String {
    // serde_json maps are sorted by key, so equal trees hash equally.
    let bytes = serde_json::to_vec(state.as_value()).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Recent snapshots, oldest first.
#[derive(Debug, Default)]
pub struct SnapshotHistory {
    entries: VecDeque<Arc<VersionedSnapshot>>,
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: Arc<VersionedSnapshot>) {
        self.entries.push_back(snapshot);
        if self.entries.len() > HISTORY_CAPACITY {
            let excess = self.entries.len() - HISTORY_TRIM_TO;
            self.entries.drain(..excess);
        }
    }

    pub fn latest(&self) -> Option<Arc<VersionedSnapshot>> {
        self.entries.back().cloned()
    }

    pub fn at(&self, version: u64) -> Option<Arc<VersionedSnapshot>> {
        self.entries.iter().rev().find(|s| s.version == version).cloned()
    }

    pub fn versions(&self) -> Vec<u64> {
        self.entries.iter().map(|s| s.version).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
