//! Per-path version vector.
//!
//! Each path of the state tree carries the version of the last write
//! committed there. An incoming write is stale, and therefore a conflict,
//! unless its version is strictly greater than the stored one.
//!
//! The vector is a monotonicity gate, not a lock: writes to the same path
//! either land in increasing version order or surface as conflicts.

use gamesync_types::{StatePath, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Last committed write at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: u64,
    /// Wall-clock time of the committed write.
    pub timestamp: Timestamp,
}

/// Mapping from path to last committed version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionVector {
    entries: HashMap<StatePath, VersionEntry>,
}

impl VersionVector {
    /// Creates an empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the committed version for a path (0 if never written).
    #[must_use]
    pub fn get(&self, path: &StatePath) -> u64 {
        self.entries.get(path).map_or(0, |e| e.version)
    }

    /// Returns the full entry for a path.
    #[must_use]
    pub fn entry(&self, path: &StatePath) -> Option<&VersionEntry> {
        self.entries.get(path)
    }

    /// Returns when the path was last written.
    #[must_use]
    pub fn last_write(&self, path: &StatePath) -> Option<Timestamp> {
        self.entries.get(path).map(|e| e.timestamp)
    }

    /// Returns true if a write at `version` would be stale.
    #[must_use]
    pub fn is_stale(&self, path: &StatePath, version: u64) -> bool {
        version <= self.get(path)
    }

    /// Advances the path to `version`.
    ///
    /// Only moves forward; returns false (and leaves the entry untouched) if
    /// `version` is not strictly greater than the current one.
    pub fn advance(&mut self, path: &StatePath, version: u64, timestamp: Timestamp) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) if version <= entry.version => false,
            Some(entry) => {
                *entry = VersionEntry { version, timestamp };
                true
            }
            None => {
                if version == 0 {
                    return false;
                }
                self.entries
                    .insert(path.clone(), VersionEntry { version, timestamp });
                true
            }
        }
    }

    /// Records a write that settled a conflict without a version bump.
    pub fn touch(&mut self, path: &StatePath, timestamp: Timestamp) {
        if let Some(entry) = self.entries.get_mut(path) {
            if timestamp > entry.timestamp {
                entry.timestamp = timestamp;
            }
        }
    }

    /// Merges another vector into this one, taking the maximum per path.
    pub fn merge(&mut self, other: &Self) {
        for (path, entry) in &other.entries {
            self.advance(path, entry.version, entry.timestamp);
        }
    }

    /// Returns all paths and their entries.
    pub fn paths(&self) -> impl Iterator<Item = (&StatePath, &VersionEntry)> {
        self.entries.iter()
    }

    /// Returns the number of tracked paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no path has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
