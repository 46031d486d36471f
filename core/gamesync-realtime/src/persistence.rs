//! Persistence seam for snapshots.
//!
//! The session layer hands settled snapshots to a [`Persistence`]
//! implementation; durable storage lives outside this crate.

use crate::snapshot::VersionedSnapshot;
use async_trait::async_trait;
use thiserror::Error;

/// Result type for persistence operations.
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// Errors a persistence backend can report.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend refused the snapshot (validation, quota, ...).
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Durable snapshot storage.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Stores a snapshot under `snapshot_id`, replacing any previous one.
    async fn save(&self, snapshot_id: &str, snapshot: &VersionedSnapshot) -> PersistenceResult<()>;

    /// Loads a snapshot. Returns `Ok(None)` if nothing is stored under the id.
    async fn load(&self, snapshot_id: &str) -> PersistenceResult<Option<VersionedSnapshot>>;
}

/// An in-memory persistence backend for testing.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Stores snapshots in a map; saves can be made to fail on demand.
    #[derive(Debug, Default)]
    pub struct MemoryPersistence {
        snapshots: Mutex<HashMap<String, VersionedSnapshot>>,
        fail_saves: AtomicBool,
    }

    impl MemoryPersistence {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent save fail (or succeed again).
        pub fn set_fail_saves(&self, fail: bool) {
            self.fail_saves.store(fail, Ordering::SeqCst);
        }

        /// Ids of stored snapshots, sorted.
        pub fn snapshot_ids(&self) -> Vec<String> {
            let mut ids: Vec<_> = self
                .snapshots
                .lock()
                .map(|s| s.keys().cloned().collect())
                .unwrap_or_default();
            ids.sort();
            ids
        }
    }

    #[async_trait]
    impl Persistence for MemoryPersistence {
        async fn save(&self, snapshot_id: &str, snapshot: &VersionedSnapshot) -> PersistenceResult<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(PersistenceError::Backend("injected save failure".into()));
            }
            self.snapshots
                .lock()
                .map_err(|_| PersistenceError::Backend("store poisoned".into()))?
                .insert(snapshot_id.to_string(), snapshot.clone());
            Ok(())
        }

        async fn load(&self, snapshot_id: &str) -> PersistenceResult<Option<VersionedSnapshot>> {
            let snapshots = self
                .snapshots
                .lock()
                .map_err(|_| PersistenceError::Backend("store poisoned".into()))?;
            Ok(snapshots.get(snapshot_id).cloned())
        }
    }
}
