//! Snapshot persistence backends for the authority.

use async_trait::async_trait;
use gamesync_consistency::{ConsistencyContext, ConsistencyValidator};
use gamesync_realtime::{Persistence, PersistenceError, PersistenceResult, VersionedSnapshot};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

/// Stores each snapshot as `<dir>/<snapshot_id>.json`.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, snapshot_id: &str) -> PathBuf {
        self.dir.join(format!("{snapshot_id}.json"))
    }

    /// Loads the snapshot with the highest version, if any.
    pub async fn latest(&self) -> PersistenceResult<Option<VersionedSnapshot>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(id.to_string());
            }
        }
        // Snapshot ids are zero-padded, so lexical order is version order.
        ids.sort();
        match ids.last() {
            Some(id) => self.load(id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Persistence for FilePersistence {
    async fn save(&self, snapshot_id: &str, snapshot: &VersionedSnapshot) -> PersistenceResult<()> {
        fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let target = self.file_for(snapshot_id);
        let staging = self.dir.join(format!(".{snapshot_id}.tmp"));
        fs::write(&staging, &bytes).await?;
        fs::rename(&staging, &target).await?;
        debug!("Wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }

    async fn load(&self, snapshot_id: &str) -> PersistenceResult<Option<VersionedSnapshot>> {
        let bytes = match fs::read(self.file_for(snapshot_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: VersionedSnapshot = serde_json::from_slice(&bytes)?;
        if !snapshot.verify() {
            return Err(PersistenceError::Rejected(format!(
                "checksum mismatch in {snapshot_id}"
            )));
        }
        Ok(Some(snapshot))
    }
}

/// Refuses to save snapshots that fail consistency validation.
pub struct ValidatingPersistence {
    inner: Arc<dyn Persistence>,
    validator: Arc<ConsistencyValidator>,
}

impl ValidatingPersistence {
    pub fn new(inner: Arc<dyn Persistence>, validator: Arc<ConsistencyValidator>) -> Self {
        Self { inner, validator }
    }
}

#[async_trait]
impl Persistence for ValidatingPersistence {
    async fn save(&self, snapshot_id: &str, snapshot: &VersionedSnapshot) -> PersistenceResult<()> {
        let context = ConsistencyContext {
            trigger: Some("pre_save".into()),
            ..Default::default()
        };
        let result = self.validator.check_consistency(&snapshot.state, &context);
        if !result.is_valid {
            let first = result
                .violations
                .iter()
                .find(|v| v.severity.blocks_validity())
                .map(|v| format!("{} at `{}`", v.rule_id, v.path))
                .unwrap_or_default();
            warn!("Refusing to persist {}: {}", snapshot_id, first);
            return Err(PersistenceError::Rejected(format!(
                "{} blocking violations, first: {}",
                result.metrics.critical + result.metrics.errors,
                first
            )));
        }
        self.inner.save(snapshot_id, snapshot).await
    }

    async fn load(&self, snapshot_id: &str) -> PersistenceResult<Option<VersionedSnapshot>> {
        self.inner.load(snapshot_id).await
    }
}
