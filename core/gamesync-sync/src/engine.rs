//! Sync engine: the versioned, conflict-resolving commit path.
//!
//! The engine exclusively owns the authoritative state, the version vector
//! and the operation queue. Every operation, whether committed immediately
//! or drained from the batch queue, goes through the same
//! detect → resolve → apply → advance sequence.

use crate::applicator::{ApplicatorResult, PathApplicator, StateApplicator};
use crate::config::{ResolutionPolicy, SyncConfig, SyncStrategy};
use crate::conflict::{self, ConflictQueue, ConflictResolution, PendingConflict, Resolved, SyncConflict};
use crate::error::{Result, SyncError};
use crate::metrics::{MetricsTracker, OperationRecord, SyncMetrics};
use crate::observer::{NoopObserver, StateChange, SyncFailure, SyncObserver};
use crate::queue::{OperationQueue, QueuedOperation};
use crate::result::SyncResult;
use crate::version_vector::VersionVector;
use gamesync_types::{
    ConflictId, GameState, OperationId, OperationMetadata, OperationType, Priority, StatePath,
    SyncOperation, Timestamp,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Source tag used for full-state replacement operations.
pub const FULL_STATE_SOURCE: &str = "full_state";

/// Authoritative state and its version vector, guarded together.
struct Authority {
    state: GameState,
    versions: VersionVector,
}

/// Resets the in-flight flag when a drain finishes or is cancelled.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The synchronization engine.
pub struct SyncEngine {
    config: SyncConfig,
    authority: RwLock<Authority>,
    queue: Mutex<OperationQueue>,
    conflicts: Mutex<ConflictQueue>,
    metrics: Mutex<MetricsTracker>,
    applicator: Arc<dyn StateApplicator>,
    observer: Arc<dyn SyncObserver>,
    /// Guards the batch-drain critical section.
    is_syncing: AtomicBool,
}

impl SyncEngine {
    /// Creates an engine over an empty state.
    pub fn new(config: SyncConfig) -> Self {
        Self::with_state(config, GameState::empty())
    }

    /// Creates an engine over an existing state.
    pub fn with_state(config: SyncConfig, state: GameState) -> Self {
        let conflicts = ConflictQueue::new(config.max_pending_conflicts, config.conflict_ttl());
        let metrics = MetricsTracker::new(config.metrics_window());
        Self {
            config,
            authority: RwLock::new(Authority {
                state,
                versions: VersionVector::new(),
            }),
            queue: Mutex::new(OperationQueue::new()),
            conflicts: Mutex::new(conflicts),
            metrics: Mutex::new(metrics),
            applicator: Arc::new(PathApplicator),
            observer: Arc::new(NoopObserver),
            is_syncing: AtomicBool::new(false),
        }
    }

    /// Replaces the state applicator.
    #[must_use]
    pub fn with_applicator(mut self, applicator: Arc<dyn StateApplicator>) -> Self {
        self.applicator = applicator;
        self
    }

    /// Replaces the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the strategy in force.
    pub fn strategy(&self) -> SyncStrategy {
        self.config.effective_strategy()
    }

    /// Returns true while a batch drain is running.
    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    // ── Contract ─────────────────────────────────────────────────

    /// Synchronizes one change at `path`.
    ///
    /// The operation type is inferred: no new value is a delete, no old
    /// value is a create, otherwise an update. Under batched strategies the
    /// result only reports that the change was queued.
    pub async fn sync_change(
        &self,
        path: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        metadata: OperationMetadata,
    ) -> SyncResult {
        let op_type = match (&old_value, &new_value) {
            (_, None) => OperationType::Delete,
            (None, Some(_)) => OperationType::Create,
            (Some(_), Some(_)) => OperationType::Update,
        };
        let op = SyncOperation::new(op_type, path, old_value, new_value, metadata);
        self.dispatch(op).await
    }

    /// Synchronizes several operations in order.
    pub async fn sync_batch(&self, operations: Vec<SyncOperation>) -> Vec<SyncResult> {
        let mut results = Vec::with_capacity(operations.len());
        for op in operations {
            results.push(self.dispatch(op).await);
        }
        results
    }

    /// Replaces the whole state. Always committed immediately.
    ///
    /// The root version is assigned under the state lock, so concurrent
    /// full-state syncs commit one after another instead of conflicting.
    pub async fn sync_full_state(&self, snapshot: GameState) -> SyncResult {
        let op = SyncOperation::update(
            "",
            snapshot.into_value(),
            OperationMetadata::new(FULL_STATE_SOURCE, 0).with_priority(Priority::Critical),
        );
        self.commit(op, true).await
    }

    /// Applies a change produced elsewhere. Remote changes bypass the queue.
    pub async fn handle_remote_change(&self, operation: SyncOperation) -> SyncResult {
        debug!(
            "Remote change {} from {} at `{}` v{}",
            operation.id, operation.metadata.source, operation.path, operation.metadata.version
        );
        self.process(operation).await
    }

    /// Commits an operation and waits for its settled result, whatever the
    /// strategy. Under batched strategies this resolves once a drain
    /// processes the operation.
    pub async fn submit(&self, operation: SyncOperation) -> SyncResult {
        if self.strategy() == SyncStrategy::Immediate {
            return self.process(operation).await;
        }
        let id = operation.id;
        let (tx, rx) = oneshot::channel();
        if let Err(rejected) = self.enqueue(operation, Some(tx)).await {
            return rejected;
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => SyncResult::failed(id, Duration::ZERO, SyncError::ChannelClosed.to_string()),
        }
    }

    /// Withdraws a queued operation before a drain reaches it.
    ///
    /// Its waiter, if any, receives a failed result. Returns false when the
    /// operation is not queued: it was never enqueued, or a drain has already
    /// taken it and it will settle normally.
    pub async fn cancel(&self, id: OperationId) -> bool {
        let Some(entry) = self.queue.lock().await.remove(id) else {
            return false;
        };
        debug!("Withdrew queued operation {}", id);
        if let Some(waiter) = entry.waiter {
            let _ = waiter.send(SyncResult::failed(id, Duration::ZERO, SyncError::Withdrawn.to_string()));
        }
        true
    }

    async fn dispatch(&self, op: SyncOperation) -> SyncResult {
        match self.strategy() {
            SyncStrategy::Immediate => self.process(op).await,
            SyncStrategy::Batched | SyncStrategy::Scheduled => {
                let id = op.id;
                match self.enqueue(op, None).await {
                    Ok(()) => SyncResult::queued(id),
                    Err(rejected) => rejected,
                }
            }
        }
    }

    // ── Batching ─────────────────────────────────────────────────

    async fn enqueue(
        &self,
        op: SyncOperation,
        waiter: Option<oneshot::Sender<SyncResult>>,
    ) -> std::result::Result<(), SyncResult> {
        let started = Instant::now();
        if let Err(e) = validate_shape(&op) {
            return Err(self.fail(&op, None, started, e, None).await);
        }

        let len = {
            let mut queue = self.queue.lock().await;
            if queue.len() >= self.config.max_queue_len {
                drop(queue);
                let err = SyncError::QueueFull(self.config.max_queue_len);
                return Err(self.fail(&op, None, started, err, None).await);
            }
            debug!("Queued operation {} at `{}`", op.id, op.path);
            queue.push(QueuedOperation {
                operation: op,
                waiter,
            });
            queue.len()
        };

        if self.strategy() == SyncStrategy::Batched && len >= self.config.batch_size {
            self.drain_batch().await;
        }
        Ok(())
    }

    /// Drains up to `batch_size` queued operations through the commit path.
    ///
    /// Returns immediately with no results if another drain is in flight.
    pub async fn drain_batch(&self) -> Vec<SyncResult> {
        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Batch drain already in flight; skipping");
            return Vec::new();
        }
        let _guard = DrainGuard(&self.is_syncing);

        let batch = self.queue.lock().await.pop_batch(self.config.batch_size);
        let mut results = Vec::with_capacity(batch.len());
        for entry in batch {
            let result = self.process(entry.operation).await;
            if let Some(waiter) = entry.waiter {
                let _ = waiter.send(result.clone());
            }
            results.push(result);
        }

        if !results.is_empty() {
            let failed = results.iter().filter(|r| !r.success).count();
            info!("Drained batch of {} operations ({} failed)", results.len(), failed);
        }
        results
    }

    /// Spawns the periodic drain loop. The loop exits once the engine is dropped.
    pub fn spawn_batch_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.batch_interval().max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else {
                    debug!("Engine dropped; batch loop exiting");
                    break;
                };
                if engine.queue_len().await > 0 {
                    engine.drain_batch().await;
                }
                engine.purge_expired_conflicts().await;
            }
        })
    }

    // ── Commit path ──────────────────────────────────────────────

    async fn process(&self, op: SyncOperation) -> SyncResult {
        self.commit(op, false).await
    }

    /// With `next_version` set the operation takes the version after the
    /// committed one at its path, read under the same lock that commits it.
    async fn commit(&self, mut op: SyncOperation, next_version: bool) -> SyncResult {
        let started = Instant::now();
        let path = match validate_shape(&op) {
            Ok(path) => path,
            Err(e) => return self.fail(&op, None, started, e, None).await,
        };

        let mut authority = self.authority.write().await;
        if next_version {
            op.metadata.version = authority.versions.get(&path) + 1;
            info!("Assigned version {} at `{}`", op.metadata.version, path);
        }
        let previous = authority.state.value_at(&path).cloned();
        let committed = authority.versions.get(&path);

        let mut conflicts = Vec::new();
        let plan = if authority.versions.is_stale(&path, op.version()) {
            let local = previous.clone().unwrap_or(Value::Null);
            let remote = op.new_value.clone().unwrap_or(Value::Null);
            let mut detected = SyncConflict::new(
                path.clone(),
                local.clone(),
                remote.clone(),
                format!(
                    "version {} is not greater than committed version {}",
                    op.version(),
                    committed
                ),
            );
            let policy = self.config.conflict_resolution;
            let last_write = authority.versions.last_write(&path);

            match conflict::resolve(policy, &local, last_write, &remote, op.timestamp) {
                Some(resolved) => {
                    let value = match &resolved {
                        Resolved::KeepLocal => local,
                        Resolved::TakeRemote => remote,
                        Resolved::Merged(merged) => merged.clone(),
                    };
                    debug!("Conflict at `{}` auto-resolved ({:?})", path, policy);
                    detected.settle(ConflictResolution::Auto, value);
                    conflicts.push(detected);
                    resolved
                }
                None => {
                    drop(authority);
                    return self.defer_to_manual(op, path, detected, previous, started).await;
                }
            }
        } else {
            Resolved::TakeRemote
        };

        let applied = match &plan {
            Resolved::KeepLocal => Ok(false),
            Resolved::Merged(merged) if op.op_type != OperationType::Batch => {
                let as_update = SyncOperation {
                    op_type: OperationType::Update,
                    ..op.clone()
                };
                self.apply_to(&mut authority, &path, &as_update, Some(merged))
            }
            Resolved::TakeRemote | Resolved::Merged(_) => {
                self.apply_to(&mut authority, &path, &op, op.new_value.as_ref())
            }
        };

        match applied {
            Ok(applied) => {
                if conflicts.is_empty() {
                    authority.versions.advance(&path, op.version(), op.timestamp);
                } else if applied {
                    authority.versions.touch(&path, op.timestamp);
                }
                let current = authority.state.value_at(&path).cloned();
                let version = authority.versions.get(&path);
                drop(authority);

                for c in &conflicts {
                    self.observer.on_conflict(c);
                }
                if applied {
                    self.observer.on_state_changed(&StateChange {
                        operation_id: op.id,
                        path: path.clone(),
                        value: current.clone(),
                        previous,
                        version,
                        source: op.metadata.source.clone(),
                        timestamp: Timestamp::now(),
                    });
                }

                let mut result = SyncResult::settled(op.id, started.elapsed(), applied)
                    .with_conflicts(conflicts);
                if !applied {
                    result = result.with_rollback(current);
                }
                self.record(&op, Some(path), &result).await;
                result
            }
            Err(e) => {
                drop(authority);
                self.fail(&op, Some(path), started, e.into(), previous).await
            }
        }
    }

    /// Applies on a copy-on-write working copy; the authority only sees the
    /// result if the applicator succeeds.
    fn apply_to(
        &self,
        authority: &mut Authority,
        path: &StatePath,
        op: &SyncOperation,
        value: Option<&Value>,
    ) -> ApplicatorResult<bool> {
        let mut working = authority.state.clone();
        self.applicator.apply(working.make_mut(), path, op, value)?;
        authority.state = working;
        Ok(true)
    }

    async fn defer_to_manual(
        &self,
        op: SyncOperation,
        path: StatePath,
        conflict: SyncConflict,
        current: Option<Value>,
        started: Instant,
    ) -> SyncResult {
        info!(
            "Conflict {} at `{}` queued for manual resolution",
            conflict.id, path
        );
        self.conflicts.lock().await.push(
            PendingConflict {
                conflict: conflict.clone(),
                operation: op.clone(),
            },
            Timestamp::now(),
        );
        self.observer.on_conflict(&conflict);

        let result = SyncResult::settled(op.id, started.elapsed(), false)
            .with_conflicts(vec![conflict])
            .with_rollback(current);
        self.record(&op, Some(path), &result).await;
        result
    }

    async fn fail(
        &self,
        op: &SyncOperation,
        path: Option<StatePath>,
        started: Instant,
        error: SyncError,
        current: Option<Value>,
    ) -> SyncResult {
        warn!("Operation {} at `{}` failed: {}", op.id, op.path, error);
        self.observer.on_sync_error(&SyncFailure {
            operation_id: op.id,
            path: op.path.clone(),
            error: error.to_string(),
            timestamp: Timestamp::now(),
        });
        let result =
            SyncResult::failed(op.id, started.elapsed(), error.to_string()).with_rollback(current);
        self.record(op, path, &result).await;
        result
    }

    async fn record(&self, op: &SyncOperation, path: Option<StatePath>, result: &SyncResult) {
        let record = OperationRecord {
            operation_id: op.id,
            op_type: op.op_type,
            path,
            source: op.metadata.source.clone(),
            version: op.metadata.version,
            recorded_at: Timestamp::now(),
            latency: result.latency,
            success: result.success,
            applied: result.applied,
            conflicted: !result.conflicts.is_empty(),
        };
        self.metrics.lock().await.record(record, result.conflicts.len());
        let snapshot = self.metrics().await;
        self.observer.on_metrics_updated(&snapshot);
    }

    // ── Manual conflicts ─────────────────────────────────────────

    /// Returns conflicts awaiting manual resolution, oldest first.
    pub async fn pending_conflicts(&self) -> Vec<SyncConflict> {
        self.conflicts.lock().await.conflicts()
    }

    /// Settles a queued conflict by writing `value` at its path.
    ///
    /// The version vector is not advanced: the write carries no newer
    /// version than the one already committed.
    pub async fn resolve_conflict(&self, id: ConflictId, value: Value) -> Result<SyncResult> {
        let pending = self
            .conflicts
            .lock()
            .await
            .take(id)
            .ok_or(SyncError::ConflictNotFound(id))?;

        let started = Instant::now();
        let PendingConflict {
            mut conflict,
            operation,
        } = pending;
        let path = conflict.path.clone();
        let op = SyncOperation {
            op_type: OperationType::Update,
            new_value: Some(value.clone()),
            ..operation
        };

        let mut authority = self.authority.write().await;
        let previous = authority.state.value_at(&path).cloned();
        match self.apply_to(&mut authority, &path, &op, Some(&value)) {
            Ok(_) => {
                authority.versions.touch(&path, Timestamp::now());
                let version = authority.versions.get(&path);
                drop(authority);

                conflict.settle(ConflictResolution::Manual, value.clone());
                info!("Conflict {} at `{}` resolved manually", conflict.id, path);
                self.observer.on_conflict(&conflict);
                self.observer.on_state_changed(&StateChange {
                    operation_id: op.id,
                    path: path.clone(),
                    value: Some(value),
                    previous,
                    version,
                    source: op.metadata.source.clone(),
                    timestamp: Timestamp::now(),
                });
                let result = SyncResult::settled(op.id, started.elapsed(), true)
                    .with_conflicts(vec![conflict]);
                self.record(&op, Some(path), &result).await;
                Ok(result)
            }
            Err(e) => {
                drop(authority);
                // Keep it for another attempt.
                self.conflicts.lock().await.push(
                    PendingConflict {
                        conflict,
                        operation: op.clone(),
                    },
                    Timestamp::now(),
                );
                Ok(self.fail(&op, Some(path), started, e.into(), previous).await)
            }
        }
    }

    /// Drops manual conflicts older than the configured TTL.
    pub async fn purge_expired_conflicts(&self) -> usize {
        self.conflicts.lock().await.purge_expired(Timestamp::now())
    }

    // ── Introspection ────────────────────────────────────────────

    /// Returns a snapshot of the authoritative state (cheap; shares the tree).
    pub async fn snapshot(&self) -> GameState {
        self.authority.read().await.state.clone()
    }

    /// Returns the authoritative value at `path`.
    pub async fn value_at(&self, path: &str) -> Option<Value> {
        let path = StatePath::parse(path).ok()?;
        self.authority.read().await.state.value_at(&path).cloned()
    }

    /// Returns the committed version at `path` (0 if never written or unparseable).
    pub async fn current_version(&self, path: &str) -> u64 {
        match StatePath::parse(path) {
            Ok(path) => self.authority.read().await.versions.get(&path),
            Err(_) => 0,
        }
    }

    /// Returns a copy of the version vector.
    pub async fn version_vector(&self) -> VersionVector {
        self.authority.read().await.versions.clone()
    }

    /// Returns current metrics.
    pub async fn metrics(&self) -> SyncMetrics {
        let queue_len = self.queue_len().await;
        let pending_conflicts = self.conflicts.lock().await.len();
        let mut metrics = self.metrics.lock().await.snapshot(Timestamp::now());
        metrics.queue_len = queue_len;
        metrics.pending_conflicts = pending_conflicts;
        metrics
    }

    /// Returns the recent-operations ring buffer, oldest first.
    pub async fn recent_operations(&self) -> Vec<OperationRecord> {
        self.metrics.lock().await.recent().cloned().collect()
    }

    /// Returns the number of queued operations.
    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Returns the configured resolution policy.
    pub fn resolution_policy(&self) -> ResolutionPolicy {
        self.config.conflict_resolution
    }
}

/// Shape-only validation; payload semantics are never inspected.
fn validate_shape(op: &SyncOperation) -> Result<StatePath> {
    let path = StatePath::parse(&op.path).map_err(|e| SyncError::InvalidOperation(e.to_string()))?;

    if path.is_root() && op.op_type != OperationType::Update {
        return Err(SyncError::InvalidOperation(
            "only updates may address the root".into(),
        ));
    }

    match op.op_type {
        OperationType::Create | OperationType::Update if op.new_value.is_none() => {
            Err(SyncError::InvalidOperation(format!(
                "{:?} at `{}` carries no new value",
                op.op_type, op.path
            )))
        }
        OperationType::Batch => match &op.new_value {
            Some(Value::Object(members)) => {
                for key in members.keys() {
                    StatePath::parse(key)
                        .map_err(|e| SyncError::InvalidOperation(e.to_string()))?;
                }
                Ok(path)
            }
            _ => Err(SyncError::InvalidOperation(format!(
                "batch at `{}` needs an object of member writes",
                op.path
            ))),
        },
        _ => Ok(path),
    }
}
