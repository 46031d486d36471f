//! Realtime session over a shared [`SyncEngine`].
//!
//! The session owns the connection registry, the optimistic-update map and
//! the broadcast queue. Every write is committed by the engine; the session
//! decides what the other participants hear about it, and when.

use crate::broadcast::{fan_out, BroadcastEvent, BroadcastKind, BroadcastQueue};
use crate::config::RealtimeConfig;
use crate::connection::{ConnectionInfo, ConnectionRegistry, ConnectionStatus, DisconnectReason};
use crate::error::{RealtimeError, Result};
use crate::observer::{HeartbeatStats, NoopSessionObserver, SessionObserver};
use crate::optimistic::{OptimisticUpdate, PendingUpdates, UpdateStatus};
use crate::persistence::Persistence;
use crate::snapshot::{SnapshotHistory, VersionedSnapshot};
use futures::future::join_all;
use gamesync_sync::{SyncEngine, SyncResult};
use gamesync_types::{ConnectionId, GameState, PlayerId, SyncOperation, Timestamp, UpdateId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of a single update request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateResult {
    pub success: bool,
    /// Set for optimistic updates; settlement is reported through the observer.
    pub update_id: Option<UpdateId>,
    pub error: Option<String>,
}

impl UpdateResult {
    fn accepted(update_id: Option<UpdateId>) -> Self {
        Self {
            success: true,
            update_id,
            error: None,
        }
    }

    fn failed(error: RealtimeError) -> Self {
        Self {
            success: false,
            update_id: None,
            error: Some(error.to_string()),
        }
    }
}

/// Outcome of a bulk update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkUpdateResult {
    /// True when every operation was applied.
    pub success: bool,
    pub results: Vec<UpdateResult>,
    pub error: Option<String>,
}

/// A player action already resolved by the game rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAction {
    pub player_id: PlayerId,
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: Timestamp,
}

impl PlayerAction {
    pub fn new(player_id: PlayerId, action_type: impl Into<String>, payload: Value) -> Self {
        Self {
            player_id,
            action_type: action_type.into(),
            payload,
            timestamp: Timestamp::now(),
        }
    }
}

/// Per-game session layer.
pub struct RealtimeSession {
    config: RealtimeConfig,
    engine: Arc<SyncEngine>,
    connections: RwLock<ConnectionRegistry>,
    pending: Mutex<PendingUpdates>,
    /// Updates evicted from `pending` whose operation the engine had already
    /// taken; they settle like any other update.
    overdue: Mutex<HashMap<UpdateId, OptimisticUpdate>>,
    broadcasts: Mutex<BroadcastQueue>,
    history: RwLock<SnapshotHistory>,
    snapshot_seq: AtomicU64,
    persistence: Option<Arc<dyn Persistence>>,
    observer: Arc<dyn SessionObserver>,
}

impl RealtimeSession {
    pub fn new(config: RealtimeConfig, engine: Arc<SyncEngine>) -> Self {
        let connections = ConnectionRegistry::new(config.max_connections);
        let pending = PendingUpdates::new(config.max_pending_updates);
        Self {
            config,
            engine,
            connections: RwLock::new(connections),
            pending: Mutex::new(pending),
            overdue: Mutex::new(HashMap::new()),
            broadcasts: Mutex::new(BroadcastQueue::new()),
            history: RwLock::new(SnapshotHistory::new()),
            snapshot_seq: AtomicU64::new(0),
            persistence: None,
            observer: Arc::new(NoopSessionObserver),
        }
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Continues snapshot numbering after `version`, e.g. after restoring
    /// from persistence.
    #[must_use]
    pub fn with_snapshot_version(self, version: u64) -> Self {
        self.snapshot_seq.store(version, Ordering::SeqCst);
        self
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    // ── Connections ──────────────────────────────────────────────

    /// Registers a player's connection, replacing any previous one.
    pub async fn register_connection(
        &self,
        player_id: PlayerId,
        connection_id: ConnectionId,
        version: u64,
    ) -> ConnectionInfo {
        let info = ConnectionInfo::new(player_id, connection_id, version);
        let evicted = self.connections.write().await.register(info.clone());

        if let Some(evicted) = evicted {
            self.observer
                .on_player_disconnected(&evicted, DisconnectReason::Evicted);
        }
        info!("Player {} connected", info.player_id);
        self.observer.on_player_connected(&info);
        info
    }

    pub async fn unregister_connection(&self, player_id: &PlayerId) -> Option<ConnectionInfo> {
        let mut removed = self.connections.write().await.remove(player_id)?;
        removed.status = ConnectionStatus::Disconnected;
        info!("Player {} disconnected", player_id);
        self.observer
            .on_player_disconnected(&removed, DisconnectReason::Unregistered);
        Some(removed)
    }

    /// Records a heartbeat. Returns false for unknown players.
    pub async fn update_heartbeat(&self, player_id: &PlayerId, lag: Duration) -> bool {
        self.connections.write().await.heartbeat(player_id, lag)
    }

    /// Runs one health tick: demotes and removes silent connections, then
    /// announces the current counters.
    pub async fn check_connections(&self) -> HeartbeatStats {
        let (sweep, active, reconnecting) = {
            let mut connections = self.connections.write().await;
            let sweep = connections.sweep(Instant::now(), self.config.connection_timeout());
            (
                sweep,
                connections.count(ConnectionStatus::Connected),
                connections.count(ConnectionStatus::Reconnecting),
            )
        };

        for conn in &sweep.reconnecting {
            warn!("Player {} missed heartbeats; reconnecting", conn.player_id);
            self.observer.on_player_reconnecting(conn);
        }
        for conn in &sweep.removed {
            self.observer
                .on_player_disconnected(conn, DisconnectReason::TimedOut);
        }

        let stats = HeartbeatStats {
            active_connections: active,
            reconnecting,
            pending_updates: self.pending_count().await,
            timestamp: Timestamp::now(),
        };
        self.observer.on_heartbeat(&stats);
        stats
    }

    /// Spawns the periodic health tick, which also sweeps stuck optimistic
    /// updates. The loop exits once the session is dropped.
    pub fn spawn_heartbeat_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.heartbeat_interval().max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(session) = weak.upgrade() else {
                    debug!("Session dropped; heartbeat loop exiting");
                    break;
                };
                session.check_connections().await;
                session.sweep_pending().await;
            }
        })
    }

    pub async fn connection(&self, player_id: &PlayerId) -> Option<ConnectionInfo> {
        self.connections.read().await.get(player_id).cloned()
    }

    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections.read().await.list()
    }

    // ── Updates ──────────────────────────────────────────────────

    /// Applies one player's operation.
    ///
    /// With `optimistic` set (and optimistic updates enabled) the update is
    /// accepted at once and settled in the background; otherwise the call
    /// waits for the engine.
    pub async fn apply_state_update(
        self: &Arc<Self>,
        player_id: &PlayerId,
        operation: SyncOperation,
        optimistic: bool,
    ) -> UpdateResult {
        if optimistic && self.config.optimistic_updates {
            self.apply_optimistic(player_id, operation).await
        } else {
            self.commit_direct(player_id, operation, true).await
        }
    }

    async fn apply_optimistic(self: &Arc<Self>, player_id: &PlayerId, operation: SyncOperation) -> UpdateResult {
        // Captured before anything is attempted, so a rejection can always
        // restore it.
        let rollback_data = self.engine.value_at(&operation.path).await;
        let update = OptimisticUpdate::new(player_id.clone(), operation.clone(), rollback_data);
        let id = update.id;

        let displaced = self.pending.lock().await.insert(update.clone());
        if let Some(displaced) = displaced {
            self.evict(displaced, "displaced by newer optimistic updates")
                .await;
        }

        debug!(
            "Optimistic update {} from {} at `{}`",
            id, player_id, operation.path
        );
        self.observer.on_optimistic_update(&update);

        let session = Arc::clone(self);
        tokio::spawn(async move {
            let result = session.engine.submit(operation).await;
            session.settle(id, result).await;
        });

        UpdateResult::accepted(Some(id))
    }

    async fn settle(self: &Arc<Self>, id: UpdateId, result: SyncResult) {
        let taken = self.pending.lock().await.take(id);
        let taken = match taken {
            Some(update) => Some(update),
            None => self.overdue.lock().await.remove(&id),
        };
        let Some(mut update) = taken else {
            debug!("Optimistic update {} was withdrawn; ignoring its result", id);
            return;
        };

        if result.committed() {
            update.status = UpdateStatus::Confirmed;
            debug!("Optimistic update {} confirmed", id);
            self.observer.on_optimistic_confirmed(&update);
            let payload = change_payload(&update.operation, &result);
            self.queue_broadcast(BroadcastEvent::new(
                BroadcastKind::StateChanged,
                update.player_id.clone(),
                payload,
            ))
            .await;
        } else {
            let reason = rejection_reason(&result);
            if !result.success {
                self.observer.on_sync_error(Some(&update.player_id), &reason);
            }
            self.reject(update, &reason).await;
        }
    }

    /// Drops an update from the pending map. The rollback is only sent if the
    /// engine gives the operation back; otherwise the update waits for its
    /// result, since the write may still commit.
    async fn evict(self: &Arc<Self>, update: OptimisticUpdate, reason: &str) -> bool {
        // Held across the cancel so a settle racing with us finds the update.
        let mut overdue = self.overdue.lock().await;
        if self.engine.cancel(update.operation.id).await {
            drop(overdue);
            self.reject(update, reason).await;
            return true;
        }
        debug!(
            "Optimistic update {} ({}) already committing; awaiting its result",
            update.id, reason
        );
        overdue.insert(update.id, update);
        false
    }

    async fn reject(self: &Arc<Self>, mut update: OptimisticUpdate, reason: &str) {
        update.status = UpdateStatus::Rejected;
        warn!(
            "Optimistic update {} from {} rejected: {}",
            update.id, update.player_id, reason
        );
        self.observer.on_optimistic_rejected(&update, reason);

        let payload = json!({
            "update_id": update.id,
            "operation_id": update.operation.id,
            "path": update.operation.path,
            "value": update.rollback_data,
            "reason": reason,
        });
        self.queue_broadcast(BroadcastEvent::new(
            BroadcastKind::Rollback,
            update.player_id.clone(),
            payload,
        ))
        .await;
    }

    async fn commit_direct(
        self: &Arc<Self>,
        player_id: &PlayerId,
        operation: SyncOperation,
        announce: bool,
    ) -> UpdateResult {
        let template = operation.clone();
        let result = self.engine.submit(operation).await;

        if result.committed() {
            if announce {
                self.queue_broadcast(BroadcastEvent::new(
                    BroadcastKind::StateChanged,
                    player_id.clone(),
                    change_payload(&template, &result),
                ))
                .await;
            }
            return UpdateResult::accepted(None);
        }

        let reason = rejection_reason(&result);
        if !result.success {
            self.observer.on_sync_error(Some(player_id), &reason);
        }
        UpdateResult::failed(RealtimeError::NotApplied(reason))
    }

    /// Applies several operations from one connected player concurrently
    /// and announces them as a single bulk event.
    pub async fn process_bulk_update(
        self: &Arc<Self>,
        player_id: &PlayerId,
        operations: Vec<SyncOperation>,
    ) -> BulkUpdateResult {
        let status = self
            .connections
            .read()
            .await
            .get(player_id)
            .map(|c| c.status);
        let rejection = match status {
            None => Some(RealtimeError::UnknownPlayer(player_id.clone())),
            Some(ConnectionStatus::Connected) => None,
            Some(_) => Some(RealtimeError::NotConnected(player_id.clone())),
        };
        if let Some(err) = rejection {
            warn!("Bulk update from {} refused: {}", player_id, err);
            return BulkUpdateResult {
                success: false,
                results: Vec::new(),
                error: Some(err.to_string()),
            };
        }

        let count = operations.len();
        let results = join_all(
            operations
                .into_iter()
                .map(|op| self.commit_direct(player_id, op, false)),
        )
        .await;
        let applied = results.iter().filter(|r| r.success).count();
        info!("Bulk update from {}: {}/{} applied", player_id, applied, count);

        if count > 0 {
            self.queue_broadcast(BroadcastEvent::new(
                BroadcastKind::BulkUpdate,
                player_id.clone(),
                json!({ "count": count, "applied": applied }),
            ))
            .await;
        }

        BulkUpdateResult {
            success: applied == count,
            error: (applied < count).then(|| format!("{} of {} operations failed", count - applied, count)),
            results,
        }
    }

    /// Commits the state produced by a player action, announces the action
    /// and persists the settled state when a backend is configured.
    pub async fn handle_player_action(self: &Arc<Self>, action: PlayerAction, snapshot: GameState) -> UpdateResult {
        if self.connections.read().await.get(&action.player_id).is_none() {
            return UpdateResult::failed(RealtimeError::UnknownPlayer(action.player_id));
        }

        let result = self.engine.sync_full_state(snapshot).await;
        if !result.committed() {
            let reason = rejection_reason(&result);
            self.observer.on_sync_error(Some(&action.player_id), &reason);
            return UpdateResult::failed(RealtimeError::NotApplied(reason));
        }

        debug!("Action `{}` from {}", action.action_type, action.player_id);
        let payload = json!({
            "action_type": action.action_type,
            "payload": action.payload,
            "operation_id": result.operation_id,
            "timestamp": action.timestamp,
        });
        self.queue_broadcast(BroadcastEvent::new(
            BroadcastKind::PlayerAction,
            action.player_id,
            payload,
        ))
        .await;

        // The action is committed and announced either way; a failed save is
        // still reported to the caller.
        if self.persistence.is_some() {
            let settled = self.engine.snapshot().await;
            if let Err(e) = self.save_snapshot(settled).await {
                return UpdateResult::failed(e);
            }
        }
        UpdateResult::accepted(None)
    }

    /// Rejects optimistic updates that outlived the pending TTL and returns
    /// how many were rolled back.
    pub async fn sweep_pending(self: &Arc<Self>) -> usize {
        let expired = self
            .pending
            .lock()
            .await
            .take_expired(Instant::now(), self.config.pending_update_ttl());
        let mut rejected = 0;
        for update in expired {
            if self.evict(update, "timed out awaiting confirmation").await {
                rejected += 1;
            }
        }
        rejected
    }

    /// Optimistic updates not yet confirmed or rejected.
    pub async fn pending_count(&self) -> usize {
        let pending = self.pending.lock().await.len();
        pending + self.overdue.lock().await.len()
    }

    // ── Broadcast ────────────────────────────────────────────────

    async fn queue_broadcast(self: &Arc<Self>, event: BroadcastEvent) {
        let arm = self.broadcasts.lock().await.push(event);
        if arm {
            self.schedule_flush();
        }
    }

    fn schedule_flush(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let delay = self.config.broadcast_debounce();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(session) = weak.upgrade() {
                session.flush_broadcasts().await;
            }
        });
    }

    /// Delivers up to `max_batch_size` queued events to every connected
    /// player, minus the events each player authored. Returns the number of
    /// events taken from the queue.
    pub async fn flush_broadcasts(self: &Arc<Self>) -> usize {
        let (batch, more) = self
            .broadcasts
            .lock()
            .await
            .take_batch(self.config.max_batch_size);
        if more {
            self.schedule_flush();
        }
        if batch.is_empty() {
            return 0;
        }

        let recipients = self.connections.read().await.connected_players();
        let deliveries = fan_out(&batch, &recipients);
        debug!(
            "Broadcasting {} events to {} players",
            batch.len(),
            deliveries.len()
        );
        for (player, events) in &deliveries {
            self.observer.on_broadcast(player, events);
        }
        batch.len()
    }

    pub async fn queued_broadcasts(&self) -> usize {
        self.broadcasts.lock().await.len()
    }

    // ── Snapshots ────────────────────────────────────────────────

    async fn record_snapshot(&self, state: GameState) -> Arc<VersionedSnapshot> {
        let version = self.snapshot_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(VersionedSnapshot::new(version, state));
        self.history.write().await.push(Arc::clone(&snapshot));
        snapshot
    }

    /// Records `state` in the snapshot history and hands it to persistence,
    /// if configured.
    pub async fn save_snapshot(&self, state: GameState) -> Result<Arc<VersionedSnapshot>> {
        let snapshot = self.record_snapshot(state).await;
        let Some(persistence) = &self.persistence else {
            return Ok(snapshot);
        };

        let id = snapshot.snapshot_id();
        if let Err(e) = persistence.save(&id, &snapshot).await {
            warn!("Failed to persist {}: {}", id, e);
            self.observer.on_sync_error(None, &e.to_string());
            return Err(e.into());
        }
        info!("Persisted {}", id);
        Ok(snapshot)
    }

    /// Loads a persisted snapshot. Returns `Ok(None)` without a backend.
    pub async fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<VersionedSnapshot>> {
        match &self.persistence {
            Some(persistence) => Ok(persistence.load(snapshot_id).await?),
            None => Ok(None),
        }
    }

    pub async fn latest_snapshot(&self) -> Option<Arc<VersionedSnapshot>> {
        self.history.read().await.latest()
    }

    pub async fn snapshot_at(&self, version: u64) -> Option<Arc<VersionedSnapshot>> {
        self.history.read().await.at(version)
    }

    /// Brings a returning player back: resets the connection to connected
    /// and returns a fresh snapshot of the authoritative state.
    pub async fn resync(&self, player_id: &PlayerId) -> Result<Arc<VersionedSnapshot>> {
        let lag = self
            .connections
            .read()
            .await
            .get(player_id)
            .map(|c| c.lag)
            .ok_or_else(|| RealtimeError::UnknownPlayer(player_id.clone()))?;

        let snapshot = self.record_snapshot(self.engine.snapshot().await).await;

        let conn = {
            let mut connections = self.connections.write().await;
            connections.heartbeat(player_id, lag);
            let conn = connections
                .get_mut(player_id)
                .ok_or_else(|| RealtimeError::UnknownPlayer(player_id.clone()))?;
            conn.version = snapshot.version;
            conn.clone()
        };

        info!("Resynced {} at snapshot {}", player_id, snapshot.version);
        self.observer.on_player_connected(&conn);
        Ok(snapshot)
    }
}

fn change_payload(operation: &SyncOperation, result: &SyncResult) -> Value {
    json!({
        "operation_id": result.operation_id,
        "type": operation.op_type,
        "path": operation.path,
        "value": operation.new_value,
        "version": operation.metadata.version,
    })
}

fn rejection_reason(result: &SyncResult) -> String {
    if let Some(error) = &result.error {
        return error.clone();
    }
    match result.conflicts.first() {
        Some(conflict) => format!("conflict at `{}`: {}", conflict.path, conflict.reason),
        None => "not applied".to_string(),
    }
}
