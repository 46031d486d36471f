use gamesync_realtime::persistence::memory::MemoryPersistence;
use gamesync_realtime::{
    BroadcastEvent, BroadcastKind, ChannelObserver, ConnectionStatus, DisconnectReason,
    PlayerAction, RealtimeConfig, RealtimeError, RealtimeSession, SessionEvent, UpdateStatus,
};
use gamesync_sync::{ResolutionPolicy, SyncConfig, SyncEngine, SyncStrategy};
use gamesync_types::{ConnectionId, GameState, OperationMetadata, PlayerId, SyncOperation};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn game() -> GameState {
    GameState::new(json!({
        "id": "g1",
        "players": [
            {"id": "p1", "money": 1500},
            {"id": "p2", "money": 1500},
            {"id": "p3", "money": 1500},
            {"id": "p4", "money": 1500},
            {"id": "p5", "money": 1500}
        ]
    }))
}

fn setup(
    config: RealtimeConfig,
    sync: SyncConfig,
) -> (Arc<RealtimeSession>, UnboundedReceiver<SessionEvent>) {
    let engine = Arc::new(SyncEngine::with_state(sync, game()));
    let (observer, rx) = ChannelObserver::new();
    let session = RealtimeSession::new(config, engine).with_observer(Arc::new(observer));
    (Arc::new(session), rx)
}

fn player(n: usize) -> PlayerId {
    PlayerId::new(format!("p{n}"))
}

async fn connect(session: &RealtimeSession, players: &[usize]) {
    for &n in players {
        session
            .register_connection(player(n), ConnectionId::new(format!("conn-{n}")), 0)
            .await;
    }
}

fn money(n: usize, value: i64, version: u64) -> SyncOperation {
    SyncOperation::update(
        format!("players[{}].money", n - 1),
        json!(value),
        OperationMetadata::new(format!("p{n}"), version),
    )
}

fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn deliveries(events: &[SessionEvent]) -> Vec<(PlayerId, Vec<BroadcastEvent>)> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::BroadcastToPlayer { player_id, events } => {
                Some((player_id.clone(), events.clone()))
            }
            _ => None,
        })
        .collect()
}

fn scheduled(policy: ResolutionPolicy) -> SyncConfig {
    SyncConfig {
        strategy: SyncStrategy::Scheduled,
        conflict_resolution: policy,
        ..Default::default()
    }
}

// ── Optimistic path ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn optimistic_update_confirms_and_broadcasts_to_others() {
    let (session, mut rx) = setup(RealtimeConfig::default(), SyncConfig::default());
    connect(&session, &[1, 2]).await;

    let result = session.apply_state_update(&player(1), money(1, 1300, 1), true).await;
    assert!(result.success);
    let update_id = result.update_id.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::OptimisticUpdate(u) if u.id == update_id && u.status == UpdateStatus::Pending
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::OptimisticUpdateConfirmed(u) if u.id == update_id && u.status == UpdateStatus::Confirmed
    )));

    let delivered = deliveries(&events);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, player(2));
    assert_eq!(delivered[0].1[0].kind, BroadcastKind::StateChanged);
    assert_eq!(delivered[0].1[0].payload["value"], json!(1300));

    assert_eq!(session.pending_count().await, 0);
    assert_eq!(
        session.engine().value_at("players[0].money").await,
        Some(json!(1300))
    );
}

#[tokio::test(start_paused = true)]
async fn rollback_carries_value_captured_before_interleaved_writes() {
    let (session, mut rx) = setup(RealtimeConfig::default(), scheduled(ResolutionPolicy::ClientWins));
    connect(&session, &[1, 2]).await;
    let engine = session.engine().clone();

    let result = session.apply_state_update(&player(1), money(1, 1000, 1), true).await;
    let update_id = result.update_id.unwrap();
    assert_eq!(session.pending_count().await, 1);
    // Let the background settlement enqueue its operation.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(engine.queue_len().await, 1);

    // Other writers land first and move the version past the optimistic one.
    assert!(engine.handle_remote_change(money(1, 700, 1)).await.committed());
    assert!(engine.handle_remote_change(money(1, 600, 2)).await.committed());

    let drained = engine.drain_batch().await;
    assert_eq!(drained.len(), 1);
    assert!(!drained[0].applied);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let events = drain(&mut rx);

    let (rejected, reason) = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::OptimisticUpdateRejected { update, reason } => Some((update.clone(), reason.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(rejected.id, update_id);
    assert_eq!(rejected.status, UpdateStatus::Rejected);
    assert_eq!(rejected.rollback_data, Some(json!(1500)));
    assert!(reason.contains("conflict"));

    let delivered = deliveries(&events);
    assert_eq!(delivered.len(), 1);
    let rollback = &delivered[0].1[0];
    assert_eq!(rollback.kind, BroadcastKind::Rollback);
    assert_eq!(rollback.payload["value"], json!(1500));
    assert_eq!(engine.value_at("players[0].money").await, Some(json!(600)));
    assert_eq!(session.pending_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn apply_failure_rejects_with_sync_error() {
    let (session, mut rx) = setup(RealtimeConfig::default(), SyncConfig::default());
    connect(&session, &[1, 2]).await;

    let bad = SyncOperation::update("players[0].money[", json!(1), OperationMetadata::new("p1", 1));
    assert!(session.apply_state_update(&player(1), bad, true).await.success);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::SyncError { .. })));
    assert!(events.iter().any(|e| matches!(e, SessionEvent::OptimisticUpdateRejected { .. })));
}

#[tokio::test(start_paused = true)]
async fn swept_update_is_withdrawn_and_never_applied() {
    let config = RealtimeConfig {
        pending_update_ttl_ms: 1_000,
        ..Default::default()
    };
    let (session, mut rx) = setup(config, scheduled(ResolutionPolicy::TimestampWins));
    connect(&session, &[1, 2]).await;
    let engine = session.engine().clone();

    session.apply_state_update(&player(1), money(1, 900, 1), true).await;
    tokio::time::advance(Duration::from_millis(500)).await;
    assert_eq!(engine.queue_len().await, 1);
    assert_eq!(session.sweep_pending().await, 0);

    tokio::time::advance(Duration::from_millis(600)).await;
    assert_eq!(session.sweep_pending().await, 1);
    assert_eq!(session.pending_count().await, 0);
    assert_eq!(engine.queue_len().await, 0);

    // Nothing is left for a drain to commit.
    assert!(engine.drain_batch().await.is_empty());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.value_at("players[0].money").await, Some(json!(1500)));
    assert_eq!(engine.current_version("players[0].money").await, 0);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::OptimisticUpdateRejected { reason, update }
            if reason.contains("timed out") && update.rollback_data == Some(json!(1500))
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::OptimisticUpdateConfirmed(_))));

    let delivered = deliveries(&events);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, player(2));
    let kinds: Vec<_> = delivered[0].1.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![BroadcastKind::Rollback]);
    assert_eq!(delivered[0].1[0].payload["value"], json!(1500));
}

// Real clock: the update must expire before its background submit runs.
#[tokio::test]
async fn overdue_update_that_commits_is_still_announced() {
    let config = RealtimeConfig {
        pending_update_ttl_ms: 0,
        ..Default::default()
    };
    let (session, mut rx) = setup(config, SyncConfig::default());
    connect(&session, &[1, 2]).await;

    let result = session.apply_state_update(&player(1), money(1, 900, 1), true).await;
    let update_id = result.update_id.unwrap();
    std::thread::sleep(Duration::from_millis(5));

    // Not queued yet, so the engine cannot give it back.
    assert_eq!(session.sweep_pending().await, 0);
    assert_eq!(session.pending_count().await, 1);

    tokio::time::timeout(Duration::from_secs(1), async {
        while session.pending_count().await > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    session.flush_broadcasts().await;

    assert_eq!(
        session.engine().value_at("players[0].money").await,
        Some(json!(900))
    );
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::OptimisticUpdateConfirmed(u) if u.id == update_id
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::OptimisticUpdateRejected { .. })));

    let delivered = deliveries(&events);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, player(2));
    assert_eq!(delivered[0].1[0].kind, BroadcastKind::StateChanged);
    assert_eq!(delivered[0].1[0].payload["value"], json!(900));
}

#[tokio::test(start_paused = true)]
async fn pending_map_is_bounded() {
    let config = RealtimeConfig {
        max_pending_updates: 1,
        ..Default::default()
    };
    let (session, mut rx) = setup(config, scheduled(ResolutionPolicy::TimestampWins));
    connect(&session, &[1, 2]).await;
    let engine = session.engine().clone();

    let first = session.apply_state_update(&player(1), money(1, 900, 1), true).await;
    tokio::time::sleep(Duration::from_millis(1)).await;
    session.apply_state_update(&player(2), money(2, 800, 1), true).await;
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(session.pending_count().await, 1);
    assert_eq!(engine.queue_len().await, 1);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::OptimisticUpdateRejected { update, .. } if Some(update.id) == first.update_id
    )));

    // Only the surviving update reaches the state.
    let drained = engine.drain_batch().await;
    assert_eq!(drained.len(), 1);
    assert_eq!(engine.value_at("players[0].money").await, Some(json!(1500)));
    assert_eq!(engine.value_at("players[1].money").await, Some(json!(800)));
}

// ── Direct path ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn direct_path_returns_engine_rejection() {
    let (session, _rx) = setup(
        RealtimeConfig::default(),
        SyncConfig {
            conflict_resolution: ResolutionPolicy::ClientWins,
            ..Default::default()
        },
    );
    connect(&session, &[1, 2]).await;

    let ok = session.apply_state_update(&player(1), money(1, 1200, 1), false).await;
    assert!(ok.success);
    assert_eq!(ok.update_id, None);

    let stale = session.apply_state_update(&player(2), money(1, 1100, 1), false).await;
    assert!(!stale.success);
    assert!(stale.error.unwrap().contains("conflict"));
    assert_eq!(
        session.engine().value_at("players[0].money").await,
        Some(json!(1200))
    );
    assert_eq!(session.queued_broadcasts().await, 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_optimism_takes_direct_path() {
    let config = RealtimeConfig {
        optimistic_updates: false,
        ..Default::default()
    };
    let (session, mut rx) = setup(config, SyncConfig::default());
    connect(&session, &[1]).await;

    let result = session.apply_state_update(&player(1), money(1, 10, 1), true).await;
    assert!(result.success);
    assert_eq!(result.update_id, None);
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::OptimisticUpdate(_))));
}

// ── Broadcast ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn five_players_in_one_window_get_one_batch_each() {
    let config = RealtimeConfig {
        broadcast_debounce_ms: 50,
        max_batch_size: 10,
        ..Default::default()
    };
    let (session, mut rx) = setup(config, SyncConfig::default());
    connect(&session, &[1, 2, 3, 4, 5]).await;

    for n in 1..=5 {
        let r = session.apply_state_update(&player(n), money(n, 1000 + n as i64, 1), true).await;
        assert!(r.success);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let delivered = deliveries(&drain(&mut rx));
    assert_eq!(delivered.len(), 5);
    for n in 1..=5 {
        let batches: Vec<_> = delivered.iter().filter(|(p, _)| *p == player(n)).collect();
        assert_eq!(batches.len(), 1);
        let events = &batches[0].1;
        assert_eq!(events.len(), 4);
        assert!(events.len() <= 10);
        assert!(events.iter().all(|e| e.player_id != player(n)));
    }
}

#[tokio::test(start_paused = true)]
async fn flush_respects_max_batch_size() {
    let config = RealtimeConfig {
        broadcast_debounce_ms: 20,
        max_batch_size: 2,
        ..Default::default()
    };
    let (session, mut rx) = setup(config, SyncConfig::default());
    connect(&session, &[1, 2]).await;

    for v in 1..=5u64 {
        assert!(session.apply_state_update(&player(1), money(1, v as i64, v), false).await.success);
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    let sizes: Vec<_> = deliveries(&drain(&mut rx)).iter().map(|(_, e)| e.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(session.queued_broadcasts().await, 0);
}

#[tokio::test(start_paused = true)]
async fn reconnecting_players_do_not_receive_broadcasts() {
    let config = RealtimeConfig {
        connection_timeout_ms: 1_000,
        ..Default::default()
    };
    let (session, mut rx) = setup(config, SyncConfig::default());
    connect(&session, &[1, 2, 3]).await;

    tokio::time::advance(Duration::from_millis(1_500)).await;
    session.update_heartbeat(&player(1), Duration::ZERO).await;
    session.update_heartbeat(&player(2), Duration::ZERO).await;
    session.check_connections().await;

    session.apply_state_update(&player(1), money(1, 5, 1), false).await;
    session.flush_broadcasts().await;

    let recipients: Vec<_> = deliveries(&drain(&mut rx)).into_iter().map(|(p, _)| p).collect();
    assert_eq!(recipients, vec![player(2)]);
}

// ── Bulk updates & actions ───────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn bulk_update_requires_connected_player() {
    let config = RealtimeConfig {
        connection_timeout_ms: 1_000,
        ..Default::default()
    };
    let (session, _rx) = setup(config, SyncConfig::default());

    let unknown = session.process_bulk_update(&player(1), vec![money(1, 1, 1)]).await;
    assert!(!unknown.success);
    assert!(unknown.error.unwrap().contains("unknown player"));

    connect(&session, &[1]).await;
    tokio::time::advance(Duration::from_millis(1_500)).await;
    session.check_connections().await;

    let refused = session.process_bulk_update(&player(1), vec![money(1, 1, 1)]).await;
    assert!(!refused.success);
    assert!(refused.results.is_empty());
    assert!(refused.error.unwrap().contains("not connected"));
    assert_eq!(session.engine().current_version("players[0].money").await, 0);
}

#[tokio::test(start_paused = true)]
async fn bulk_update_reports_each_result_and_one_event() {
    let (session, mut rx) = setup(RealtimeConfig::default(), SyncConfig::default());
    connect(&session, &[1, 2]).await;

    let ops = vec![
        money(1, 100, 1),
        SyncOperation::update("players[0].position", json!(7), OperationMetadata::new("p1", 1)),
        SyncOperation::update("players[", json!(0), OperationMetadata::new("p1", 1)),
    ];
    let bulk = session.process_bulk_update(&player(1), ops).await;
    assert!(!bulk.success);
    assert_eq!(bulk.results.len(), 3);
    assert_eq!(bulk.results.iter().filter(|r| r.success).count(), 2);
    assert!(bulk.error.unwrap().contains("1 of 3"));

    session.flush_broadcasts().await;
    let delivered = deliveries(&drain(&mut rx));
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].1.len(), 1);
    let event = &delivered[0].1[0];
    assert_eq!(event.kind, BroadcastKind::BulkUpdate);
    assert_eq!(event.payload, json!({"count": 3, "applied": 2}));
}

#[tokio::test(start_paused = true)]
async fn player_action_commits_snapshot_and_announces() {
    let (session, mut rx) = setup(RealtimeConfig::default(), SyncConfig::default());
    connect(&session, &[1, 2]).await;

    let next = GameState::new(json!({"id": "g1", "players": [], "turn": 2}));
    let action = PlayerAction::new(player(1), "end_turn", json!({"turn": 2}));
    assert!(session.handle_player_action(action, next).await.success);
    assert_eq!(session.engine().value_at("turn").await, Some(json!(2)));

    session.flush_broadcasts().await;
    let delivered = deliveries(&drain(&mut rx));
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, player(2));
    assert_eq!(delivered[0].1[0].kind, BroadcastKind::PlayerAction);
    assert_eq!(delivered[0].1[0].payload["action_type"], json!("end_turn"));

    let stranger = PlayerAction::new(player(9), "roll", Value::Null);
    let refused = session.handle_player_action(stranger, game()).await;
    assert!(!refused.success);
}

#[tokio::test(start_paused = true)]
async fn player_action_persists_settled_state() {
    let persistence = Arc::new(MemoryPersistence::new());
    let engine = Arc::new(SyncEngine::with_state(SyncConfig::default(), game()));
    let session = Arc::new(
        RealtimeSession::new(RealtimeConfig::default(), engine).with_persistence(persistence.clone()),
    );
    connect(&session, &[1]).await;

    let next = GameState::new(json!({"id": "g1", "players": [], "turn": 3}));
    let action = PlayerAction::new(player(1), "end_turn", json!({"turn": 3}));
    assert!(session.handle_player_action(action, next).await.success);

    let saved = session.latest_snapshot().await.unwrap();
    assert_eq!(persistence.snapshot_ids(), vec![saved.snapshot_id()]);
    assert_eq!(saved.state.as_value()["turn"], json!(3));
}

#[tokio::test(start_paused = true)]
async fn player_action_reports_failed_save() {
    let persistence = Arc::new(MemoryPersistence::new());
    persistence.set_fail_saves(true);
    let (observer, mut rx) = ChannelObserver::new();
    let engine = Arc::new(SyncEngine::with_state(SyncConfig::default(), game()));
    let session = Arc::new(
        RealtimeSession::new(RealtimeConfig::default(), engine)
            .with_persistence(persistence.clone())
            .with_observer(Arc::new(observer)),
    );
    connect(&session, &[1]).await;

    let next = GameState::new(json!({"id": "g1", "players": [], "turn": 3}));
    let action = PlayerAction::new(player(1), "end_turn", Value::Null);
    let result = session.handle_player_action(action, next).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("persistence error"));
    // The commit itself stands.
    assert_eq!(session.engine().value_at("turn").await, Some(json!(3)));
    assert!(persistence.snapshot_ids().is_empty());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::SyncError { player_id: None, .. })));
}

// ── Connections ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn silent_connections_are_demoted_then_removed() {
    let config = RealtimeConfig {
        connection_timeout_ms: 1_000,
        ..Default::default()
    };
    let (session, mut rx) = setup(config, SyncConfig::default());
    connect(&session, &[1, 2]).await;
    drain(&mut rx);

    tokio::time::advance(Duration::from_millis(1_500)).await;
    session.update_heartbeat(&player(2), Duration::from_millis(40)).await;
    let stats = session.check_connections().await;
    assert_eq!(stats.active_connections, 1);
    assert_eq!(stats.reconnecting, 1);
    assert_eq!(
        session.connection(&player(1)).await.unwrap().status,
        ConnectionStatus::Reconnecting
    );

    tokio::time::advance(Duration::from_millis(600)).await;
    session.check_connections().await;
    assert!(session.connection(&player(1)).await.is_none());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::PlayerReconnecting(c) if c.player_id == player(1))));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::PlayerDisconnected { connection, reason: DisconnectReason::TimedOut }
            if connection.player_id == player(1)
    )));
    assert_eq!(events.iter().filter(|e| matches!(e, SessionEvent::Heartbeat(_))).count(), 2);
    assert_eq!(session.connection(&player(2)).await.unwrap().lag, Duration::from_millis(40));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_loop_drives_health_ticks() {
    let config = RealtimeConfig {
        heartbeat_interval_ms: 100,
        connection_timeout_ms: 250,
        ..Default::default()
    };
    let (session, _rx) = setup(config, SyncConfig::default());
    connect(&session, &[1]).await;
    let handle = session.spawn_heartbeat_loop();

    tokio::time::sleep(Duration::from_millis(320)).await;
    assert_eq!(
        session.connection(&player(1)).await.unwrap().status,
        ConnectionStatus::Reconnecting
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(session.connections().await.is_empty());

    drop(session);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn registry_evicts_oldest_heartbeat_at_capacity() {
    let config = RealtimeConfig {
        max_connections: 2,
        ..Default::default()
    };
    let (session, mut rx) = setup(config, SyncConfig::default());
    connect(&session, &[1]).await;
    tokio::time::advance(Duration::from_millis(10)).await;
    connect(&session, &[2]).await;
    tokio::time::advance(Duration::from_millis(10)).await;
    session.update_heartbeat(&player(1), Duration::ZERO).await;

    connect(&session, &[3]).await;
    let ids: Vec<_> = session.connections().await.into_iter().map(|c| c.player_id).collect();
    assert_eq!(ids, vec![player(1), player(3)]);
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        SessionEvent::PlayerDisconnected { connection, reason: DisconnectReason::Evicted }
            if connection.player_id == player(2)
    )));
}

#[tokio::test]
async fn unregister_reports_disconnect() {
    let (session, mut rx) = setup(RealtimeConfig::default(), SyncConfig::default());
    connect(&session, &[1]).await;
    let removed = session.unregister_connection(&player(1)).await.unwrap();
    assert_eq!(removed.status, ConnectionStatus::Disconnected);
    assert!(session.unregister_connection(&player(1)).await.is_none());
    assert!(!session.update_heartbeat(&player(1), Duration::ZERO).await);
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        SessionEvent::PlayerDisconnected { reason: DisconnectReason::Unregistered, .. }
    )));
}

// ── Snapshots & resync ───────────────────────────────────────────

#[tokio::test]
async fn snapshots_are_persisted_with_checksums() {
    let persistence = Arc::new(MemoryPersistence::new());
    let engine = Arc::new(SyncEngine::with_state(SyncConfig::default(), game()));
    let session = RealtimeSession::new(RealtimeConfig::default(), engine.clone())
        .with_persistence(persistence.clone());

    let first = session.save_snapshot(engine.snapshot().await).await.unwrap();
    assert_eq!(first.version, 1);
    assert!(first.verify());
    assert_eq!(persistence.snapshot_ids(), vec![first.snapshot_id()]);

    let loaded = session.load_snapshot(&first.snapshot_id()).await.unwrap().unwrap();
    assert_eq!(loaded.checksum, first.checksum);
    assert_eq!(session.latest_snapshot().await.unwrap().version, 1);
    assert!(session.snapshot_at(1).await.is_some());
    assert!(session.load_snapshot("snapshot-missing").await.unwrap().is_none());
}

#[tokio::test]
async fn persistence_failure_surfaces_as_error() {
    let persistence = Arc::new(MemoryPersistence::new());
    persistence.set_fail_saves(true);
    let (observer, mut rx) = ChannelObserver::new();
    let session = RealtimeSession::new(
        RealtimeConfig::default(),
        Arc::new(SyncEngine::new(SyncConfig::default())),
    )
    .with_persistence(persistence.clone())
    .with_observer(Arc::new(observer));

    let err = session.save_snapshot(game()).await.unwrap_err();
    assert!(matches!(err, RealtimeError::Persistence(_)));
    assert!(persistence.snapshot_ids().is_empty());
    assert!(drain(&mut rx).iter().any(|e| matches!(e, SessionEvent::SyncError { player_id: None, .. })));
}

#[tokio::test]
async fn snapshot_history_is_trimmed() {
    let session = RealtimeSession::new(
        RealtimeConfig::default(),
        Arc::new(SyncEngine::new(SyncConfig::default())),
    );
    for turn in 0..51 {
        session.save_snapshot(GameState::new(json!({ "turn": turn }))).await.unwrap();
    }
    assert!(session.snapshot_at(21).await.is_none());
    assert_eq!(session.snapshot_at(22).await.unwrap().state.as_value()["turn"], json!(21));
    assert_eq!(session.latest_snapshot().await.unwrap().version, 51);
}

#[tokio::test(start_paused = true)]
async fn resync_restores_connection_and_returns_current_state() {
    let config = RealtimeConfig {
        connection_timeout_ms: 1_000,
        ..Default::default()
    };
    let (session, _rx) = setup(config, SyncConfig::default());
    connect(&session, &[1]).await;
    session.apply_state_update(&player(1), money(1, 42, 1), false).await;

    tokio::time::advance(Duration::from_millis(1_500)).await;
    session.check_connections().await;
    assert_eq!(
        session.connection(&player(1)).await.unwrap().status,
        ConnectionStatus::Reconnecting
    );

    let snapshot = session.resync(&player(1)).await.unwrap();
    assert_eq!(snapshot.state.as_value()["players"][0]["money"], json!(42));
    let conn = session.connection(&player(1)).await.unwrap();
    assert_eq!(conn.status, ConnectionStatus::Connected);
    assert_eq!(conn.version, snapshot.version);

    assert!(matches!(
        session.resync(&player(7)).await,
        Err(RealtimeError::UnknownPlayer(_))
    ));
}
