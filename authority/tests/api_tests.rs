use std::sync::Arc;
use gamesync_authority::{build_router, Authority, AuthorityConfig, HealthResponse, ValidateResponse};
use gamesync_realtime::persistence::memory::MemoryPersistence;
use gamesync_sync::{ResolutionPolicy, SyncConflict, SyncMetrics, SyncResult, SyncStrategy};
use gamesync_types::{ConnectionId, GameState, OperationMetadata, PlayerId};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn test_config() -> AuthorityConfig {
    let mut config = AuthorityConfig::default();
    config.sync.conflict_resolution = ResolutionPolicy::Manual;
    config
}

fn test_authority(config: AuthorityConfig) -> Arc<Authority> {
    let state = GameState::new(json!({
        "id": "game-1",
        "players": [{ "id": "alice", "money": 100, "position": 3 }],
        "currentPlayerIndex": 0,
        "turn": 1
    }));
    Arc::new(Authority::new(config, state, Arc::new(MemoryPersistence::new()), 0))
}

/// Spin up the HTTP server on an OS-assigned port, returning the base URL.
async fn spawn_test_server(authority: Arc<Authority>) -> String {
    let app = build_router(authority);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_reports_strategy_and_counts() {
    let base = spawn_test_server(test_authority(test_config())).await;
    let resp = reqwest::get(format!("{}/api/v1/health", base))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: HealthResponse = resp.json().await.unwrap();
    assert_eq!(body.status, "ok");
    assert_eq!(body.strategy, SyncStrategy::Immediate);
    assert_eq!(body.connections, 0);
    assert_eq!(body.queue_len, 0);
    assert_eq!(body.pending_conflicts, 0);
}

#[tokio::test]
async fn metrics_reflect_committed_operations() {
    let authority = test_authority(test_config());
    let result = authority
        .engine()
        .sync_change("turn", Some(json!(1)), Some(json!(2)), OperationMetadata::new("alice", 1))
        .await;
    assert!(result.committed());

    let base = spawn_test_server(authority).await;
    let metrics: SyncMetrics = reqwest::get(format!("{}/api/v1/metrics", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics.total_operations, 1);
    assert_eq!(metrics.successful_operations, 1);
    assert_eq!(metrics.conflicts, 0);
}

#[tokio::test]
async fn state_endpoint_returns_current_tree() {
    let authority = test_authority(test_config());
    authority
        .engine()
        .sync_change("turn", Some(json!(1)), Some(json!(7)), OperationMetadata::new("alice", 1))
        .await;

    let base = spawn_test_server(authority).await;
    let state: Value = reqwest::get(format!("{}/api/v1/state", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["turn"], json!(7));
    assert_eq!(state["id"], json!("game-1"));
}

#[tokio::test]
async fn connections_lists_registered_players() {
    let authority = test_authority(test_config());
    authority
        .session()
        .register_connection(PlayerId::from("alice"), ConnectionId::from("conn-a"), 0)
        .await;

    let base = spawn_test_server(authority).await;
    let list: Vec<Value> = reqwest::get(format!("{}/api/v1/connections", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["player_id"], json!("alice"));
    assert_eq!(list[0]["status"], json!("connected"));
}

#[tokio::test]
async fn manual_conflicts_can_be_listed_and_resolved() {
    let authority = test_authority(test_config());
    let engine = authority.engine();
    assert!(engine
        .sync_change("turn", Some(json!(1)), Some(json!(2)), OperationMetadata::new("alice", 1))
        .await
        .committed());
    let stale = engine
        .sync_change("turn", Some(json!(1)), Some(json!(5)), OperationMetadata::new("bob", 1))
        .await;
    assert!(!stale.applied);

    let base = spawn_test_server(Arc::clone(&authority)).await;
    let conflicts: Vec<SyncConflict> = reqwest::get(format!("{}/api/v1/conflicts", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].remote_value, json!(5));

    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/conflicts/{}/resolve", base, conflicts[0].id);
    let resp = client.post(&url).json(&json!({ "value": 9 })).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let result: SyncResult = resp.json().await.unwrap();
    assert!(result.committed());
    assert_eq!(authority.engine().value_at("turn").await, Some(json!(9)));

    // A settled conflict is gone from the queue.
    let resp = client.post(&url).json(&json!({ "value": 1 })).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("conflict not found"));
}

#[tokio::test]
async fn resolve_with_malformed_id_is_rejected() {
    let base = spawn_test_server(test_authority(test_config())).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/conflicts/not-a-uuid/resolve", base))
        .json(&json!({ "value": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn validate_checks_submitted_state_and_fixes() {
    let base = spawn_test_server(test_authority(test_config())).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/validate", base))
        .json(&json!({
            "state": {
                "id": "game-2",
                "players": [{ "id": "alice", "money": 10 }],
                "currentPlayerIndex": 999
            },
            "auto_fix": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: ValidateResponse = resp.json().await.unwrap();
    assert!(!body.result.is_valid);
    assert_eq!(body.result.violations.len(), 1);
    assert_eq!(body.result.violations[0].rule_id, "player.current_index");

    let fix = body.fix.unwrap();
    assert!(fix.all_fixed());
    assert_eq!(fix.state.as_value()["currentPlayerIndex"], json!(0));
}

#[tokio::test]
async fn validate_defaults_to_engine_state() {
    let base = spawn_test_server(test_authority(test_config())).await;
    let body: ValidateResponse = reqwest::Client::new()
        .post(format!("{}/api/v1/validate", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body.result.is_valid);
    assert!(body.fix.is_none());
}

#[tokio::test]
async fn validate_content_type_is_json() {
    let base = spawn_test_server(test_authority(test_config())).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/validate", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.contains("application/json"));
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let base = spawn_test_server(test_authority(test_config())).await;
    let resp = reqwest::get(format!("{}/api/v1/nonexistent", base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
