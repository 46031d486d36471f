use gamesync_types::{
    GameState, OperationId, OperationMetadata, OperationType, PlayerId, Priority, StatePath,
    SyncOperation, Timestamp,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;

// ── Ids ──────────────────────────────────────────────────────────

#[test]
fn operation_ids_are_unique() {
    let a = OperationId::new();
    let b = OperationId::new();
    assert_ne!(a, b);
}

#[test]
fn operation_id_parse_roundtrip() {
    let id = OperationId::new();
    assert_eq!(OperationId::from_str(&id.to_string()).unwrap(), id);
    assert!(OperationId::parse("not-a-uuid").is_err());
}

#[test]
fn player_id_is_transparent_string() {
    let id = PlayerId::from("alice");
    assert_eq!(serde_json::to_string(&id).unwrap(), r#""alice""#);
    assert_eq!(id.as_str(), "alice");
}

// ── Timestamp ────────────────────────────────────────────────────

#[test]
fn timestamp_arithmetic_saturates() {
    let t = Timestamp::from_millis(1_000);
    assert_eq!(t.saturating_sub(Duration::from_secs(5)).as_millis(), 0);
    assert_eq!(t.saturating_add(Duration::from_millis(250)).as_millis(), 1_250);
    assert_eq!(Timestamp::from_millis(500).since(t), Duration::ZERO);
    assert_eq!(t.since(Timestamp::from_millis(400)), Duration::from_millis(600));
}

// ── Operations ───────────────────────────────────────────────────

#[test]
fn operation_serializes_type_field() {
    let op = SyncOperation::update(
        "players[0].money",
        json!(500),
        OperationMetadata::new("alice", 4).with_priority(Priority::High),
    )
    .at(Timestamp::from_millis(10));

    let value = serde_json::to_value(&op).unwrap();
    assert_eq!(value["type"], json!("update"));
    assert_eq!(value["metadata"]["priority"], json!("high"));
    assert_eq!(value["timestamp"], json!(10));

    let back: SyncOperation = serde_json::from_value(value).unwrap();
    assert_eq!(back, op);
}

#[test]
fn metadata_defaults_when_absent() {
    let raw = json!({
        "id": OperationId::new(),
        "type": "delete",
        "path": "board.spaces[3].owner",
        "timestamp": 1,
        "metadata": {"source": "server", "version": 2}
    });
    let op: SyncOperation = serde_json::from_value(raw).unwrap();
    assert_eq!(op.op_type, OperationType::Delete);
    assert_eq!(op.metadata.priority, Priority::Normal);
    assert!(op.metadata.dependencies.is_empty());
    assert!(op.new_value.is_none());
}

#[test]
fn dependencies_stay_ordered_and_unique() {
    let a = OperationId::new();
    let b = OperationId::new();
    let meta = OperationMetadata::new("s", 1)
        .with_dependency(b)
        .with_dependency(a)
        .with_dependency(b);
    assert_eq!(meta.dependencies, vec![b, a]);
}

#[test]
fn priority_order() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);
    assert_eq!(Priority::DESCENDING[0], Priority::Critical);
}

// ── GameState ────────────────────────────────────────────────────

#[test]
fn game_state_is_copy_on_write() {
    let mut live = GameState::new(json!({"players": [{"money": 1500}]}));
    let captured = live.clone();
    assert!(live.ptr_eq(&captured));

    let path = StatePath::parse("players[0].money").unwrap();
    path.set(live.make_mut(), json!(200)).unwrap();

    assert!(!live.ptr_eq(&captured));
    assert_eq!(captured.value_at(&path), Some(&json!(1500)));
    assert_eq!(live.value_at(&path), Some(&json!(200)));
}

#[test]
fn game_state_serde_is_transparent() {
    let state = GameState::new(json!({"id": "g1"}));
    assert_eq!(serde_json::to_string(&state).unwrap(), r#"{"id":"g1"}"#);
}
