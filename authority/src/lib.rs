//! GameSync authority: wires the sync engine, the realtime session and the
//! consistency validator together and exposes them over a small HTTP API.

pub mod config;
pub mod observer;
pub mod persistence;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use gamesync_consistency::{ConsistencyContext, ConsistencyResult, ConsistencyValidator, FixResult};
use gamesync_realtime::{ConnectionInfo, Persistence, RealtimeSession};
use gamesync_sync::{SyncConflict, SyncEngine, SyncError, SyncMetrics, SyncResult, SyncStrategy};
use gamesync_types::{ConflictId, GameState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use config::AuthorityConfig;
pub use observer::TracingObserver;
pub use persistence::{FilePersistence, ValidatingPersistence};

/// The running components of one authoritative game.
pub struct Authority {
    config: AuthorityConfig,
    engine: Arc<SyncEngine>,
    session: Arc<RealtimeSession>,
    validator: Arc<ConsistencyValidator>,
}

impl Authority {
    /// Builds an authority over `state` that persists validated snapshots
    /// through `store`. `snapshot_version` is the last persisted snapshot
    /// version, 0 for a fresh game.
    pub fn new(
        config: AuthorityConfig,
        state: GameState,
        store: Arc<dyn Persistence>,
        snapshot_version: u64,
    ) -> Self {
        let engine = Arc::new(
            SyncEngine::with_state(config.sync.clone(), state).with_observer(Arc::new(TracingObserver)),
        );
        let validator = Arc::new(ConsistencyValidator::with_default_rules(config.validator.clone()));
        let persistence = Arc::new(ValidatingPersistence::new(store, Arc::clone(&validator)));
        let session = Arc::new(
            RealtimeSession::new(config.realtime.clone(), Arc::clone(&engine))
                .with_persistence(persistence)
                .with_snapshot_version(snapshot_version),
        );
        Self {
            config,
            engine,
            session,
            validator,
        }
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn session(&self) -> &Arc<RealtimeSession> {
        &self.session
    }

    pub fn validator(&self) -> &Arc<ConsistencyValidator> {
        &self.validator
    }

    /// Starts the batch, heartbeat and snapshot loops.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let mut handles = vec![
            self.engine.spawn_batch_loop(),
            self.session.spawn_heartbeat_loop(),
        ];
        if let Some(period) = self.config.snapshot_interval() {
            let session = Arc::downgrade(&self.session);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(session) = session.upgrade() else {
                        debug!("Session dropped, snapshot loop exiting");
                        break;
                    };
                    let state = session.engine().snapshot().await;
                    if let Err(e) = session.save_snapshot(state).await {
                        warn!("Periodic snapshot failed: {}", e);
                    }
                }
            }));
        }
        handles
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub strategy: SyncStrategy,
    pub connections: usize,
    pub queue_len: usize,
    pub pending_conflicts: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ValidateRequest {
    /// State to check; the engine's current state when absent.
    #[serde(default)]
    pub state: Option<Value>,
    #[serde(default)]
    pub context: ConsistencyContext,
    #[serde(default)]
    pub auto_fix: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ValidateResponse {
    pub result: ConsistencyResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixResult>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResolveRequest {
    pub value: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

/// An error response with a status code.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let status = match e {
            SyncError::ConflictNotFound(_) => StatusCode::NOT_FOUND,
            SyncError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, e.to_string())
    }
}

async fn health_handler(State(authority): State<Arc<Authority>>) -> Json<HealthResponse> {
    let metrics = authority.engine.metrics().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        strategy: authority.engine.strategy(),
        connections: authority.session.connections().await.len(),
        queue_len: metrics.queue_len,
        pending_conflicts: metrics.pending_conflicts,
    })
}

async fn metrics_handler(State(authority): State<Arc<Authority>>) -> Json<SyncMetrics> {
    Json(authority.engine.metrics().await)
}

async fn state_handler(State(authority): State<Arc<Authority>>) -> Json<Value> {
    Json(authority.engine.snapshot().await.into_value())
}

async fn connections_handler(State(authority): State<Arc<Authority>>) -> Json<Vec<ConnectionInfo>> {
    Json(authority.session.connections().await)
}

async fn conflicts_handler(State(authority): State<Arc<Authority>>) -> Json<Vec<SyncConflict>> {
    Json(authority.engine.pending_conflicts().await)
}

async fn resolve_handler(
    State(authority): State<Arc<Authority>>,
    Path(id): Path<ConflictId>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<SyncResult>, ApiError> {
    let result = authority.engine.resolve_conflict(id, request.value).await?;
    Ok(Json(result))
}

async fn validate_handler(
    State(authority): State<Arc<Authority>>,
    Json(request): Json<ValidateRequest>,
) -> Json<ValidateResponse> {
    let state = match request.state {
        Some(value) => GameState::new(value),
        None => authority.engine.snapshot().await,
    };
    let result = authority.validator.check_consistency(&state, &request.context);
    let fix = (request.auto_fix && result.fixable().next().is_some())
        .then(|| authority.validator.auto_fix_violations(&state, &result.violations));
    Json(ValidateResponse { result, fix })
}

/// Build the HTTP API router over a running authority.
pub fn build_router(authority: Arc<Authority>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/metrics", get(metrics_handler))
        .route("/api/v1/state", get(state_handler))
        .route("/api/v1/connections", get(connections_handler))
        .route("/api/v1/conflicts", get(conflicts_handler))
        .route("/api/v1/conflicts/{id}/resolve", post(resolve_handler))
        .route("/api/v1/validate", post(validate_handler))
        .with_state(authority)
}
