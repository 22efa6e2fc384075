//! Offline queue inspection and control.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tether_engine::{OperationKey, PendingOperation, ReplayReport};

use crate::error::{AppError, Result};
use crate::AppState;

/// Create queue routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/queue", get(list_pending))
        .route("/queue/replay", post(replay))
        .route("/queue/{key}", delete(discard))
}

/// GET /queue - Every pending operation, oldest first.
async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<PendingOperation>>> {
    Ok(Json(state.client.pending().await?))
}

/// POST /queue/replay - Run one replay pass now.
async fn replay(State(state): State<AppState>) -> Result<Json<ReplayReport>> {
    match state.client.replay_pending().await? {
        Some(report) => Ok(Json(report)),
        None => Err(AppError::Conflict("a replay pass is already running".into())),
    }
}

/// DELETE /queue/{key} - Drop a pending operation without replaying it.
async fn discard(State(state): State<AppState>, Path(key): Path<String>) -> Result<StatusCode> {
    let key = OperationKey::from_raw(key);
    if state.client.queue().get(&key).await?.is_none() {
        return Err(AppError::NotFound(format!("no pending operation {key}")));
    }
    state.client.discard(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}
