//! Health and connectivity endpoints.

use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tether_engine::ConnectivityState;

use crate::error::Result;
use crate::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub connectivity: ConnectivityState,
    /// Operations waiting for replay
    pub pending: usize,
}

/// A connectivity observation reported by the host platform.
#[derive(Debug, Deserialize)]
pub struct ConnectivityUpdate {
    pub state: ConnectivityState,
}

/// Result of a reported observation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityResponse {
    pub state: ConnectivityState,
    /// Whether the report started a replay pass
    pub replay_started: bool,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/connectivity", put(report_connectivity))
        .route("/", get(root))
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connectivity: state.client.connectivity().state(),
        pending: state.client.queue().len().await?,
    }))
}

/// PUT /connectivity - Record an online/offline signal.
async fn report_connectivity(
    State(state): State<AppState>,
    Json(update): Json<ConnectivityUpdate>,
) -> Json<ConnectivityResponse> {
    let replay = state.client.set_connectivity(update.state);
    Json(ConnectivityResponse {
        state: state.client.connectivity().state(),
        replay_started: replay.is_some(),
    })
}

/// Root handler.
async fn root() -> &'static str {
    "Tether Agent"
}
