//! Remote call endpoints.
//!
//! Every handler answers `200` with a `CallResult` body, whatever happened
//! upstream. Only malformed requests are rejected.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tether_engine::{CallResult, InventoryItem, Lead, RequestOptions};

use crate::error::{AppError, Result};
use crate::AppState;

/// Body of `POST /call`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub target: String,
    #[serde(flatten)]
    pub options: RequestOptions,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRequest {
    pub employee_id: String,
}

/// Create call routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/call", post(generic_call))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/attendance/clock-in", post(clock_in))
        .route("/attendance/clock-out", post(clock_out))
        .route("/attendance/break/start", post(start_break))
        .route("/attendance/break/end", post(end_break))
        .route("/attendance/status/{employee_id}", get(attendance_status))
        .route("/leads", post(submit_lead))
        .route("/inventory", get(list_inventory).post(create_inventory_item))
        .route(
            "/inventory/{id}",
            put(update_inventory_item).delete(delete_inventory_item),
        )
}

fn employee_id(request: EmployeeRequest) -> Result<String> {
    let id = request.employee_id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("employeeId must not be empty".into()));
    }
    Ok(id.to_string())
}

/// POST /call - Make any remote call through the client.
async fn generic_call(
    State(state): State<AppState>,
    Json(request): Json<CallRequest>,
) -> Result<Json<CallResult<Value>>> {
    if !request.target.starts_with('/') {
        return Err(AppError::BadRequest(format!(
            "target must start with '/': {}",
            request.target
        )));
    }
    let result = state.client.request(&request.target, request.options).await;
    Ok(Json(result))
}

async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Json<CallResult<Value>> {
    Json(
        state
            .client
            .login(&credentials.email, &credentials.password)
            .await,
    )
}

async fn logout(State(state): State<AppState>) -> Json<CallResult<Value>> {
    Json(state.client.logout().await)
}

async fn clock_in(
    State(state): State<AppState>,
    Json(request): Json<EmployeeRequest>,
) -> Result<Json<CallResult<Value>>> {
    let id = employee_id(request)?;
    Ok(Json(state.client.clock_in(&id).await))
}

async fn clock_out(
    State(state): State<AppState>,
    Json(request): Json<EmployeeRequest>,
) -> Result<Json<CallResult<Value>>> {
    let id = employee_id(request)?;
    Ok(Json(state.client.clock_out(&id).await))
}

async fn start_break(
    State(state): State<AppState>,
    Json(request): Json<EmployeeRequest>,
) -> Result<Json<CallResult<Value>>> {
    let id = employee_id(request)?;
    Ok(Json(state.client.start_break(&id).await))
}

async fn end_break(
    State(state): State<AppState>,
    Json(request): Json<EmployeeRequest>,
) -> Result<Json<CallResult<Value>>> {
    let id = employee_id(request)?;
    Ok(Json(state.client.end_break(&id).await))
}

async fn attendance_status(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
) -> Json<CallResult<Value>> {
    Json(state.client.attendance_status(&employee_id).await)
}

async fn submit_lead(
    State(state): State<AppState>,
    Json(lead): Json<Lead>,
) -> Json<CallResult<Value>> {
    Json(state.client.submit_lead(&lead).await)
}

async fn list_inventory(State(state): State<AppState>) -> Json<CallResult<Vec<InventoryItem>>> {
    Json(state.client.list_inventory().await)
}

async fn create_inventory_item(
    State(state): State<AppState>,
    Json(item): Json<InventoryItem>,
) -> Json<CallResult<Value>> {
    Json(state.client.create_inventory_item(&item).await)
}

async fn update_inventory_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(item): Json<InventoryItem>,
) -> Json<CallResult<Value>> {
    Json(state.client.update_inventory_item(&id, &item).await)
}

async fn delete_inventory_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<CallResult<Value>> {
    Json(state.client.delete_inventory_item(&id).await)
}
