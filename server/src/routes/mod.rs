//! HTTP route definitions.

mod calls;
mod health;
mod queue;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(calls::routes())
        .merge(queue::routes())
}
