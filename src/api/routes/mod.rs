pub mod health;
pub mod rooms;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::ws;
use crate::infrastructure::app_state::AppState;

/// Build the full application router: health and room snapshots over HTTP,
/// plus the two WebSocket endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health::health_handler))
        .route("/rooms", get(rooms::list_rooms))
        .route("/ws/lobby", get(ws::lobby_ws_handler))
        .route("/ws/room/:room_id", get(ws::room_ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
