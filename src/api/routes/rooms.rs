use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::application::messages::RoomSummary;
use crate::infrastructure::app_state::AppState;

#[derive(Serialize)]
pub struct RoomsResponse {
    rooms: Vec<RoomSummary>,
}

/// HTTP snapshot of all rooms, for clients that poll before opening the
/// lobby socket.
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<RoomsResponse> {
    Json(RoomsResponse {
        rooms: state.coordinator.room_summaries(),
    })
}
