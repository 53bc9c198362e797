use std::sync::Arc;

use crate::application::coordinator::RoomCoordinator;

/// Application state shared across all handlers
pub struct AppState {
    /// Owns the room table and every connection index
    pub coordinator: Arc<RoomCoordinator>,
}

impl AppState {
    pub fn new() -> Self {
        // A fixed seed makes every shuffle reproducible, for local play
        // and scripted testing
        let seed = std::env::var("GAME_RNG_SEED")
            .ok()
            .and_then(|value| value.parse::<u64>().ok());
        if let Some(seed) = seed {
            tracing::info!(seed, "using seeded RNG");
        }

        Self {
            coordinator: Arc::new(RoomCoordinator::new(seed)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
