use serde::{Deserialize, Serialize};

use crate::domain::entities::LobbyPlayer;
use crate::domain::value_objects::GameState;

/// Fixed number of rooms; they exist from startup to shutdown.
pub const NUM_ROOMS: usize = 10;
/// Named lobby players required before a game can start.
pub const MIN_PLAYERS: usize = 2;
/// Participant sockets a room will accept.
pub const MAX_PLAYERS: usize = 8;

/// Room availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Empty,
    Gathering,
    InGame,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Empty => "empty",
            RoomStatus::Gathering => "gathering",
            RoomStatus::InGame => "in_game",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(RoomStatus::Empty),
            "gathering" => Some(RoomStatus::Gathering),
            "in_game" => Some(RoomStatus::InGame),
            _ => None,
        }
    }
}

/// A room's full state: participants, named lobby entrants, and the active
/// game when one is running.
#[derive(Debug, Clone, Serialize)]
pub struct RoomState {
    pub room_id: String,
    pub room_name: String,
    pub status: RoomStatus,
    pub player_count: usize,
    pub player_ids: Vec<String>,
    pub lobby_players: Vec<LobbyPlayer>,
    pub game_state: Option<GameState>,
    pub max_players: usize,
    pub min_players: usize,
}

impl RoomState {
    /// Create one of the fixed rooms (`index` is 1-based).
    pub fn new(index: usize) -> Self {
        Self {
            room_id: format!("room-{index}"),
            room_name: format!("Room {index}"),
            status: RoomStatus::Empty,
            player_count: 0,
            player_ids: Vec::new(),
            lobby_players: Vec::new(),
            game_state: None,
            max_players: MAX_PLAYERS,
            min_players: MIN_PLAYERS,
        }
    }

    pub fn is_full(&self) -> bool {
        self.player_ids.len() >= self.max_players
    }

    /// A game can start once enough entrants have submitted names.
    pub fn can_start(&self) -> bool {
        self.status != RoomStatus::InGame && self.lobby_players.len() >= self.min_players
    }
}
