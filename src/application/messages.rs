//! Wire protocol: inbound client messages and outbound server messages,
//! both JSON objects tagged by a snake_case `type` field.

use serde::{Deserialize, Serialize};

use crate::domain::entities::{LobbyPlayer, RoomState, RoomStatus};
use crate::domain::value_objects::{GameStateView, RoundResult};

/// Where a `draw_card` request takes its card from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawSource {
    #[default]
    Pile,
    Discard,
}

/// Messages a room participant may send. Frames with an unknown `type`
/// fail to decode and are dropped by the socket task.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinLobby {
        player_name: String,
    },
    LeaveLobby,
    StartGame,
    EndGame,
    DrawCard {
        #[serde(default)]
        source: DrawSource,
    },
    DiscardCard {
        card_id: String,
    },
    GoOut {
        card_id: String,
    },
    NextRound,
}

/// What the lobby screen and room list show about one room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub room_name: String,
    pub status: RoomStatus,
    pub player_count: usize,
    pub connected_players: usize,
    pub max_players: usize,
    pub min_players: usize,
}

impl RoomSummary {
    pub fn new(room: &RoomState, connected_players: usize) -> Self {
        Self {
            room_id: room.room_id.clone(),
            room_name: room.room_name.clone(),
            status: room.status,
            player_count: room.player_count,
            connected_players,
            max_players: room.max_players,
            min_players: room.min_players,
        }
    }
}

/// One line of the final standings, lowest cumulative score first.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub player_id: String,
    pub player_name: String,
    pub cumulative_score: u32,
}

/// Messages the server pushes to watchers and room participants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomsUpdate {
        rooms: Vec<RoomSummary>,
    },
    RoomState {
        room: RoomSummary,
    },
    LobbyUpdate {
        room_id: String,
        players: Vec<LobbyPlayer>,
        status: String,
    },
    GameStarting {
        room_id: String,
        players: Vec<LobbyPlayer>,
    },
    GameState {
        state: GameStateView,
    },
    PlayerWentOut {
        player_id: String,
        player_name: String,
        final_turns_remaining: usize,
    },
    RoundOver {
        round_number: u8,
        results: Vec<RoundResult>,
    },
    GameFinished {
        leaderboard: Vec<LeaderboardEntry>,
    },
    LobbyReset {
        room_id: String,
    },
    Error {
        message: String,
    },
}
