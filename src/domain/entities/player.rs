use serde::{Deserialize, Serialize};

use crate::domain::entities::Card;

/// A seated player inside an active game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub hand: Vec<Card>,
    pub round_score: u32,
    pub cumulative_score: u32,
    pub has_gone_out: bool,
}

impl PlayerState {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            hand: Vec::new(),
            round_score: 0,
            cumulative_score: 0,
            has_gone_out: false,
        }
    }
}

/// A player who has submitted a display name in the pre-game waiting room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub id: String,
    pub name: String,
}

impl LobbyPlayer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
