use serde::{Deserialize, Serialize};

use crate::domain::entities::{Card, PlayerState, Rank};

/// Rounds in a full game; round 11 deals thirteen cards.
pub const MAX_ROUND: u8 = 11;

/// Phase of the active round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Playing,
    FinalTurns,
    Scoring,
    Finished,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Playing => "playing",
            GamePhase::FinalTurns => "final_turns",
            GamePhase::Scoring => "scoring",
            GamePhase::Finished => "finished",
        }
    }
}

/// Half-turn marker: every turn is a draw followed by a discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Draw,
    Discard,
}

impl TurnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::Draw => "draw",
            TurnPhase::Discard => "discard",
        }
    }
}

/// One player's line in the scoring summary of a finished round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub player_id: String,
    pub player_name: String,
    pub round_points: u32,
    pub cumulative_score: u32,
    pub penalty_cards: Vec<Card>,
}

/// Authoritative state of one game. Piles keep their top card at the back.
#[derive(Debug, Clone, Serialize)]
pub struct GameState {
    pub room_id: String,
    pub players: Vec<PlayerState>,
    pub dealer_index: usize,
    pub current_player_index: usize,
    pub round_number: u8,
    pub wild_rank: Rank,
    pub phase: GamePhase,
    pub turn_phase: TurnPhase,
    pub draw_pile: Vec<Card>,
    pub discard_pile: Vec<Card>,
    pub gone_out_player_id: Option<String>,
    pub final_turns_remaining: usize,
    pub last_round_results: Vec<RoundResult>,
    pub next_round_confirmed_by: Vec<String>,
}

impl GameState {
    /// The player whose turn it is.
    pub fn current_player(&self) -> &PlayerState {
        &self.players[self.current_player_index]
    }

    /// Total cards across the draw pile, discard pile, and every hand.
    /// Invariant within a round.
    pub fn total_card_count(&self) -> usize {
        self.draw_pile.len()
            + self.discard_pile.len()
            + self.players.iter().map(|p| p.hand.len()).sum::<usize>()
    }
}
