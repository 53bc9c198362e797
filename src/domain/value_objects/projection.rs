use serde::Serialize;

use crate::domain::entities::{Card, Rank};
use crate::domain::value_objects::{GamePhase, GameState, RoundResult, TurnPhase};

/// One player as seen by a particular viewer: only the viewer's own hand is
/// disclosed, everyone else is reduced to a card count.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub hand: Vec<Card>,
    pub hand_count: usize,
    pub round_score: u32,
    pub cumulative_score: u32,
    pub has_gone_out: bool,
}

/// Per-viewer projection of the authoritative [`GameState`]. The draw pile
/// is reduced to a count; the discard pile stays public.
#[derive(Debug, Clone, Serialize)]
pub struct GameStateView {
    pub room_id: String,
    pub round_number: u8,
    pub wild_rank: Rank,
    pub phase: GamePhase,
    pub turn_phase: TurnPhase,
    pub players: Vec<PlayerView>,
    pub dealer_index: usize,
    pub current_player_index: usize,
    pub draw_pile: Vec<Card>,
    pub draw_pile_count: usize,
    pub discard_pile: Vec<Card>,
    pub gone_out_player_id: Option<String>,
    pub final_turns_remaining: usize,
    pub last_round_results: Vec<RoundResult>,
    pub next_round_confirmed_by: Vec<String>,
}

impl GameStateView {
    pub fn for_viewer(gs: &GameState, viewer_id: &str) -> Self {
        let players = gs
            .players
            .iter()
            .map(|p| PlayerView {
                id: p.id.clone(),
                name: p.name.clone(),
                hand: if p.id == viewer_id { p.hand.clone() } else { Vec::new() },
                hand_count: p.hand.len(),
                round_score: p.round_score,
                cumulative_score: p.cumulative_score,
                has_gone_out: p.has_gone_out,
            })
            .collect();

        Self {
            room_id: gs.room_id.clone(),
            round_number: gs.round_number,
            wild_rank: gs.wild_rank,
            phase: gs.phase,
            turn_phase: gs.turn_phase,
            players,
            dealer_index: gs.dealer_index,
            current_player_index: gs.current_player_index,
            draw_pile: Vec::new(),
            draw_pile_count: gs.draw_pile.len(),
            discard_pile: gs.discard_pile.clone(),
            gone_out_player_id: gs.gone_out_player_id.clone(),
            final_turns_remaining: gs.final_turns_remaining,
            last_round_results: gs.last_round_results.clone(),
            next_round_confirmed_by: gs.next_round_confirmed_by.clone(),
        }
    }
}
