//! Round mechanics: deck construction, dealing, the four turn actions, and
//! round advancement. Every action validates before it mutates, so a
//! rejected action leaves the state untouched.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::entities::{decks_for_players, wild_rank_for_round, Card, LobbyPlayer, PlayerState, Rank, Suit};
use crate::domain::services::scoring::{best_partition, score_hand};
use crate::domain::value_objects::{GamePhase, GameState, RoundResult, TurnPhase, MAX_ROUND};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Not in a playable phase.")]
    WrongPhase,
    #[error("You have already drawn.")]
    AlreadyDrawn,
    #[error("You must draw first.")]
    MustDrawFirst,
    #[error("It is not your turn.")]
    NotYourTurn,
    #[error("Draw pile is empty.")]
    DrawPileEmpty,
    #[error("Discard pile is empty.")]
    DiscardPileEmpty,
    #[error("Card not in hand.")]
    CardNotInHand,
    #[error("Cannot go out: hand has unmatched cards.")]
    UnmatchedCards,
}

/// Build and shuffle the multi-deck card set for a round, tagging cards of
/// the wild rank.
pub fn build_deck<R: Rng>(num_players: usize, round_number: u8, rng: &mut R) -> Vec<Card> {
    let wild_rank = wild_rank_for_round(round_number);
    let num_decks = decks_for_players(num_players);
    let mut cards = Vec::with_capacity(num_decks * Suit::ALL.len() * Rank::ALL.len());
    for deck_index in 0..num_decks {
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                cards.push(Card::new(rank, suit, deck_index, rank == wild_rank));
            }
        }
    }
    cards.shuffle(rng);
    cards
}

/// Create a round-1 GameState from the named lobby entrants, with seating
/// order shuffled by the injected RNG.
pub fn init_game<R: Rng>(room_id: &str, lobby_players: &[LobbyPlayer], rng: &mut R) -> GameState {
    let mut seating: Vec<LobbyPlayer> = lobby_players.to_vec();
    seating.shuffle(rng);

    let players: Vec<PlayerState> = seating
        .iter()
        .map(|p| PlayerState::new(p.id.clone(), p.name.clone()))
        .collect();

    let mut gs = GameState {
        room_id: room_id.to_string(),
        current_player_index: 1 % players.len(), // left of the dealer opens
        players,
        dealer_index: 0,
        round_number: 1,
        wild_rank: wild_rank_for_round(1),
        phase: GamePhase::Playing,
        turn_phase: TurnPhase::Draw,
        draw_pile: Vec::new(),
        discard_pile: Vec::new(),
        gone_out_player_id: None,
        final_turns_remaining: 0,
        last_round_results: Vec::new(),
        next_round_confirmed_by: Vec::new(),
    };
    deal_round(&mut gs, rng);
    gs
}

/// Deal the current round: `round + 2` cards per player, one card turned up
/// to seed the discard pile, the rest face down as the draw pile.
pub fn deal_round<R: Rng>(gs: &mut GameState, rng: &mut R) {
    let cards_to_deal = gs.round_number as usize + 2;
    let mut deck = build_deck(gs.players.len(), gs.round_number, rng);

    for player in &mut gs.players {
        player.hand.clear();
        for _ in 0..cards_to_deal {
            if let Some(card) = deck.pop() {
                player.hand.push(card);
            }
        }
        player.has_gone_out = false;
        player.round_score = 0;
    }

    gs.discard_pile.clear();
    if let Some(card) = deck.pop() {
        gs.discard_pile.push(card);
    }
    gs.draw_pile = deck;
    gs.phase = GamePhase::Playing;
    gs.turn_phase = TurnPhase::Draw;
    gs.gone_out_player_id = None;
    gs.final_turns_remaining = 0;
    gs.last_round_results.clear();
}

/// Take the top face-down card from the draw pile.
pub fn draw_from_pile(gs: &mut GameState, player_id: &str) -> Result<(), EngineError> {
    validate_draw(gs, player_id)?;
    let card = gs.draw_pile.pop().ok_or(EngineError::DrawPileEmpty)?;
    let idx = gs.current_player_index;
    gs.players[idx].hand.push(card);
    gs.turn_phase = TurnPhase::Discard;
    Ok(())
}

/// Take the top face-up card from the discard pile.
pub fn draw_from_discard(gs: &mut GameState, player_id: &str) -> Result<(), EngineError> {
    validate_draw(gs, player_id)?;
    let card = gs.discard_pile.pop().ok_or(EngineError::DiscardPileEmpty)?;
    let idx = gs.current_player_index;
    gs.players[idx].hand.push(card);
    gs.turn_phase = TurnPhase::Discard;
    Ok(())
}

/// Discard a card and advance the turn.
pub fn discard_card(gs: &mut GameState, player_id: &str, card_id: &str) -> Result<(), EngineError> {
    validate_discard(gs, player_id)?;

    let idx = gs.current_player_index;
    let pos = gs.players[idx]
        .hand
        .iter()
        .position(|c| c.id == card_id)
        .ok_or(EngineError::CardNotInHand)?;

    let card = gs.players[idx].hand.remove(pos);
    gs.discard_pile.push(card);
    advance_turn(gs);
    Ok(())
}

/// Go out by discarding `card_id`: the rest of the hand must partition into
/// combinations with zero unmatched penalty.
///
/// From PLAYING this starts the final-turns window. From FINAL_TURNS the
/// player still scores zero, but the window owner and countdown are left
/// alone and the discard consumes one final turn as usual.
pub fn go_out(gs: &mut GameState, player_id: &str, card_id: &str) -> Result<(), EngineError> {
    validate_discard(gs, player_id)?;

    let idx = gs.current_player_index;
    let pos = gs.players[idx]
        .hand
        .iter()
        .position(|c| c.id == card_id)
        .ok_or(EngineError::CardNotInHand)?;

    let remaining: Vec<Card> = gs.players[idx]
        .hand
        .iter()
        .filter(|c| c.id != card_id)
        .cloned()
        .collect();
    if score_hand(&remaining, gs.wild_rank) != 0 {
        return Err(EngineError::UnmatchedCards);
    }

    let card = gs.players[idx].hand.remove(pos);
    gs.discard_pile.push(card);
    gs.players[idx].has_gone_out = true;

    if gs.phase == GamePhase::FinalTurns {
        advance_turn(gs);
        return Ok(());
    }

    gs.gone_out_player_id = Some(player_id.to_string());
    gs.phase = GamePhase::FinalTurns;
    gs.final_turns_remaining = gs.players.len() - 1;
    next_player(gs);
    Ok(())
}

/// Score every hand. The players flagged as gone out earn zero this round.
pub fn compute_round_results(gs: &mut GameState) -> Vec<RoundResult> {
    let wild_rank = gs.wild_rank;
    let mut results = Vec::with_capacity(gs.players.len());
    for player in &mut gs.players {
        let unmatched = best_partition(&player.hand, wild_rank);
        let penalty_cards: Vec<Card> = unmatched.iter().map(|&i| player.hand[i].clone()).collect();
        let points = if player.has_gone_out {
            0
        } else {
            penalty_cards.iter().map(|c| c.rank.penalty()).sum()
        };
        player.round_score = points;
        player.cumulative_score += points;
        results.push(RoundResult {
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            round_points: points,
            cumulative_score: player.cumulative_score,
            penalty_cards,
        });
    }
    results
}

/// Move from SCORING into the next round, or into FINISHED after round 11.
/// The dealer rotates left and the confirmation set empties either way.
pub fn advance_to_next_round<R: Rng>(gs: &mut GameState, rng: &mut R) {
    gs.next_round_confirmed_by.clear();
    if gs.round_number >= MAX_ROUND {
        gs.phase = GamePhase::Finished;
        return;
    }

    gs.round_number += 1;
    gs.wild_rank = wild_rank_for_round(gs.round_number);
    gs.dealer_index = (gs.dealer_index + 1) % gs.players.len();
    gs.current_player_index = (gs.dealer_index + 1) % gs.players.len();
    deal_round(gs, rng);
}

fn validate_draw(gs: &GameState, player_id: &str) -> Result<(), EngineError> {
    if !matches!(gs.phase, GamePhase::Playing | GamePhase::FinalTurns) {
        return Err(EngineError::WrongPhase);
    }
    if gs.turn_phase != TurnPhase::Draw {
        return Err(EngineError::AlreadyDrawn);
    }
    if gs.current_player().id != player_id {
        return Err(EngineError::NotYourTurn);
    }
    Ok(())
}

fn validate_discard(gs: &GameState, player_id: &str) -> Result<(), EngineError> {
    if !matches!(gs.phase, GamePhase::Playing | GamePhase::FinalTurns) {
        return Err(EngineError::WrongPhase);
    }
    if gs.turn_phase != TurnPhase::Discard {
        return Err(EngineError::MustDrawFirst);
    }
    if gs.current_player().id != player_id {
        return Err(EngineError::NotYourTurn);
    }
    Ok(())
}

/// After a discard: in FINAL_TURNS burn one remaining turn and close the
/// round when the window empties; otherwise pass to the next seat.
fn advance_turn(gs: &mut GameState) {
    if gs.phase == GamePhase::FinalTurns {
        gs.final_turns_remaining = gs.final_turns_remaining.saturating_sub(1);
        if gs.final_turns_remaining == 0 {
            gs.phase = GamePhase::Scoring;
            gs.last_round_results = compute_round_results(gs);
            return;
        }
    }
    next_player(gs);
}

/// Advance clockwise; during FINAL_TURNS a player who already went out is
/// skipped.
fn next_player(gs: &mut GameState) {
    let n = gs.players.len();
    for _ in 0..n {
        gs.current_player_index = (gs.current_player_index + 1) % n;
        let candidate = &gs.players[gs.current_player_index];
        if gs.phase == GamePhase::FinalTurns && candidate.has_gone_out {
            continue;
        }
        break;
    }
    gs.turn_phase = TurnPhase::Draw;
}
