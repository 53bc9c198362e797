use serde::{Deserialize, Serialize};

/// Card suits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    pub fn as_str(&self) -> &'static str {
        match self {
            Suit::Hearts => "hearts",
            Suit::Diamonds => "diamonds",
            Suit::Clubs => "clubs",
            Suit::Spades => "spades",
        }
    }
}

/// Card ranks, in run order (ace is always low)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Position in the run order (ace = 0 .. king = 12).
    pub fn position(self) -> usize {
        self as usize
    }

    /// Penalty points for an unmatched card of this rank.
    pub fn penalty(self) -> u32 {
        match self {
            Rank::Ace => 15,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen | Rank::King => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Ace => "ace",
            Rank::Two => "two",
            Rank::Three => "three",
            Rank::Four => "four",
            Rank::Five => "five",
            Rank::Six => "six",
            Rank::Seven => "seven",
            Rank::Eight => "eight",
            Rank::Nine => "nine",
            Rank::Ten => "ten",
            Rank::Jack => "jack",
            Rank::Queen => "queen",
            Rank::King => "king",
        }
    }
}

/// Wild rank for a round: round 1 makes threes wild, round 11 makes kings wild.
pub fn wild_rank_for_round(round_number: u8) -> Rank {
    Rank::ALL[round_number as usize + 1]
}

/// Number of decks shuffled together for a given player count.
pub fn decks_for_players(num_players: usize) -> usize {
    match num_players {
        0..=3 => 1,
        4..=5 => 2,
        _ => 3,
    }
}

/// A physical playing card. Two cards with the same rank and suit from
/// different decks are distinct entities with distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub suit: Suit,
    pub rank: Rank,
    pub is_wild: bool,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit, deck_index: usize, is_wild: bool) -> Self {
        Self {
            id: format!("{}_{}_{}", rank.as_str(), suit.as_str(), deck_index),
            suit,
            rank,
            is_wild,
        }
    }
}
