//! Optimal hand partitioning: the minimum penalty over every way of
//! splitting a hand into sets and runs, with wild-card substitution.
//!
//! Cards are tracked by their index in the hand slice, so physically
//! duplicate cards from different decks stay distinct.

use std::collections::HashSet;

use smallvec::SmallVec;

use crate::domain::entities::{Card, Rank};

/// Index buffer sized for the largest legal hand (13 cards plus the draw).
type Combo = SmallVec<[usize; 14]>;

/// A card substitutes freely when its wild flag is set or its rank matches
/// the round's wild rank. The check must stay disjunctive: hand-crafted
/// cards may carry one without the other.
pub fn is_wild(card: &Card, wild_rank: Rank) -> bool {
    card.is_wild || card.rank == wild_rank
}

/// Minimum total penalty over all legal partitions of `hand`.
pub fn score_hand(hand: &[Card], wild_rank: Rank) -> u32 {
    best_partition(hand, wild_rank)
        .iter()
        .map(|&i| hand[i].rank.penalty())
        .sum()
}

/// Indices of the cards left unmatched by the best partition.
pub fn best_partition(hand: &[Card], wild_rank: Rank) -> Vec<usize> {
    let all: Vec<usize> = (0..hand.len()).collect();
    let worst: u32 = hand.iter().map(|c| c.rank.penalty()).sum();
    let mut search = PartitionSearch {
        hand,
        wild_rank,
        best: all.clone(),
        best_penalty: worst,
    };
    search.explore(&all, &mut Vec::new(), 0);
    search.best
}

/// Branch-and-bound over (remaining cards, unmatched so far). At every step
/// the head card either joins some combination or stays unmatched; the
/// all-unmatched hand is the starting upper bound.
struct PartitionSearch<'a> {
    hand: &'a [Card],
    wild_rank: Rank,
    best: Vec<usize>,
    best_penalty: u32,
}

impl PartitionSearch<'_> {
    fn explore(&mut self, remaining: &[usize], unmatched: &mut Vec<usize>, penalty: u32) {
        if penalty >= self.best_penalty {
            return;
        }
        if remaining.is_empty() {
            self.best = unmatched.clone();
            self.best_penalty = penalty;
            return;
        }

        let head = remaining[0];
        let rest = &remaining[1..];

        for combo in self.sets_containing(head, rest) {
            let leftover = without(rest, &combo);
            self.explore(&leftover, unmatched, penalty);
        }
        for combo in self.runs_containing(head, rest) {
            let leftover = without(rest, &combo);
            self.explore(&leftover, unmatched, penalty);
        }

        // Leave the head card unmatched
        unmatched.push(head);
        self.explore(rest, unmatched, penalty + self.hand[head].rank.penalty());
        unmatched.pop();
    }

    fn card_is_wild(&self, idx: usize) -> bool {
        is_wild(&self.hand[idx], self.wild_rank)
    }

    /// Every set of size >= 3 that contains `anchor` and otherwise draws
    /// from `rest`. Partner subsets are enumerated exhaustively: a wild may
    /// sit anywhere in the list relative to its natural partners.
    fn sets_containing(&self, anchor: usize, rest: &[usize]) -> Vec<Combo> {
        if self.card_is_wild(anchor) {
            return self.wild_anchor_sets(anchor, rest);
        }

        let anchor_rank = self.hand[anchor].rank;
        let partners: Vec<usize> = rest
            .iter()
            .copied()
            .filter(|&i| self.hand[i].rank == anchor_rank || self.card_is_wild(i))
            .collect();

        let mut combos = Vec::new();
        for mask in 0u32..(1 << partners.len()) {
            if mask.count_ones() < 2 {
                continue;
            }
            let mut combo: Combo = SmallVec::new();
            combo.push(anchor);
            for (bit, &idx) in partners.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    combo.push(idx);
                }
            }
            combos.push(combo);
        }
        combos
    }

    /// Sets anchored on a wild card: re-anchor on every natural card in
    /// `rest` with the wild passed along as a participant, plus pure-wild
    /// sets when at least two other wilds are available.
    fn wild_anchor_sets(&self, wild: usize, rest: &[usize]) -> Vec<Combo> {
        let mut seen = HashSet::new();
        let mut combos = Vec::new();

        for &substitute in rest.iter().filter(|&&i| !self.card_is_wild(i)) {
            let others: Vec<usize> = std::iter::once(wild)
                .chain(rest.iter().copied().filter(|&i| i != substitute))
                .collect();
            for combo in self.sets_containing(substitute, &others) {
                push_unique(&mut combos, &mut seen, combo);
            }
        }

        let other_wilds: Vec<usize> = rest
            .iter()
            .copied()
            .filter(|&i| self.card_is_wild(i))
            .collect();
        for take in 2..=other_wilds.len() {
            let mut combo: Combo = SmallVec::new();
            combo.push(wild);
            combo.extend(other_wilds.iter().copied().take(take));
            push_unique(&mut combos, &mut seen, combo);
        }

        combos
    }

    /// Every run of size 3..=13 containing `anchor`: one combination per
    /// suit-aware rank window, filled with naturals first and wilds for the
    /// gaps.
    fn runs_containing(&self, anchor: usize, rest: &[usize]) -> Vec<Combo> {
        if self.card_is_wild(anchor) {
            return self.wild_anchor_runs(anchor, rest);
        }

        let suit = self.hand[anchor].suit;
        let anchor_pos = self.hand[anchor].rank.position();
        let wilds: Vec<usize> = rest
            .iter()
            .copied()
            .filter(|&i| self.card_is_wild(i))
            .collect();
        let suit_cards: Vec<usize> = rest
            .iter()
            .copied()
            .filter(|&i| !self.card_is_wild(i) && self.hand[i].suit == suit)
            .collect();

        let mut combos = Vec::new();
        for start in anchor_pos.saturating_sub(12)..=anchor_pos {
            for length in 3..=Rank::ALL.len() {
                let end = start + length;
                if end > Rank::ALL.len() {
                    break;
                }
                if anchor_pos < start || anchor_pos >= end {
                    continue;
                }
                if let Some(combo) = self.fill_window(anchor, start..end, &suit_cards, &wilds) {
                    combos.push(combo);
                }
            }
        }
        combos
    }

    /// Fill every rank position of the window, skipping the anchor's own.
    /// Naturals of the run's suit are used when present, wilds otherwise;
    /// the window fails when both run out.
    fn fill_window(
        &self,
        anchor: usize,
        window: std::ops::Range<usize>,
        suit_cards: &[usize],
        wilds: &[usize],
    ) -> Option<Combo> {
        let anchor_pos = self.hand[anchor].rank.position();
        let mut combo: Combo = SmallVec::new();
        combo.push(anchor);
        let mut used_real: Combo = SmallVec::new();
        let mut next_wild = 0;

        for pos in window {
            if pos == anchor_pos {
                continue;
            }
            let real = suit_cards
                .iter()
                .copied()
                .find(|&i| self.hand[i].rank.position() == pos && !used_real.contains(&i));
            if let Some(i) = real {
                used_real.push(i);
                combo.push(i);
            } else if next_wild < wilds.len() {
                combo.push(wilds[next_wild]);
                next_wild += 1;
            } else {
                return None;
            }
        }
        (combo.len() >= 3).then_some(combo)
    }

    /// Runs anchored on a wild card: the wild never anchors directly, it is
    /// handed to every natural card in `rest` as a gap-filler.
    fn wild_anchor_runs(&self, wild: usize, rest: &[usize]) -> Vec<Combo> {
        let mut seen = HashSet::new();
        let mut combos = Vec::new();

        for &substitute in rest.iter().filter(|&&i| !self.card_is_wild(i)) {
            let others: Vec<usize> = std::iter::once(wild)
                .chain(rest.iter().copied().filter(|&i| i != substitute))
                .collect();
            for combo in self.runs_containing(substitute, &others) {
                push_unique(&mut combos, &mut seen, combo);
            }
        }
        combos
    }
}

fn without(indices: &[usize], combo: &Combo) -> Vec<usize> {
    indices
        .iter()
        .copied()
        .filter(|i| !combo.contains(i))
        .collect()
}

fn push_unique(combos: &mut Vec<Combo>, seen: &mut HashSet<Vec<usize>>, combo: Combo) {
    let mut key: Vec<usize> = combo.to_vec();
    key.sort_unstable();
    if seen.insert(key) {
        combos.push(combo);
    }
}
