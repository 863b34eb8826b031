//! Matching rules.
//!
//! A rule decides whether a group of cards forms a legal match and can list
//! every legal group among a set of cards. The dealer only talks to rules
//! through [`MatchRule`].

use setgrid_types::{Card, FeatureLayout};

/// Pluggable match evaluator.
pub trait MatchRule: Send + Sync {
    /// Number of cards in a group.
    fn group_size(&self) -> usize;

    /// Returns true if `cards` is a legal group.
    fn is_match(&self, cards: &[Card]) -> bool;

    /// Returns up to `max` legal groups among `cards`.
    ///
    /// Groups are enumerated in lexicographic order of their positions in
    /// `cards`; enumeration stops as soon as `max` groups have been found.
    fn find_groups(&self, cards: &[Card], max: usize) -> Vec<Vec<Card>> {
        let k = self.group_size();
        let mut groups = Vec::new();
        if max == 0 || k == 0 || k > cards.len() {
            return groups;
        }

        let n = cards.len();
        let mut idx: Vec<usize> = (0..k).collect();
        let mut candidate = Vec::with_capacity(k);
        loop {
            candidate.clear();
            candidate.extend(idx.iter().map(|&i| cards[i]));
            if self.is_match(&candidate) {
                groups.push(candidate.clone());
                if groups.len() >= max {
                    return groups;
                }
            }

            // Advance to the next combination.
            let mut pos = k;
            while pos > 0 {
                pos -= 1;
                if idx[pos] != pos + n - k {
                    break;
                }
                if pos == 0 {
                    return groups;
                }
            }
            idx[pos] += 1;
            for next in pos + 1..k {
                idx[next] = idx[next - 1] + 1;
            }
        }
    }

    /// Returns true if at least one legal group exists among `cards`.
    fn has_group(&self, cards: &[Card]) -> bool {
        !self.find_groups(cards, 1).is_empty()
    }

    /// Human-readable form of `card` for logs.
    fn describe(&self, card: Card) -> String {
        card.to_string()
    }
}

/// The classic rule: for every feature, the group's values are either all
/// equal or all distinct.
#[derive(Clone, Copy, Debug)]
pub struct FeatureRule {
    layout: FeatureLayout,
    group_size: usize,
}

impl FeatureRule {
    pub fn new(layout: FeatureLayout, group_size: usize) -> Self {
        Self { layout, group_size }
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    /// Feature vectors of `cards`, used when logging hints.
    pub fn feature_vectors(&self, cards: &[Card]) -> Vec<Vec<u32>> {
        cards
            .iter()
            .map(|card| self.layout.features_of(*card))
            .collect()
    }
}

impl Default for FeatureRule {
    fn default() -> Self {
        Self::new(FeatureLayout::default(), 3)
    }
}

impl MatchRule for FeatureRule {
    fn group_size(&self) -> usize {
        self.group_size
    }

    fn is_match(&self, cards: &[Card]) -> bool {
        if cards.len() != self.group_size || cards.is_empty() {
            return false;
        }
        if cards.iter().any(|card| !self.layout.is_valid_card(*card)) {
            return false;
        }
        for (i, card) in cards.iter().enumerate() {
            if cards[i + 1..].contains(card) {
                return false;
            }
        }

        let vectors = self.feature_vectors(cards);
        (0..self.layout.features as usize).all(|feature| {
            let first = vectors[0][feature];
            let all_equal = vectors.iter().all(|v| v[feature] == first);
            let all_distinct = vectors.iter().enumerate().all(|(i, v)| {
                vectors[i + 1..]
                    .iter()
                    .all(|other| other[feature] != v[feature])
            });
            all_equal || all_distinct
        })
    }

    fn describe(&self, card: Card) -> String {
        format!("{card} {:?}", self.layout.features_of(card))
    }
}
