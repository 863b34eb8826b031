//! Card, slot and actor identifiers plus the feature encoding of cards.
//!
//! Cards are encoded as `0..deck_size`. With `features` attributes of
//! `feature_size` values each, the value of feature `i` is the `i`-th
//! base-`feature_size` digit of the card id (least significant digit first):
//! - feature 0 = card % feature_size
//! - feature 1 = (card / feature_size) % feature_size
//! - ...
//!
//! The classic deck uses 4 features with 3 values each (81 cards).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of features per card.
pub const DEFAULT_FEATURES: u32 = 4;

/// Default number of values per feature.
pub const DEFAULT_FEATURE_SIZE: u32 = 3;

/// A card id. Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Card(pub u32);

/// A grid position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub usize);

/// A participant at the table (0-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub usize);

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "card-{}", self.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

/// Shape of the feature space cards are drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    /// Number of features per card.
    pub features: u32,
    /// Number of distinct values each feature can take.
    pub feature_size: u32,
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            features: DEFAULT_FEATURES,
            feature_size: DEFAULT_FEATURE_SIZE,
        }
    }
}

impl FeatureLayout {
    pub fn new(features: u32, feature_size: u32) -> Self {
        Self {
            features,
            feature_size,
        }
    }

    /// Number of distinct cards the layout can encode (`None` on overflow).
    pub fn full_deck_size(&self) -> Option<u32> {
        self.feature_size.checked_pow(self.features)
    }

    /// Returns true if `card` can be encoded by this layout.
    pub fn is_valid_card(&self, card: Card) -> bool {
        self.full_deck_size().is_some_and(|size| card.0 < size)
    }

    /// Returns the feature values of `card`, feature 0 first.
    pub fn features_of(&self, card: Card) -> Vec<u32> {
        let mut rest = card.0;
        let mut values = Vec::with_capacity(self.features as usize);
        for _ in 0..self.features {
            if self.feature_size == 0 {
                values.push(0);
                continue;
            }
            values.push(rest % self.feature_size);
            rest /= self.feature_size;
        }
        values
    }

    /// Inverse of [`FeatureLayout::features_of`].
    ///
    /// Returns `None` if the number of values does not match the layout or a
    /// value is out of range.
    pub fn card_from_features(&self, values: &[u32]) -> Option<Card> {
        if values.len() != self.features as usize {
            return None;
        }
        let mut id: u32 = 0;
        for value in values.iter().rev() {
            if *value >= self.feature_size {
                return None;
            }
            id = id.checked_mul(self.feature_size)?.checked_add(*value)?;
        }
        Some(Card(id))
    }
}
