//! Test doubles for the rule and display seams.

use crate::display::DisplaySink;
use crate::grid::lock;
use crate::rules::MatchRule;
use setgrid_types::{ActorId, Card, DisplayEvent, Slot};
use std::sync::Mutex;

/// Records every notification in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DisplayEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DisplayEvent> {
        lock(&self.events).clone()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    /// Every `(actor, score)` pair reported, in order.
    pub fn scores(&self) -> Vec<(ActorId, u32)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                DisplayEvent::ScoreChanged { actor, score } => Some((*actor, *score)),
                _ => None,
            })
            .collect()
    }

    pub fn winners(&self) -> Option<Vec<ActorId>> {
        lock(&self.events).iter().rev().find_map(|event| match event {
            DisplayEvent::WinnersAnnounced { winners } => Some(winners.clone()),
            _ => None,
        })
    }

    fn push(&self, event: DisplayEvent) {
        lock(&self.events).push(event);
    }
}

impl DisplaySink for RecordingSink {
    fn on_card_placed(&self, card: Card, slot: Slot) {
        self.push(DisplayEvent::CardPlaced { card, slot });
    }

    fn on_card_removed(&self, slot: Slot) {
        self.push(DisplayEvent::CardRemoved { slot });
    }

    fn on_marker_placed(&self, actor: ActorId, slot: Slot) {
        self.push(DisplayEvent::MarkerPlaced { actor, slot });
    }

    fn on_marker_removed(&self, actor: ActorId, slot: Slot) {
        self.push(DisplayEvent::MarkerRemoved { actor, slot });
    }

    fn on_score_changed(&self, actor: ActorId, score: u32) {
        self.push(DisplayEvent::ScoreChanged { actor, score });
    }

    fn on_freeze_changed(&self, actor: ActorId, millis: u64) {
        self.push(DisplayEvent::FreezeChanged { actor, millis });
    }

    fn on_clock_changed(&self, millis: u64, warning: bool) {
        self.push(DisplayEvent::ClockChanged { millis, warning });
    }

    fn on_winners_announced(&self, winners: &[ActorId]) {
        self.push(DisplayEvent::WinnersAnnounced {
            winners: winners.to_vec(),
        });
    }
}

/// Matches exactly the listed groups, in any order.
pub struct FixedRule {
    group_size: usize,
    groups: Vec<Vec<Card>>,
}

impl FixedRule {
    pub fn new(group_size: usize, groups: Vec<Vec<Card>>) -> Self {
        let groups = groups
            .into_iter()
            .map(|mut group| {
                group.sort_unstable();
                group
            })
            .collect();
        Self { group_size, groups }
    }

    /// A rule under which every group of `group_size` distinct cards matches.
    pub fn always(group_size: usize) -> AlwaysRule {
        AlwaysRule { group_size }
    }
}

impl MatchRule for FixedRule {
    fn group_size(&self) -> usize {
        self.group_size
    }

    fn is_match(&self, cards: &[Card]) -> bool {
        let mut sorted = cards.to_vec();
        sorted.sort_unstable();
        self.groups.contains(&sorted)
    }
}

pub struct AlwaysRule {
    group_size: usize,
}

impl MatchRule for AlwaysRule {
    fn group_size(&self) -> usize {
        self.group_size
    }

    fn is_match(&self, cards: &[Card]) -> bool {
        let mut sorted = cards.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.len() == self.group_size
    }
}
