//! Shared card grid.
//!
//! The grid owns the slot to card bijection and the actor by slot marker
//! matrix. Every slot has its own lock guarding its card and its marker row,
//! every actor has a lock guarding its ordered hand, and one lock guards the
//! reverse card to slot index.
//!
//! ## Lock order
//! slot -> actor hand -> reverse index. A caller holding several slot locks
//! must acquire them in ascending slot order.
//!
//! ## Invariants
//! - `card_at(s) == Some(c)` iff `slot_of(c) == Some(s)`.
//! - A marker only exists on an occupied slot.
//! - An actor holds at most `hand_size` markers, and its hand lists exactly
//!   the slots carrying its markers.

use crate::display::DisplaySink;
use setgrid_types::{ActorId, Card, Slot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::error;

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate leaves its data consistent before any
/// call that could panic, so the guarded state is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("{slot} is outside the grid ({size} slots)")]
    SlotOutOfRange { slot: Slot, size: usize },
    #[error("{slot} already holds {card}")]
    SlotOccupied { slot: Slot, card: Card },
    #[error("{card} is already displayed at {slot}")]
    CardDisplayed { card: Card, slot: Slot },
    #[error("{slot} holds {card} but the index maps it to {indexed:?}")]
    BijectionMismatch {
        slot: Slot,
        card: Card,
        indexed: Option<Slot>,
    },
    #[error("index lists {card} at {slot} but the slot disagrees")]
    StaleIndex { card: Card, slot: Slot },
    #[error("{actor} has a marker on empty {slot}")]
    MarkerOnEmptySlot { actor: ActorId, slot: Slot },
    #[error("{actor} hand does not match its markers")]
    HandMismatch { actor: ActorId },
    #[error("{actor} holds {count} markers, more than {limit}")]
    HandOverflow {
        actor: ActorId,
        count: usize,
        limit: usize,
    },
}

/// Result of [`Grid::toggle_marker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleOutcome {
    Placed,
    Removed,
    /// Nothing changed: empty slot, full hand, or unknown slot/actor.
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Toggle {
    pub outcome: ToggleOutcome,
    /// Markers held by the actor after the toggle.
    pub count: usize,
    pub card_present: bool,
}

struct SlotState {
    card: Option<Card>,
    markers: Vec<bool>,
}

pub struct Grid {
    slots: Vec<Mutex<SlotState>>,
    hands: Vec<Mutex<Vec<Slot>>>,
    index: Mutex<HashMap<Card, Slot>>,
    hand_size: usize,
    ready: AtomicBool,
    display: Arc<dyn DisplaySink>,
}

impl Grid {
    pub fn new(
        table_size: usize,
        players: usize,
        hand_size: usize,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        let slots = (0..table_size)
            .map(|_| {
                Mutex::new(SlotState {
                    card: None,
                    markers: vec![false; players],
                })
            })
            .collect();
        let hands = (0..players)
            .map(|_| Mutex::new(Vec::with_capacity(hand_size)))
            .collect();
        Self {
            slots,
            hands,
            index: Mutex::new(HashMap::with_capacity(table_size)),
            hand_size,
            ready: AtomicBool::new(false),
            display,
        }
    }

    pub fn table_size(&self) -> usize {
        self.slots.len()
    }

    pub fn players(&self) -> usize {
        self.hands.len()
    }

    pub fn hand_size(&self) -> usize {
        self.hand_size
    }

    /// Whether dealing has completed and actors may toggle markers.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Displays `card` at `slot`.
    pub fn place(&self, card: Card, slot: Slot) -> Result<(), GridError> {
        let cell = self.slot_lock(slot)?;
        let mut state = lock(cell);
        if let Some(existing) = state.card {
            return Err(GridError::SlotOccupied {
                slot,
                card: existing,
            });
        }
        {
            let mut index = lock(&self.index);
            if let Some(&at) = index.get(&card) {
                let err = GridError::CardDisplayed { card, slot: at };
                error!(%err, "refusing to place card twice");
                return Err(err);
            }
            index.insert(card, slot);
        }
        state.card = Some(card);
        self.display.on_card_placed(card, slot);
        Ok(())
    }

    /// Removes the card at `slot` together with every marker on it.
    ///
    /// Returns `None` if the slot is empty or out of range. Markers are cleared
    /// inside the same slot critical section, so a concurrent toggle on this
    /// slot is ordered entirely before or entirely after the removal.
    pub fn remove(&self, slot: Slot) -> Option<Card> {
        let cell = self.slots.get(slot.0)?;
        let mut state = lock(cell);
        let card = state.card.take()?;

        for (actor, marked) in state.markers.iter_mut().enumerate() {
            if !*marked {
                continue;
            }
            *marked = false;
            lock(&self.hands[actor]).retain(|s| *s != slot);
            self.display.on_marker_removed(ActorId(actor), slot);
        }

        {
            let mut index = lock(&self.index);
            match index.remove(&card) {
                Some(at) if at == slot => {}
                indexed => {
                    error!(
                        err = %GridError::BijectionMismatch { slot, card, indexed },
                        "grid index out of sync"
                    );
                }
            }
        }

        self.display.on_card_removed(slot);
        Some(card)
    }

    /// Toggles `actor`'s marker on `slot`.
    ///
    /// An existing marker is removed. Otherwise a marker is placed iff the slot
    /// holds a card and the actor holds fewer than `hand_size` markers.
    pub fn toggle_marker(&self, actor: ActorId, slot: Slot) -> Toggle {
        let (Some(cell), Some(hand)) = (self.slots.get(slot.0), self.hands.get(actor.0)) else {
            return Toggle {
                outcome: ToggleOutcome::Rejected,
                count: self.marker_count(actor),
                card_present: false,
            };
        };

        let mut state = lock(cell);
        let card_present = state.card.is_some();
        let mut hand = lock(hand);

        if state.markers[actor.0] {
            state.markers[actor.0] = false;
            hand.retain(|s| *s != slot);
            self.display.on_marker_removed(actor, slot);
            return Toggle {
                outcome: ToggleOutcome::Removed,
                count: hand.len(),
                card_present,
            };
        }

        if !card_present || hand.len() >= self.hand_size {
            return Toggle {
                outcome: ToggleOutcome::Rejected,
                count: hand.len(),
                card_present,
            };
        }

        state.markers[actor.0] = true;
        hand.push(slot);
        self.display.on_marker_placed(actor, slot);
        Toggle {
            outcome: ToggleOutcome::Placed,
            count: hand.len(),
            card_present,
        }
    }

    /// Snapshot of the slots without a card.
    pub fn empty_slots(&self) -> Vec<Slot> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, cell)| lock(cell).card.is_none())
            .map(|(i, _)| Slot(i))
            .collect()
    }

    /// Removes every card and marker, returning the removed cards in slot order.
    pub fn clear_all(&self) -> Vec<Card> {
        (0..self.slots.len())
            .filter_map(|i| self.remove(Slot(i)))
            .collect()
    }

    pub fn card_at(&self, slot: Slot) -> Option<Card> {
        self.slots.get(slot.0).and_then(|cell| lock(cell).card)
    }

    pub fn slot_of(&self, card: Card) -> Option<Slot> {
        lock(&self.index).get(&card).copied()
    }

    /// Cards currently displayed, in slot order.
    pub fn cards(&self) -> Vec<Card> {
        self.slots.iter().filter_map(|cell| lock(cell).card).collect()
    }

    /// Displayed cards with their slots, in slot order.
    pub fn layout(&self) -> Vec<(Slot, Card)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| lock(cell).card.map(|card| (Slot(i), card)))
            .collect()
    }

    pub fn count_cards(&self) -> usize {
        lock(&self.index).len()
    }

    /// The actor's marked slots in the order they were marked.
    pub fn hand(&self, actor: ActorId) -> Vec<Slot> {
        self.hands
            .get(actor.0)
            .map(|hand| lock(hand).clone())
            .unwrap_or_default()
    }

    pub fn marker_count(&self, actor: ActorId) -> usize {
        self.hands
            .get(actor.0)
            .map(|hand| lock(hand).len())
            .unwrap_or(0)
    }

    pub fn has_marker(&self, actor: ActorId, slot: Slot) -> bool {
        match (self.slots.get(slot.0), actor.0 < self.hands.len()) {
            (Some(cell), true) => lock(cell).markers[actor.0],
            _ => false,
        }
    }

    /// Returns the actor's hand with its cards iff it is full and intact.
    ///
    /// The hand is re-read while every slot in it is locked, so the result
    /// reflects a single consistent instant: `hand_size` occupied slots, each
    /// still carrying the actor's marker.
    pub fn intact_hand(&self, actor: ActorId) -> Option<Vec<(Slot, Card)>> {
        let hand_lock = self.hands.get(actor.0)?;
        let snapshot = lock(hand_lock).clone();
        if snapshot.len() != self.hand_size {
            return None;
        }

        let mut ordered = snapshot.clone();
        ordered.sort_unstable();
        let mut guards = Vec::with_capacity(ordered.len());
        for slot in &ordered {
            guards.push((*slot, lock(self.slots.get(slot.0)?)));
        }

        if *lock(hand_lock) != snapshot {
            return None;
        }

        snapshot
            .iter()
            .map(|slot| {
                let (_, state) = guards.iter().find(|(s, _)| s == slot)?;
                if !state.markers[actor.0] {
                    return None;
                }
                state.card.map(|card| (*slot, card))
            })
            .collect()
    }

    /// Verifies every grid invariant. Used by tests and debug checks.
    pub fn check_invariants(&self) -> Result<(), GridError> {
        let mut marked: Vec<Vec<Slot>> = vec![Vec::new(); self.hands.len()];
        let index = lock(&self.index).clone();

        for (i, cell) in self.slots.iter().enumerate() {
            let slot = Slot(i);
            let state = lock(cell);
            if let Some(card) = state.card {
                let indexed = index.get(&card).copied();
                if indexed != Some(slot) {
                    return Err(GridError::BijectionMismatch {
                        slot,
                        card,
                        indexed,
                    });
                }
            }
            for (actor, is_marked) in state.markers.iter().enumerate() {
                if !*is_marked {
                    continue;
                }
                if state.card.is_none() {
                    return Err(GridError::MarkerOnEmptySlot {
                        actor: ActorId(actor),
                        slot,
                    });
                }
                marked[actor].push(slot);
            }
        }

        for (card, slot) in &index {
            if self.card_at(*slot) != Some(*card) {
                return Err(GridError::StaleIndex {
                    card: *card,
                    slot: *slot,
                });
            }
        }

        for (actor, slots) in marked.into_iter().enumerate() {
            let mut hand = self.hand(ActorId(actor));
            if hand.len() > self.hand_size {
                return Err(GridError::HandOverflow {
                    actor: ActorId(actor),
                    count: hand.len(),
                    limit: self.hand_size,
                });
            }
            hand.sort_unstable();
            if hand != slots {
                return Err(GridError::HandMismatch {
                    actor: ActorId(actor),
                });
            }
        }
        Ok(())
    }

    fn slot_lock(&self, slot: Slot) -> Result<&Mutex<SlotState>, GridError> {
        self.slots.get(slot.0).ok_or(GridError::SlotOutOfRange {
            slot,
            size: self.slots.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingSink;
    use proptest::prelude::*;
    use setgrid_types::DisplayEvent;

    fn grid(table: usize, players: usize, hand: usize) -> (Grid, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (Grid::new(table, players, hand, sink.clone()), sink)
    }

    #[test]
    fn test_place_maintains_bijection() {
        let (grid, sink) = grid(4, 1, 3);
        grid.place(Card(10), Slot(2)).unwrap();

        assert_eq!(grid.card_at(Slot(2)), Some(Card(10)));
        assert_eq!(grid.slot_of(Card(10)), Some(Slot(2)));
        assert_eq!(grid.count_cards(), 1);
        assert_eq!(grid.empty_slots(), vec![Slot(0), Slot(1), Slot(3)]);
        assert_eq!(
            sink.events(),
            vec![DisplayEvent::CardPlaced {
                card: Card(10),
                slot: Slot(2)
            }]
        );
    }

    #[test]
    fn test_place_rejects_conflicts() {
        let (grid, _) = grid(2, 1, 3);
        grid.place(Card(1), Slot(0)).unwrap();

        assert_eq!(
            grid.place(Card(2), Slot(0)),
            Err(GridError::SlotOccupied {
                slot: Slot(0),
                card: Card(1)
            })
        );
        assert_eq!(
            grid.place(Card(1), Slot(1)),
            Err(GridError::CardDisplayed {
                card: Card(1),
                slot: Slot(0)
            })
        );
        assert_eq!(
            grid.place(Card(3), Slot(5)),
            Err(GridError::SlotOutOfRange {
                slot: Slot(5),
                size: 2
            })
        );
        assert_eq!(grid.count_cards(), 1);
        grid.check_invariants().unwrap();
    }

    #[test]
    fn test_toggle_marker() {
        let (grid, _) = grid(4, 2, 2);
        grid.place(Card(0), Slot(0)).unwrap();
        grid.place(Card(1), Slot(1)).unwrap();
        grid.place(Card(2), Slot(2)).unwrap();

        // Empty slot is rejected.
        let toggle = grid.toggle_marker(ActorId(0), Slot(3));
        assert_eq!(toggle.outcome, ToggleOutcome::Rejected);
        assert!(!toggle.card_present);

        let toggle = grid.toggle_marker(ActorId(0), Slot(0));
        assert_eq!(toggle.outcome, ToggleOutcome::Placed);
        assert_eq!(toggle.count, 1);
        let toggle = grid.toggle_marker(ActorId(0), Slot(2));
        assert_eq!(toggle.count, 2);

        // Hand full.
        let toggle = grid.toggle_marker(ActorId(0), Slot(1));
        assert_eq!(toggle.outcome, ToggleOutcome::Rejected);
        assert_eq!(toggle.count, 2);

        // Removing frees room again.
        let toggle = grid.toggle_marker(ActorId(0), Slot(0));
        assert_eq!(toggle.outcome, ToggleOutcome::Removed);
        assert_eq!(toggle.count, 1);
        assert_eq!(grid.hand(ActorId(0)), vec![Slot(2)]);

        // Other actors are independent.
        assert_eq!(
            grid.toggle_marker(ActorId(1), Slot(2)).outcome,
            ToggleOutcome::Placed
        );
        assert!(grid.has_marker(ActorId(1), Slot(2)));
        assert!(!grid.has_marker(ActorId(1), Slot(0)));

        // Unknown actor or slot.
        assert_eq!(
            grid.toggle_marker(ActorId(9), Slot(0)).outcome,
            ToggleOutcome::Rejected
        );
        assert_eq!(
            grid.toggle_marker(ActorId(0), Slot(9)).outcome,
            ToggleOutcome::Rejected
        );
        grid.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_clears_every_marker() {
        let (grid, sink) = grid(3, 2, 3);
        grid.place(Card(7), Slot(1)).unwrap();
        grid.toggle_marker(ActorId(0), Slot(1));
        grid.toggle_marker(ActorId(1), Slot(1));
        sink.clear();

        assert_eq!(grid.remove(Slot(1)), Some(Card(7)));
        assert_eq!(grid.remove(Slot(1)), None);
        assert_eq!(grid.marker_count(ActorId(0)), 0);
        assert_eq!(grid.marker_count(ActorId(1)), 0);
        assert_eq!(grid.slot_of(Card(7)), None);
        assert_eq!(
            sink.events(),
            vec![
                DisplayEvent::MarkerRemoved {
                    actor: ActorId(0),
                    slot: Slot(1)
                },
                DisplayEvent::MarkerRemoved {
                    actor: ActorId(1),
                    slot: Slot(1)
                },
                DisplayEvent::CardRemoved { slot: Slot(1) },
            ]
        );
        grid.check_invariants().unwrap();
    }

    #[test]
    fn test_intact_hand() {
        let (grid, _) = grid(4, 2, 3);
        for i in 0..4 {
            grid.place(Card(i as u32 + 20), Slot(i)).unwrap();
        }
        grid.toggle_marker(ActorId(0), Slot(3));
        grid.toggle_marker(ActorId(0), Slot(0));
        assert_eq!(grid.intact_hand(ActorId(0)), None);

        grid.toggle_marker(ActorId(0), Slot(1));
        assert_eq!(
            grid.intact_hand(ActorId(0)),
            Some(vec![
                (Slot(3), Card(23)),
                (Slot(0), Card(20)),
                (Slot(1), Card(21))
            ])
        );

        // Another removal makes the hand stale.
        grid.remove(Slot(0));
        assert_eq!(grid.intact_hand(ActorId(0)), None);
        assert_eq!(grid.intact_hand(ActorId(7)), None);
    }

    #[test]
    fn test_clear_all_returns_cards() {
        let (grid, _) = grid(4, 1, 3);
        grid.place(Card(5), Slot(3)).unwrap();
        grid.place(Card(6), Slot(1)).unwrap();
        grid.toggle_marker(ActorId(0), Slot(3));

        assert_eq!(grid.clear_all(), vec![Card(6), Card(5)]);
        assert_eq!(grid.count_cards(), 0);
        assert_eq!(grid.marker_count(ActorId(0)), 0);
        assert_eq!(grid.empty_slots().len(), 4);
    }

    #[test]
    fn test_concurrent_toggles_respect_hand_limit() {
        let (grid, _) = grid(12, 4, 3);
        let grid = Arc::new(grid);
        for i in 0..12 {
            grid.place(Card(i as u32), Slot(i)).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|actor| {
                let grid = grid.clone();
                std::thread::spawn(move || {
                    for round in 0..500usize {
                        let slot = Slot((round * 7 + actor * 5) % 12);
                        let toggle = grid.toggle_marker(ActorId(actor), slot);
                        assert!(toggle.count <= 3);
                        if round % 50 == 0 {
                            if let Some(card) = grid.remove(slot) {
                                let _ = grid.place(card, slot);
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        grid.check_invariants().unwrap();
    }

    #[derive(Clone, Debug)]
    enum Op {
        Place(u32, usize),
        Remove(usize),
        Toggle(usize, usize),
        Clear,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0u32..16, 0usize..8).prop_map(|(card, slot)| Op::Place(card, slot)),
            2 => (0usize..8).prop_map(Op::Remove),
            6 => (0usize..3, 0usize..8).prop_map(|(actor, slot)| Op::Toggle(actor, slot)),
            1 => Just(Op::Clear),
        ]
    }

    proptest! {
        #[test]
        fn prop_invariants_hold_under_random_ops(ops in prop::collection::vec(arb_op(), 1..200)) {
            let (grid, _) = grid(8, 3, 3);
            for op in ops {
                match op {
                    Op::Place(card, slot) => {
                        let _ = grid.place(Card(card), Slot(slot));
                    }
                    Op::Remove(slot) => {
                        grid.remove(Slot(slot));
                    }
                    Op::Toggle(actor, slot) => {
                        let toggle = grid.toggle_marker(ActorId(actor), Slot(slot));
                        prop_assert!(toggle.count <= 3);
                        if toggle.outcome == ToggleOutcome::Placed {
                            prop_assert!(toggle.card_present);
                        }
                    }
                    Op::Clear => {
                        grid.clear_all();
                    }
                }
                prop_assert_eq!(grid.check_invariants(), Ok(()));
                prop_assert_eq!(grid.count_cards(), grid.cards().len());
            }
        }
    }
}
