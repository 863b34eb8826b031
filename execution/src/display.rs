//! Display notifications.
//!
//! The grid, the dealer and the players report every visible change through a
//! [`DisplaySink`]. Notifications are fire-and-forget: a sink must never block
//! the caller, since some of them are emitted while a slot lock is held.

use setgrid_types::{ActorId, Card, DisplayEvent, Slot};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub trait DisplaySink: Send + Sync {
    fn on_card_placed(&self, card: Card, slot: Slot);
    fn on_card_removed(&self, slot: Slot);
    fn on_marker_placed(&self, actor: ActorId, slot: Slot);
    fn on_marker_removed(&self, actor: ActorId, slot: Slot);
    fn on_score_changed(&self, actor: ActorId, score: u32);
    /// `millis == 0` clears the freeze.
    fn on_freeze_changed(&self, actor: ActorId, millis: u64);
    fn on_clock_changed(&self, millis: u64, warning: bool);
    fn on_winners_announced(&self, winners: &[ActorId]);
}

/// Emits every notification as a structured `tracing` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DisplaySink for TracingSink {
    fn on_card_placed(&self, card: Card, slot: Slot) {
        debug!(card = card.0, slot = slot.0, "card placed");
    }

    fn on_card_removed(&self, slot: Slot) {
        debug!(slot = slot.0, "card removed");
    }

    fn on_marker_placed(&self, actor: ActorId, slot: Slot) {
        debug!(actor = actor.0, slot = slot.0, "marker placed");
    }

    fn on_marker_removed(&self, actor: ActorId, slot: Slot) {
        debug!(actor = actor.0, slot = slot.0, "marker removed");
    }

    fn on_score_changed(&self, actor: ActorId, score: u32) {
        info!(actor = actor.0, score, "score changed");
    }

    fn on_freeze_changed(&self, actor: ActorId, millis: u64) {
        debug!(actor = actor.0, millis, "freeze changed");
    }

    fn on_clock_changed(&self, millis: u64, warning: bool) {
        // Fires every tick; keep it below debug.
        tracing::trace!(millis, warning, "clock changed");
    }

    fn on_winners_announced(&self, winners: &[ActorId]) {
        let winners: Vec<usize> = winners.iter().map(|actor| actor.0).collect();
        info!(?winners, "winners announced");
    }
}

/// Publishes notifications as [`DisplayEvent`]s on a broadcast channel.
///
/// Sending never blocks; receivers that fall behind observe
/// `RecvError::Lagged` and skip ahead.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: broadcast::Sender<DisplayEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: DisplayEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

impl DisplaySink for ChannelSink {
    fn on_card_placed(&self, card: Card, slot: Slot) {
        self.publish(DisplayEvent::CardPlaced { card, slot });
    }

    fn on_card_removed(&self, slot: Slot) {
        self.publish(DisplayEvent::CardRemoved { slot });
    }

    fn on_marker_placed(&self, actor: ActorId, slot: Slot) {
        self.publish(DisplayEvent::MarkerPlaced { actor, slot });
    }

    fn on_marker_removed(&self, actor: ActorId, slot: Slot) {
        self.publish(DisplayEvent::MarkerRemoved { actor, slot });
    }

    fn on_score_changed(&self, actor: ActorId, score: u32) {
        self.publish(DisplayEvent::ScoreChanged { actor, score });
    }

    fn on_freeze_changed(&self, actor: ActorId, millis: u64) {
        self.publish(DisplayEvent::FreezeChanged { actor, millis });
    }

    fn on_clock_changed(&self, millis: u64, warning: bool) {
        self.publish(DisplayEvent::ClockChanged { millis, warning });
    }

    fn on_winners_announced(&self, winners: &[ActorId]) {
        self.publish(DisplayEvent::WinnersAnnounced {
            winners: winners.to_vec(),
        });
    }
}

/// Forwards every notification to several sinks in order.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DisplaySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn DisplaySink>>) -> Self {
        Self { sinks }
    }
}

impl DisplaySink for FanoutSink {
    fn on_card_placed(&self, card: Card, slot: Slot) {
        self.sinks.iter().for_each(|s| s.on_card_placed(card, slot));
    }

    fn on_card_removed(&self, slot: Slot) {
        self.sinks.iter().for_each(|s| s.on_card_removed(slot));
    }

    fn on_marker_placed(&self, actor: ActorId, slot: Slot) {
        self.sinks.iter().for_each(|s| s.on_marker_placed(actor, slot));
    }

    fn on_marker_removed(&self, actor: ActorId, slot: Slot) {
        self.sinks.iter().for_each(|s| s.on_marker_removed(actor, slot));
    }

    fn on_score_changed(&self, actor: ActorId, score: u32) {
        self.sinks.iter().for_each(|s| s.on_score_changed(actor, score));
    }

    fn on_freeze_changed(&self, actor: ActorId, millis: u64) {
        self.sinks.iter().for_each(|s| s.on_freeze_changed(actor, millis));
    }

    fn on_clock_changed(&self, millis: u64, warning: bool) {
        self.sinks.iter().for_each(|s| s.on_clock_changed(millis, warning));
    }

    fn on_winners_announced(&self, winners: &[ActorId]) {
        self.sinks.iter().for_each(|s| s.on_winners_announced(winners));
    }
}
