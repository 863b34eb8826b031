use crate::card::{ActorId, Card, Slot};
use serde::{Deserialize, Serialize};

/// A table notification as published to observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayEvent {
    CardPlaced {
        card: Card,
        slot: Slot,
    },
    CardRemoved {
        slot: Slot,
    },
    MarkerPlaced {
        actor: ActorId,
        slot: Slot,
    },
    MarkerRemoved {
        actor: ActorId,
        slot: Slot,
    },
    ScoreChanged {
        actor: ActorId,
        score: u32,
    },
    /// `millis == 0` clears the freeze display.
    FreezeChanged {
        actor: ActorId,
        millis: u64,
    },
    ClockChanged {
        millis: u64,
        warning: bool,
    },
    WinnersAnnounced {
        winners: Vec<ActorId>,
    },
}
