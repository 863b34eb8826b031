//! Setgrid table engine.
//!
//! This crate runs one game of a concurrent pattern-matching card table: a
//! shared [`Grid`] of cards, players toggling markers on it from their own
//! tasks, and a single [`Dealer`] that adjudicates their claims in order.
//!
//! ## Concurrency model
//! - One task per player, one per automated input generator, one for the dealer.
//! - Per-slot locks on the grid; lock order is slot -> actor hand -> index.
//! - Claims travel through a FIFO [`ClaimQueue`]; verdicts come back through a
//!   per-player slot and a shared resolution epoch.
//! - A [`tokio_util::sync::CancellationToken`] tree (dealer parent, player
//!   children) stops everything.
//!
//! ## Example
//! ```rust,ignore
//! use setgrid_execution::{FeatureRule, Game, TracingSink};
//! use setgrid_types::GameConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), setgrid_execution::GameError> {
//! let config = GameConfig::default();
//! let rule = Arc::new(FeatureRule::new(config.layout(), config.hand_size));
//! let game = Game::new(&config, rule, Arc::new(TracingSink))?;
//! let outcome = game.run().await;
//! println!("winners: {:?}", outcome.winners);
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod claims;
pub mod clock;
pub mod dealer;
pub mod deck;
pub mod display;
pub mod game;
pub mod grid;
pub mod rules;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use actor::{
    Actor, ActorContext, ActorStatus, ExternalInput, InputSource, RandomInput, Selector, Verdict,
};
pub use claims::ClaimQueue;
pub use clock::{ClockReading, RoundClock};
pub use dealer::{Dealer, GameOutcome};
pub use deck::Deck;
pub use display::{ChannelSink, DisplaySink, FanoutSink, TracingSink};
pub use game::{Game, GameError};
pub use grid::{Grid, GridError, Toggle, ToggleOutcome};
pub use rules::{FeatureRule, MatchRule};
