//! The dealer: the table's single adjudicator.
//!
//! The dealer owns the deck, the scores and the round clock, and is the only
//! writer of the slot to card mapping. Players reach it through the claim
//! queue; it answers through each player's verdict slot.
//!
//! ## Rounds
//! 1. **Dealing** - the deck is shuffled and cards are placed on random empty
//!    slots until the grid or the deck runs out, then the grid is marked ready.
//! 2. **Running** - the dealer sleeps on the claim queue for at most one tick,
//!    refreshes the clock, resolves at most one claim and refills the grid.
//! 3. **Round end** - countdown: the deadline passed. Elapsed and untimed: no
//!    legal group is left on the grid. The grid is cleared back into the deck
//!    and every pending claim is released.
//!
//! The game ends when no legal group remains among the deck and the grid
//! together, or when the dealer's cancellation token fires.

use crate::actor::{Actor, ActorContext, InputSource, Selector, Verdict};
use crate::claims::ClaimQueue;
use crate::clock::RoundClock;
use crate::deck::Deck;
use crate::display::DisplaySink;
use crate::grid::Grid;
use crate::rules::MatchRule;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use setgrid_types::{ActorId, Card, GameConfig, Slot, TimerMode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Final result of a game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameOutcome {
    /// Final score per player, indexed by seat.
    pub scores: Vec<u32>,
    /// Every player holding the highest score.
    pub winners: Vec<ActorId>,
    /// Rounds dealt.
    pub rounds: u64,
    /// Claims resolved, stale ones included.
    pub claims: u64,
}

/// Timing knobs the dealer reads from [`GameConfig`].
#[derive(Clone, Copy, Debug)]
struct Timing {
    mode: TimerMode,
    tick: Duration,
    warning_tick: Duration,
    table_delay: Duration,
    end_game_pause: Duration,
}

pub struct Dealer {
    grid: Arc<Grid>,
    deck: Deck,
    claims: Arc<ClaimQueue>,
    rule: Arc<dyn MatchRule>,
    display: Arc<dyn DisplaySink>,
    actors: Vec<Actor>,
    scores: Vec<u32>,
    clock: RoundClock,
    epoch: watch::Sender<u64>,
    rng: StdRng,
    token: CancellationToken,
    timing: Timing,
    hints: bool,
    rounds: u64,
    resolved: u64,
}

impl Dealer {
    /// Builds the table and seats one player per entry of `inputs`.
    ///
    /// Must be called from within a tokio runtime: player tasks start
    /// immediately, although they stay idle until the grid is ready.
    pub fn new(
        config: &GameConfig,
        rule: Arc<dyn MatchRule>,
        display: Arc<dyn DisplaySink>,
        deck: Deck,
        inputs: Vec<Box<dyn InputSource>>,
        token: CancellationToken,
    ) -> Self {
        let players = inputs.len();
        let grid = Arc::new(Grid::new(
            config.table_size,
            players,
            config.hand_size,
            display.clone(),
        ));
        let claims = Arc::new(ClaimQueue::new());
        let (epoch, resolutions) = watch::channel(0u64);

        let context = ActorContext {
            grid: grid.clone(),
            claims: claims.clone(),
            display: display.clone(),
            resolutions,
            point_freeze: config.point_freeze(),
            penalty_freeze: config.penalty_freeze(),
            freeze_step: config.freeze_step(),
            input_queue: config.input_queue,
        };
        let actors = inputs
            .into_iter()
            .enumerate()
            .map(|(seat, input)| Actor::spawn(ActorId(seat), context.clone(), input, &token))
            .collect();

        let timing = Timing {
            mode: config.timer_mode(),
            tick: config.tick(),
            warning_tick: config.warning_tick(),
            table_delay: config.table_delay(),
            end_game_pause: config.end_game_pause(),
        };

        Self {
            grid,
            deck,
            claims,
            rule,
            display,
            actors,
            scores: vec![0; players],
            clock: RoundClock::new(timing.mode, Instant::now()),
            epoch,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(1)),
            token,
            timing,
            hints: config.hints,
            rounds: 0,
            resolved: 0,
        }
    }

    pub fn grid(&self) -> Arc<Grid> {
        self.grid.clone()
    }

    pub fn claims(&self) -> Arc<ClaimQueue> {
        self.claims.clone()
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn selector(&self, actor: ActorId) -> Option<Selector> {
        self.actors.get(actor.0).map(Actor::selector)
    }

    pub fn scores(&self) -> &[u32] {
        &self.scores
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Plays rounds until the game ends, then tears the table down.
    pub async fn run(mut self) -> GameOutcome {
        info!(
            players = self.actors.len(),
            deck = self.deck.len(),
            mode = ?self.timing.mode,
            "game started"
        );
        while !self.token.is_cancelled() && !self.game_over() {
            self.rounds += 1;
            let placed = self.place_cards().await;
            self.clock.reset(Instant::now());
            self.update_clock();
            info!(
                round = self.rounds,
                placed,
                deck = self.deck.len(),
                "round started"
            );
            self.log_hints();

            self.play_round().await;
            self.end_round().await;
        }
        self.finish().await
    }

    /// Places cards from the shuffled deck on random empty slots, then marks
    /// the grid ready. Returns the number of cards placed.
    pub async fn place_cards(&mut self) -> usize {
        self.deck.shuffle();
        let mut placed = 0;
        loop {
            let empty = self.grid.empty_slots();
            if empty.is_empty() || self.deck.is_empty() {
                break;
            }
            let slot = empty[self.rng.gen_range(0..empty.len())];
            let Some(card) = self.deck.draw() else {
                break;
            };
            if let Err(err) = self.grid.place(card, slot) {
                error!(%err, "failed to place card");
                self.deck.return_cards(vec![card]);
                break;
            }
            placed += 1;
            if !self.table_pause().await {
                break;
            }
        }
        self.grid.set_ready(true);
        placed
    }

    /// Resolves the oldest pending claim, if any.
    ///
    /// A claim whose hand is no longer full and intact is released without a
    /// score change. A legal group is removed from the grid and scores a point;
    /// an illegal one earns a penalty and leaves the grid untouched.
    pub async fn resolve_next_claim(&mut self) -> Option<(ActorId, Verdict)> {
        let actor = self.claims.pop()?;
        self.resolved += 1;
        if actor.0 >= self.actors.len() {
            warn!(actor = actor.0, "claim from unknown player ignored");
            return None;
        }

        let verdict = match self.grid.intact_hand(actor) {
            None => {
                debug!(actor = actor.0, "stale claim released");
                Verdict::Released
            }
            Some(hand) => {
                let cards: Vec<Card> = hand.iter().map(|(_, card)| *card).collect();
                if self.rule.is_match(&cards) {
                    self.take_group(actor, &hand).await;
                    Verdict::Award
                } else {
                    debug!(actor = actor.0, ?cards, "illegal group");
                    Verdict::Penalty
                }
            }
        };
        self.deliver(actor, verdict);
        Some((actor, verdict))
    }

    /// Ends the current round: the grid is cleared back into the deck and all
    /// pending claims are released.
    pub async fn end_round(&mut self) {
        self.grid.set_ready(false);
        for slot in 0..self.grid.table_size() {
            if let Some(card) = self.grid.remove(Slot(slot)) {
                self.deck.return_cards(vec![card]);
                self.table_pause().await;
            }
        }
        self.release_pending();
        debug!(round = self.rounds, deck = self.deck.len(), "round ended");
    }

    /// True when no legal group exists among the deck and the grid.
    pub fn game_over(&self) -> bool {
        let mut pool = self.deck.cards().to_vec();
        pool.extend(self.grid.cards());
        !self.rule.has_group(&pool)
    }

    async fn play_round(&mut self) {
        loop {
            if self.token.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if self.clock.expired(now) {
                info!(round = self.rounds, "round timed out");
                return;
            }
            if !matches!(self.timing.mode, TimerMode::Countdown { .. })
                && !self.rule.has_group(&self.grid.cards())
            {
                info!(round = self.rounds, "no group left on the grid");
                return;
            }

            if self.claims.is_empty() {
                let nap = self
                    .clock
                    .next_tick(now, self.timing.tick, self.timing.warning_tick);
                tokio::select! {
                    _ = self.token.cancelled() => return,
                    _ = self.claims.wait(nap) => {}
                }
            }
            self.update_clock();

            if let Some((_, Verdict::Award)) = self.resolve_next_claim().await {
                self.place_cards().await;
                self.log_hints();
                if self.game_over() {
                    return;
                }
            }
        }
    }

    async fn take_group(&mut self, actor: ActorId, hand: &[(Slot, Card)]) {
        for (slot, _) in hand {
            self.grid.remove(*slot);
            self.table_pause().await;
        }
        let score = &mut self.scores[actor.0];
        *score += 1;
        let score = *score;
        self.display.on_score_changed(actor, score);
        info!(
            actor = actor.0,
            score,
            cards = ?hand.iter().map(|(_, card)| card.0).collect::<Vec<_>>(),
            "group claimed"
        );
        if self.clock.mode().is_timed() {
            self.clock.reset(Instant::now());
            self.update_clock();
        }
    }

    fn deliver(&self, actor: ActorId, verdict: Verdict) {
        if let Some(seat) = self.actors.get(actor.0) {
            seat.deliver(verdict);
        }
        self.epoch.send_modify(|epoch| *epoch += 1);
    }

    fn release_pending(&mut self) {
        for actor in self.claims.drain() {
            self.resolved += 1;
            debug!(actor = actor.0, "pending claim released");
            self.deliver(actor, Verdict::Released);
        }
    }

    fn update_clock(&self) {
        if let Some(reading) = self.clock.reading(Instant::now()) {
            self.display.on_clock_changed(reading.millis, reading.warning);
        }
    }

    fn log_hints(&self) {
        if !self.hints {
            return;
        }
        let layout = self.grid.layout();
        let cards: Vec<Card> = layout.iter().map(|(_, card)| *card).collect();
        for group in self.rule.find_groups(&cards, usize::MAX) {
            let slots: Vec<usize> = group
                .iter()
                .filter_map(|card| self.grid.slot_of(*card).map(|slot| slot.0))
                .collect();
            let cards: Vec<String> = group.iter().map(|card| self.rule.describe(*card)).collect();
            info!(?slots, ?cards, "hint");
        }
    }

    /// Sleeps for the table delay; `false` if cancelled meanwhile.
    async fn table_pause(&self) -> bool {
        if self.timing.table_delay.is_zero() {
            return !self.token.is_cancelled();
        }
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(self.timing.table_delay) => true,
        }
    }

    async fn finish(mut self) -> GameOutcome {
        self.grid.set_ready(false);
        for actor in self.actors.iter_mut() {
            actor.terminate().await;
            debug!(actor = actor.id().0, status = ?actor.status(), "player terminated");
        }
        self.release_pending();
        let leftover = self.grid.clear_all();
        self.deck.return_cards(leftover);

        let best = self.scores.iter().copied().max().unwrap_or(0);
        let winners: Vec<ActorId> = self
            .scores
            .iter()
            .enumerate()
            .filter(|(_, score)| **score == best)
            .map(|(seat, _)| ActorId(seat))
            .collect();
        self.display.on_winners_announced(&winners);
        info!(
            winners = ?winners.iter().map(|actor| actor.0).collect::<Vec<_>>(),
            scores = ?self.scores,
            rounds = self.rounds,
            claims = self.resolved,
            "game finished"
        );

        if !self.timing.end_game_pause.is_zero() && !self.token.is_cancelled() {
            tokio::time::sleep(self.timing.end_game_pause).await;
        }

        GameOutcome {
            scores: self.scores,
            winners,
            rounds: self.rounds,
            claims: self.resolved,
        }
    }
}
