//! Players.
//!
//! Every player runs one processing task that turns queued slot selections
//! into marker toggles on the grid. When a placement fills the hand, the task
//! submits a claim and parks until the dealer stores a [`Verdict`] for it.
//!
//! ## Status
//! `Idle -> Selecting -> AwaitingAdjudication -> Frozen -> Idle`, and
//! `Terminated` from anywhere. The status lives in an atomic so that
//! [`Selector::select`] can refuse input without touching any lock.
//!
//! ## Verdict delivery
//! The dealer writes the verdict into the player's single-entry slot and then
//! bumps a shared resolution epoch on a `watch` channel. The player marks the
//! epoch as seen before checking its slot, so a verdict stored after the check
//! always produces a fresh change notification. Taking the verdict clears the
//! slot; it can be observed exactly once.

use crate::claims::ClaimQueue;
use crate::display::DisplaySink;
use crate::grid::{lock, Grid, ToggleOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use setgrid_types::{ActorId, Slot};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ActorStatus {
    Idle = 0,
    Selecting = 1,
    AwaitingAdjudication = 2,
    Frozen = 3,
    Terminated = 4,
}

impl ActorStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ActorStatus::Idle,
            1 => ActorStatus::Selecting,
            2 => ActorStatus::AwaitingAdjudication,
            3 => ActorStatus::Frozen,
            _ => ActorStatus::Terminated,
        }
    }

    /// Whether new selections are refused in this status.
    pub fn refuses_input(&self) -> bool {
        matches!(
            self,
            ActorStatus::AwaitingAdjudication | ActorStatus::Frozen | ActorStatus::Terminated
        )
    }
}

/// The dealer's resolution of a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Legal group: point freeze.
    Award,
    /// Illegal group: penalty freeze, markers stay.
    Penalty,
    /// Stale or withdrawn claim: no freeze.
    Released,
}

struct ActorShared {
    id: ActorId,
    status: AtomicU8,
    verdict: Mutex<Option<Verdict>>,
}

impl ActorShared {
    fn status(&self) -> ActorStatus {
        ActorStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: ActorStatus) {
        // Terminated is final.
        let _ = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ActorStatus::Terminated as u8).then_some(status as u8)
            });
    }
}

/// Everything a player task needs from the table.
#[derive(Clone)]
pub struct ActorContext {
    pub grid: Arc<Grid>,
    pub claims: Arc<ClaimQueue>,
    pub display: Arc<dyn DisplaySink>,
    /// Resolution epoch published by the dealer.
    pub resolutions: watch::Receiver<u64>,
    pub point_freeze: Duration,
    pub penalty_freeze: Duration,
    pub freeze_step: Duration,
    pub input_queue: usize,
}

/// Cloneable input handle for one player.
#[derive(Clone)]
pub struct Selector {
    shared: Arc<ActorShared>,
    grid: Arc<Grid>,
    inputs: mpsc::Sender<Slot>,
}

impl Selector {
    pub fn actor(&self) -> ActorId {
        self.shared.id
    }

    pub fn status(&self) -> ActorStatus {
        self.shared.status()
    }

    /// Queues a selection of `slot`.
    ///
    /// Returns `false` if the player is frozen, awaiting a verdict or
    /// terminated, if the grid is not ready, if `slot` is outside the grid, or
    /// if the input queue is full.
    pub fn select(&self, slot: Slot) -> bool {
        if self.shared.status().refuses_input() {
            return false;
        }
        if !self.grid.is_ready() || slot.0 >= self.grid.table_size() {
            return false;
        }
        match self.inputs.try_send(slot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(actor = self.shared.id.0, slot = slot.0, "input queue full; dropping selection");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(actor = self.shared.id.0, slot = slot.0, "player stopped; dropping selection");
                false
            }
        }
    }
}

/// Where a player's selections come from.
pub trait InputSource: Send {
    /// Starts generating selections through `selector`, if this source drives
    /// itself. Returns the generator task so it can be joined on shutdown.
    fn start(self: Box<Self>, selector: Selector, token: CancellationToken)
        -> Option<JoinHandle<()>>;
}

/// Selections are fed by the outer program through [`Selector`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ExternalInput;

impl InputSource for ExternalInput {
    fn start(
        self: Box<Self>,
        _selector: Selector,
        _token: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        None
    }
}

/// Selects a uniformly random slot every `delay`.
#[derive(Debug)]
pub struct RandomInput {
    delay: Duration,
    table_size: usize,
    rng: StdRng,
}

impl RandomInput {
    pub fn new(delay: Duration, table_size: usize, seed: u64) -> Self {
        Self {
            delay,
            table_size,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl InputSource for RandomInput {
    fn start(
        self: Box<Self>,
        selector: Selector,
        token: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let RandomInput {
            delay,
            table_size,
            mut rng,
        } = *self;
        if table_size == 0 {
            return None;
        }
        let delay = delay.max(Duration::from_millis(1));
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                selector.select(Slot(rng.gen_range(0..table_size)));
            }
        }))
    }
}

/// A seated player, owned by the dealer.
pub struct Actor {
    shared: Arc<ActorShared>,
    selector: Selector,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Actor {
    /// Seats a player and starts its tasks.
    ///
    /// The player's token is a child of `parent`, so cancelling the game stops
    /// every player.
    pub fn spawn(
        id: ActorId,
        context: ActorContext,
        input: Box<dyn InputSource>,
        parent: &CancellationToken,
    ) -> Self {
        let shared = Arc::new(ActorShared {
            id,
            status: AtomicU8::new(ActorStatus::Idle as u8),
            verdict: Mutex::new(None),
        });
        let (tx, rx) = mpsc::channel(context.input_queue.max(1));
        let selector = Selector {
            shared: shared.clone(),
            grid: context.grid.clone(),
            inputs: tx,
        };
        let token = parent.child_token();

        let mut tasks = Vec::with_capacity(2);
        let task = ActorTask {
            shared: shared.clone(),
            context,
            inputs: rx,
            token: token.clone(),
        };
        tasks.push(tokio::spawn(task.run()));
        if let Some(generator) = input.start(selector.clone(), token.clone()) {
            tasks.push(generator);
        }

        Self {
            shared,
            selector,
            token,
            tasks,
        }
    }

    pub fn id(&self) -> ActorId {
        self.shared.id
    }

    pub fn status(&self) -> ActorStatus {
        self.shared.status()
    }

    pub fn selector(&self) -> Selector {
        self.selector.clone()
    }

    /// Stores `verdict` for the player's pending claim.
    ///
    /// The caller must bump the resolution epoch afterwards for the player to
    /// notice it.
    pub(crate) fn deliver(&self, verdict: Verdict) {
        let previous = lock(&self.shared.verdict).replace(verdict);
        if let Some(previous) = previous {
            error!(
                actor = self.shared.id.0,
                ?previous,
                ?verdict,
                "verdict overwritten before it was observed"
            );
        }
    }

    /// Stops the player and waits for all of its tasks to exit.
    pub async fn terminate(&mut self) {
        self.shared.set_status(ActorStatus::Terminated);
        self.token.cancel();
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(actor = self.shared.id.0, ?err, "player task did not exit cleanly");
            }
        }
    }
}

struct ActorTask {
    shared: Arc<ActorShared>,
    context: ActorContext,
    inputs: mpsc::Receiver<Slot>,
    token: CancellationToken,
}

impl ActorTask {
    async fn run(mut self) {
        let id = self.shared.id;
        let hand_size = self.context.grid.hand_size();
        loop {
            self.shared.set_status(ActorStatus::Idle);
            let slot = tokio::select! {
                _ = self.token.cancelled() => break,
                slot = self.inputs.recv() => match slot {
                    Some(slot) => slot,
                    None => break,
                },
            };

            if !self.context.grid.is_ready() {
                debug!(actor = id.0, slot = slot.0, "grid not ready; ignoring selection");
                continue;
            }
            self.shared.set_status(ActorStatus::Selecting);
            let toggle = self.context.grid.toggle_marker(id, slot);
            debug!(
                actor = id.0,
                slot = slot.0,
                outcome = ?toggle.outcome,
                count = toggle.count,
                "toggle"
            );
            if toggle.outcome != ToggleOutcome::Placed || toggle.count < hand_size {
                continue;
            }

            self.shared.set_status(ActorStatus::AwaitingAdjudication);
            self.context.claims.submit(id);
            let Some(verdict) = self.await_verdict().await else {
                break;
            };
            let completed = match verdict {
                Verdict::Award => self.award().await,
                Verdict::Penalty => self.penalize().await,
                Verdict::Released => true,
            };
            if !completed {
                break;
            }
        }
        self.shared.set_status(ActorStatus::Terminated);
        debug!(actor = id.0, "player stopped");
    }

    /// Parks until the dealer stores a verdict; `None` on cancellation.
    async fn await_verdict(&mut self) -> Option<Verdict> {
        loop {
            self.context.resolutions.borrow_and_update();
            if let Some(verdict) = lock(&self.shared.verdict).take() {
                return Some(verdict);
            }
            tokio::select! {
                _ = self.token.cancelled() => return None,
                changed = self.context.resolutions.changed() => {
                    if changed.is_err() {
                        // Dealer is gone; a verdict stored before it left is still valid.
                        return lock(&self.shared.verdict).take();
                    }
                }
            }
        }
    }

    /// Point freeze: one visible countdown, then cleared.
    async fn award(&self) -> bool {
        let total = self.context.point_freeze;
        self.freeze(total, total).await
    }

    /// Penalty freeze, counted down in steps of `freeze_step`.
    async fn penalize(&self) -> bool {
        self.freeze(self.context.penalty_freeze, self.context.freeze_step)
            .await
    }

    /// Freezes for `total`, reporting the remaining time every `step`.
    ///
    /// Returns `false` if cancelled before the freeze ran out.
    async fn freeze(&self, total: Duration, step: Duration) -> bool {
        let id = self.shared.id;
        self.shared.set_status(ActorStatus::Frozen);
        let step = step.max(Duration::from_millis(1));
        let mut left = total;
        while !left.is_zero() {
            self.context
                .display
                .on_freeze_changed(id, left.as_millis() as u64);
            let nap = step.min(left);
            tokio::select! {
                _ = self.token.cancelled() => return false,
                _ = tokio::time::sleep(nap) => {}
            }
            left -= nap;
        }
        self.context.display.on_freeze_changed(id, 0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingSink;
    use setgrid_types::{Card, DisplayEvent};
    use std::time::Instant;

    struct Table {
        grid: Arc<Grid>,
        claims: Arc<ClaimQueue>,
        sink: Arc<RecordingSink>,
        epoch: watch::Sender<u64>,
        context: ActorContext,
    }

    fn table(cards: usize) -> Table {
        let sink = Arc::new(RecordingSink::default());
        let grid = Arc::new(Grid::new(6, 2, 3, sink.clone()));
        for i in 0..cards {
            grid.place(Card(i as u32), Slot(i)).unwrap();
        }
        grid.set_ready(true);
        let claims = Arc::new(ClaimQueue::new());
        let (epoch, resolutions) = watch::channel(0);
        let context = ActorContext {
            grid: grid.clone(),
            claims: claims.clone(),
            display: sink.clone(),
            resolutions,
            point_freeze: Duration::from_millis(30),
            penalty_freeze: Duration::from_millis(150),
            freeze_step: Duration::from_millis(50),
            input_queue: 3,
        };
        Table {
            grid,
            claims,
            sink,
            epoch,
            context,
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        let start = Instant::now();
        while !check() {
            assert!(
                start.elapsed() < Duration::from_secs(5),
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn fill_hand(selector: &Selector, slots: [usize; 3]) {
        for slot in slots {
            let before = selector.grid.marker_count(selector.actor());
            assert!(selector.select(Slot(slot)));
            eventually(|| selector.grid.marker_count(selector.actor()) > before).await;
        }
    }

    #[tokio::test]
    async fn test_full_hand_submits_claim_and_refuses_input() {
        let table = table(6);
        let root = CancellationToken::new();
        let mut actor = Actor::spawn(
            ActorId(0),
            table.context.clone(),
            Box::new(ExternalInput),
            &root,
        );
        let selector = actor.selector();

        fill_hand(&selector, [0, 1, 2]).await;
        eventually(|| table.claims.len() == 1).await;
        assert_eq!(table.claims.pop(), Some(ActorId(0)));
        assert_eq!(actor.status(), ActorStatus::AwaitingAdjudication);
        assert!(!selector.select(Slot(3)));

        actor.deliver(Verdict::Released);
        table.epoch.send_modify(|epoch| *epoch += 1);
        eventually(|| actor.status() == ActorStatus::Idle).await;
        assert!(selector.select(Slot(2)));

        actor.terminate().await;
        assert_eq!(actor.status(), ActorStatus::Terminated);
        assert!(!selector.select(Slot(0)));
    }

    #[tokio::test]
    async fn test_penalty_freezes_in_steps_and_keeps_markers() {
        let table = table(6);
        let root = CancellationToken::new();
        let mut actor = Actor::spawn(
            ActorId(1),
            table.context.clone(),
            Box::new(ExternalInput),
            &root,
        );
        let selector = actor.selector();

        fill_hand(&selector, [3, 4, 5]).await;
        eventually(|| table.claims.pop().is_some()).await;

        actor.deliver(Verdict::Penalty);
        table.epoch.send_modify(|epoch| *epoch += 1);
        eventually(|| actor.status() == ActorStatus::Frozen).await;
        assert!(!selector.select(Slot(3)));
        eventually(|| actor.status() == ActorStatus::Idle).await;

        let freezes: Vec<u64> = table
            .sink
            .events()
            .into_iter()
            .filter_map(|event| match event {
                DisplayEvent::FreezeChanged { actor, millis } if actor == ActorId(1) => {
                    Some(millis)
                }
                _ => None,
            })
            .collect();
        assert_eq!(freezes, vec![150, 100, 50, 0]);
        assert_eq!(table.grid.marker_count(ActorId(1)), 3);

        actor.terminate().await;
    }

    #[tokio::test]
    async fn test_award_freezes_once() {
        let table = table(6);
        let root = CancellationToken::new();
        let mut actor = Actor::spawn(
            ActorId(0),
            table.context.clone(),
            Box::new(ExternalInput),
            &root,
        );
        let selector = actor.selector();

        fill_hand(&selector, [0, 2, 4]).await;
        eventually(|| table.claims.pop().is_some()).await;
        actor.deliver(Verdict::Award);
        table.epoch.send_modify(|epoch| *epoch += 1);
        eventually(|| actor.status() == ActorStatus::Idle).await;

        let events = table.sink.events();
        let freezes: Vec<&DisplayEvent> = events
            .iter()
            .filter(|event| matches!(event, DisplayEvent::FreezeChanged { .. }))
            .collect();
        assert_eq!(
            freezes,
            vec![
                &DisplayEvent::FreezeChanged {
                    actor: ActorId(0),
                    millis: 30
                },
                &DisplayEvent::FreezeChanged {
                    actor: ActorId(0),
                    millis: 0
                },
            ]
        );

        actor.terminate().await;
    }

    #[tokio::test]
    async fn test_selection_refused_until_grid_ready() {
        let table = table(6);
        table.grid.set_ready(false);
        let root = CancellationToken::new();
        let mut actor = Actor::spawn(
            ActorId(0),
            table.context.clone(),
            Box::new(ExternalInput),
            &root,
        );
        let selector = actor.selector();

        assert!(!selector.select(Slot(0)));
        table.grid.set_ready(true);
        assert!(!selector.select(Slot(6)));
        assert!(selector.select(Slot(0)));

        actor.terminate().await;
    }

    #[tokio::test]
    async fn test_cancel_interrupts_freeze() {
        let mut table = table(6);
        table.context.penalty_freeze = Duration::from_secs(3_600);
        let root = CancellationToken::new();
        let mut actor = Actor::spawn(
            ActorId(0),
            table.context.clone(),
            Box::new(ExternalInput),
            &root,
        );
        let selector = actor.selector();
        fill_hand(&selector, [0, 1, 2]).await;
        eventually(|| table.claims.pop().is_some()).await;
        actor.deliver(Verdict::Penalty);
        table.epoch.send_modify(|epoch| *epoch += 1);
        eventually(|| actor.status() == ActorStatus::Frozen).await;

        root.cancel();
        tokio::time::timeout(Duration::from_secs(5), actor.terminate())
            .await
            .expect("terminate should not wait for the freeze");
        assert_eq!(actor.status(), ActorStatus::Terminated);
    }

    #[tokio::test]
    async fn test_random_input_places_markers() {
        let table = table(6);
        let root = CancellationToken::new();
        let mut actor = Actor::spawn(
            ActorId(0),
            table.context.clone(),
            Box::new(RandomInput::new(Duration::from_millis(1), 6, 9)),
            &root,
        );
        eventually(|| table.grid.marker_count(ActorId(0)) > 0).await;
        actor.terminate().await;
        table.grid.check_invariants().unwrap();
    }
}
