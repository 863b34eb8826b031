//! FIFO claim queue between players and the dealer.
//!
//! Many players submit, one dealer consumes. A claim carries only the
//! submitting actor; the dealer re-derives its validity when it is popped.

use crate::grid::lock;
use setgrid_types::ActorId;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
pub struct ClaimQueue {
    /// Pending claims, oldest first
    queue: Mutex<VecDeque<ActorId>>,
    /// Wakes the dealer on submit
    notify: Notify,
}

impl ClaimQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a claim and wakes the dealer.
    ///
    /// If the dealer is not currently waiting, the wake is stored as a permit
    /// and consumed by its next [`ClaimQueue::wait`].
    pub fn submit(&self, actor: ActorId) {
        lock(&self.queue).push_back(actor);
        self.notify.notify_one();
    }

    /// Takes the oldest claim.
    pub fn pop(&self) -> Option<ActorId> {
        lock(&self.queue).pop_front()
    }

    /// Waits for a submit or until `timeout` elapses.
    ///
    /// Returns `true` if woken by a submit (or a stored permit), `false` on
    /// timeout. A `true` result does not guarantee the queue is non-empty.
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }

    /// Removes every pending claim, oldest first.
    pub fn drain(&self) -> Vec<ActorId> {
        lock(&self.queue).drain(..).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.queue).is_empty()
    }
}
