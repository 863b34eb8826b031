//! Round clock state machine.
//!
//! This module holds the dealer's round timer as pure state over [`Instant`]s.
//! It never sleeps or reads the wall clock itself; callers pass `now` in, which
//! keeps the transitions easy to test.
//!
//! ## Modes
//!
//! 1. **Countdown** - counts down from `timeout`; when it reaches zero the round
//!    ends and the grid is reshuffled. The last `warning` of the countdown is
//!    displayed as a warning and refreshed at a finer granularity.
//! 2. **Elapsed** - counts up from the last deal or successful match. Has no
//!    deadline.
//! 3. **Untimed** - no clock is displayed at all.
//!
//! In every timed mode a successful match resets the clock.

use setgrid_types::TimerMode;
use std::time::{Duration, Instant};

/// Smallest interval the dealer sleeps between refreshes.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// What the display should show for the round clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockReading {
    /// Remaining time (countdown) or elapsed time (elapsed), in milliseconds.
    pub millis: u64,
    /// True once a countdown is inside its warning window.
    pub warning: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct RoundClock {
    mode: TimerMode,
    started_at: Instant,
}

impl RoundClock {
    /// Create a clock in `mode`, started at `now`.
    pub fn new(mode: TimerMode, now: Instant) -> Self {
        Self {
            mode,
            started_at: now,
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    /// Restart the clock at `now` (new deal or successful match).
    pub fn reset(&mut self, now: Instant) {
        self.started_at = now;
    }

    /// Deadline of the current round, if counting down.
    pub fn deadline(&self) -> Option<Instant> {
        match self.mode {
            TimerMode::Countdown { timeout, .. } => Some(self.started_at + timeout),
            TimerMode::Elapsed | TimerMode::Untimed => None,
        }
    }

    /// Time left before the deadline (zero once passed).
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Check whether a countdown has reached zero.
    ///
    /// Always `false` for the elapsed and untimed modes.
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Check whether a countdown is inside its warning window.
    pub fn in_warning(&self, now: Instant) -> bool {
        match (self.mode, self.remaining(now)) {
            (TimerMode::Countdown { warning, .. }, Some(remaining)) => remaining <= warning,
            _ => false,
        }
    }

    /// Value to display at `now`; `None` when untimed.
    pub fn reading(&self, now: Instant) -> Option<ClockReading> {
        match self.mode {
            TimerMode::Countdown { .. } => {
                let remaining = self.remaining(now).unwrap_or_default();
                Some(ClockReading {
                    millis: remaining.as_millis() as u64,
                    warning: self.in_warning(now),
                })
            }
            TimerMode::Elapsed => Some(ClockReading {
                millis: now.saturating_duration_since(self.started_at).as_millis() as u64,
                warning: false,
            }),
            TimerMode::Untimed => None,
        }
    }

    /// How long the dealer may sleep before the display or the deadline needs
    /// attention.
    ///
    /// Outside the warning window this is `tick`, clamped so the dealer wakes
    /// when the window opens. Inside it, `warning_tick`, clamped to the time
    /// remaining. Never shorter than [`MIN_TICK`] unless the deadline has
    /// already passed.
    pub fn next_tick(&self, now: Instant, tick: Duration, warning_tick: Duration) -> Duration {
        let TimerMode::Countdown { warning, .. } = self.mode else {
            return tick.max(MIN_TICK);
        };
        let remaining = self.remaining(now).unwrap_or_default();
        if remaining.is_zero() {
            return Duration::ZERO;
        }
        let step = if remaining <= warning {
            warning_tick.max(MIN_TICK)
        } else {
            tick.max(MIN_TICK).min(remaining - warning).max(MIN_TICK)
        };
        step.min(remaining)
    }
}
