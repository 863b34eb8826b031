//! Table configuration.
//!
//! Loaded from YAML by the table service; every field has a default so partial
//! files are accepted.

use crate::card::{ActorId, FeatureLayout, DEFAULT_FEATURES, DEFAULT_FEATURE_SIZE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("hand_size must be greater than zero")]
    EmptyHand,
    #[error("table_size ({table}) must be at least hand_size ({hand})")]
    TableTooSmall { table: usize, hand: usize },
    #[error("deck_size ({deck}) exceeds the {max} cards the feature layout can encode")]
    DeckTooLarge { deck: u32, max: u32 },
    #[error("feature layout overflows (features={features}, feature_size={feature_size})")]
    LayoutOverflow { features: u32, feature_size: u32 },
    #[error("at least one player is required")]
    NoPlayers,
    #[error("input_queue must be greater than zero")]
    EmptyInputQueue,
    #[error("tick_ms must be greater than zero")]
    ZeroTick,
    #[error("freeze_step_ms must be greater than zero")]
    ZeroFreezeStep,
}

/// Round clock behavior, derived from `turn_timeout_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerMode {
    /// Counts down from `timeout`; reaching zero reshuffles the table.
    Countdown { timeout: Duration, warning: Duration },
    /// Counts up from the last deal or match; no deadline.
    Elapsed,
    /// No clock at all.
    Untimed,
}

impl TimerMode {
    pub fn is_timed(&self) -> bool {
        !matches!(self, TimerMode::Untimed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub features: u32,
    pub feature_size: u32,
    /// Cards in play; the first `deck_size` ids of the feature layout.
    pub deck_size: u32,
    pub table_size: usize,
    pub hand_size: usize,

    pub human_players: usize,
    pub computer_players: usize,
    pub player_names: Vec<String>,

    /// `> 0` countdown, `0` elapsed clock, `< 0` untimed.
    pub turn_timeout_ms: i64,
    pub turn_timeout_warning_ms: u64,
    pub point_freeze_ms: u64,
    pub penalty_freeze_ms: u64,
    pub freeze_step_ms: u64,

    /// Upper bound on how long the dealer sleeps between clock refreshes.
    pub tick_ms: u64,
    /// Refresh interval once the countdown enters its warning window.
    pub warning_tick_ms: u64,
    /// Artificial pause per card placed or removed by the dealer.
    pub table_delay_ms: u64,
    /// Pause between selections generated by a computer player.
    pub computer_delay_ms: u64,
    pub end_game_pause_ms: u64,

    /// Log every legal group on the table after each deal.
    pub hints: bool,
    pub seed: u64,
    /// Capacity of each player's pending-selection queue.
    pub input_queue: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            features: DEFAULT_FEATURES,
            feature_size: DEFAULT_FEATURE_SIZE,
            deck_size: 81,
            table_size: 12,
            hand_size: 3,
            human_players: 0,
            computer_players: 2,
            player_names: Vec::new(),
            turn_timeout_ms: 60_000,
            turn_timeout_warning_ms: 5_000,
            point_freeze_ms: 1_000,
            penalty_freeze_ms: 3_000,
            freeze_step_ms: 1_000,
            tick_ms: 500,
            warning_tick_ms: 10,
            table_delay_ms: 0,
            computer_delay_ms: 100,
            end_game_pause_ms: 0,
            hints: false,
            seed: 0x5e7_6a3e,
            input_queue: 3,
        }
    }
}

impl GameConfig {
    /// Validate sizes and intervals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hand_size == 0 {
            return Err(ConfigError::EmptyHand);
        }
        if self.table_size < self.hand_size {
            return Err(ConfigError::TableTooSmall {
                table: self.table_size,
                hand: self.hand_size,
            });
        }
        let max = self
            .layout()
            .full_deck_size()
            .ok_or(ConfigError::LayoutOverflow {
                features: self.features,
                feature_size: self.feature_size,
            })?;
        if self.deck_size > max {
            return Err(ConfigError::DeckTooLarge {
                deck: self.deck_size,
                max,
            });
        }
        if self.players() == 0 {
            return Err(ConfigError::NoPlayers);
        }
        if self.input_queue == 0 {
            return Err(ConfigError::EmptyInputQueue);
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        if self.freeze_step_ms == 0 {
            return Err(ConfigError::ZeroFreezeStep);
        }
        Ok(())
    }

    pub fn layout(&self) -> FeatureLayout {
        FeatureLayout::new(self.features, self.feature_size)
    }

    pub fn players(&self) -> usize {
        self.human_players + self.computer_players
    }

    /// Humans occupy the first `human_players` seats.
    pub fn is_human(&self, actor: ActorId) -> bool {
        actor.0 < self.human_players
    }

    pub fn player_name(&self, actor: ActorId) -> String {
        self.player_names
            .get(actor.0)
            .cloned()
            .unwrap_or_else(|| format!("player-{}", actor.0))
    }

    pub fn timer_mode(&self) -> TimerMode {
        match self.turn_timeout_ms {
            ms if ms > 0 => TimerMode::Countdown {
                timeout: Duration::from_millis(ms as u64),
                warning: Duration::from_millis(self.turn_timeout_warning_ms),
            },
            0 => TimerMode::Elapsed,
            _ => TimerMode::Untimed,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn warning_tick(&self) -> Duration {
        Duration::from_millis(self.warning_tick_ms)
    }

    pub fn point_freeze(&self) -> Duration {
        Duration::from_millis(self.point_freeze_ms)
    }

    pub fn penalty_freeze(&self) -> Duration {
        Duration::from_millis(self.penalty_freeze_ms)
    }

    pub fn freeze_step(&self) -> Duration {
        Duration::from_millis(self.freeze_step_ms)
    }

    pub fn table_delay(&self) -> Duration {
        Duration::from_millis(self.table_delay_ms)
    }

    pub fn computer_delay(&self) -> Duration {
        Duration::from_millis(self.computer_delay_ms)
    }

    pub fn end_game_pause(&self) -> Duration {
        Duration::from_millis(self.end_game_pause_ms)
    }
}
