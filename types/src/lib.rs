pub mod card;
pub use card::{ActorId, Card, FeatureLayout, Slot, DEFAULT_FEATURES, DEFAULT_FEATURE_SIZE};
pub mod config;
pub use config::{ConfigError, GameConfig, TimerMode};
pub mod event;
pub use event::DisplayEvent;
