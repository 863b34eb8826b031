use crate::actor::{ExternalInput, InputSource, RandomInput, Selector};
use crate::dealer::{Dealer, GameOutcome};
use crate::deck::Deck;
use crate::display::DisplaySink;
use crate::rules::MatchRule;
use setgrid_types::{ActorId, ConfigError, GameConfig};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("rule groups {rule} cards but hands hold {hand}")]
    GroupSizeMismatch { rule: usize, hand: usize },
}

/// A fully wired table: grid, deck, claim queue, dealer and seated players.
pub struct Game {
    dealer: Dealer,
}

impl Game {
    /// Validates `config` and seats every player.
    ///
    /// The first `human_players` seats take [`ExternalInput`] and are driven
    /// through [`Game::selector`]; the rest play on their own. Must be called
    /// from within a tokio runtime.
    pub fn new(
        config: &GameConfig,
        rule: Arc<dyn MatchRule>,
        display: Arc<dyn DisplaySink>,
    ) -> Result<Self, GameError> {
        config.validate()?;
        if rule.group_size() != config.hand_size {
            return Err(GameError::GroupSizeMismatch {
                rule: rule.group_size(),
                hand: config.hand_size,
            });
        }

        let inputs: Vec<Box<dyn InputSource>> = (0..config.players())
            .map(|seat| -> Box<dyn InputSource> {
                if config.is_human(ActorId(seat)) {
                    Box::new(ExternalInput)
                } else {
                    Box::new(RandomInput::new(
                        config.computer_delay(),
                        config.table_size,
                        config.seed.wrapping_add(seat as u64 + 2),
                    ))
                }
            })
            .collect();
        let deck = Deck::new(config.deck_size, config.seed);
        let dealer = Dealer::new(
            config,
            rule,
            display,
            deck,
            inputs,
            CancellationToken::new(),
        );
        for seat in 0..config.players() {
            let actor = ActorId(seat);
            info!(
                seat,
                name = %config.player_name(actor),
                human = config.is_human(actor),
                "player seated"
            );
        }
        Ok(Self { dealer })
    }

    /// Input handle for the player at `actor`.
    pub fn selector(&self, actor: ActorId) -> Option<Selector> {
        self.dealer.selector(actor)
    }

    /// Cancelling this token ends the game early with the current scores.
    pub fn cancel_token(&self) -> CancellationToken {
        self.dealer.cancel_token()
    }

    pub async fn run(self) -> GameOutcome {
        self.dealer.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::ChannelSink;
    use crate::mocks::{FixedRule, RecordingSink};
    use crate::rules::FeatureRule;
    use setgrid_types::{DisplayEvent, Slot};
    use std::collections::HashMap;
    use std::time::Duration;

    fn quick_config() -> GameConfig {
        GameConfig {
            deck_size: 12,
            table_size: 6,
            hand_size: 3,
            human_players: 0,
            computer_players: 3,
            turn_timeout_ms: -1,
            point_freeze_ms: 5,
            penalty_freeze_ms: 5,
            freeze_step_ms: 5,
            tick_ms: 10,
            computer_delay_ms: 1,
            ..GameConfig::default()
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = GameConfig {
            hand_size: 0,
            ..GameConfig::default()
        };
        let result = Game::new(
            &config,
            Arc::new(FeatureRule::default()),
            Arc::new(RecordingSink::default()),
        );
        assert!(matches!(result, Err(GameError::Config(ConfigError::EmptyHand))));
    }

    #[tokio::test]
    async fn test_rejects_group_size_mismatch() {
        let result = Game::new(
            &GameConfig::default(),
            Arc::new(FixedRule::always(4)),
            Arc::new(RecordingSink::default()),
        );
        assert!(matches!(
            result,
            Err(GameError::GroupSizeMismatch { rule: 4, hand: 3 })
        ));
    }

    #[tokio::test]
    async fn test_computer_players_finish_the_game() {
        let config = quick_config();
        let sink = Arc::new(RecordingSink::default());
        let game = Game::new(&config, Arc::new(FixedRule::always(3)), sink.clone()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(30), game.run())
            .await
            .expect("game should finish");

        // Every full hand matches: 12 cards make exactly 4 groups.
        assert_eq!(outcome.scores.iter().sum::<u32>(), 4);
        assert!(outcome.claims >= 4);
        let best = *outcome.scores.iter().max().unwrap();
        for winner in &outcome.winners {
            assert_eq!(outcome.scores[winner.0], best);
        }
        assert_eq!(sink.winners(), Some(outcome.winners.clone()));

        // Scores only ever grow by one.
        let mut last: HashMap<ActorId, u32> = HashMap::new();
        for (actor, score) in sink.scores() {
            let previous = last.insert(actor, score).unwrap_or(0);
            assert_eq!(score, previous + 1);
        }
    }

    #[tokio::test]
    async fn test_human_seat_is_driven_externally() {
        let config = GameConfig {
            deck_size: 3,
            table_size: 3,
            human_players: 1,
            computer_players: 0,
            turn_timeout_ms: 0,
            point_freeze_ms: 5,
            tick_ms: 10,
            ..GameConfig::default()
        };
        let sink = Arc::new(ChannelSink::new(256));
        let mut events = sink.subscribe();
        let game = Game::new(&config, Arc::new(FixedRule::always(3)), sink).unwrap();
        let selector = game.selector(ActorId(0)).unwrap();
        assert!(game.selector(ActorId(1)).is_none());
        let handle = tokio::spawn(game.run());

        let mut placed = 0;
        while placed < 3 {
            if let Ok(DisplayEvent::CardPlaced { .. }) = events.recv().await {
                placed += 1;
            }
        }
        for slot in 0..3 {
            // The grid turns ready right after the last placement.
            while !selector.select(Slot(slot)) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            loop {
                match events.recv().await {
                    Ok(DisplayEvent::MarkerPlaced { .. }) => break,
                    Ok(_) => continue,
                    Err(err) => panic!("event stream broke: {err}"),
                }
            }
        }

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("game should finish")
            .unwrap();
        assert_eq!(outcome.scores, vec![1]);
        assert_eq!(outcome.winners, vec![ActorId(0)]);

        let summary = serde_json::to_value(&outcome).unwrap();
        assert_eq!(summary["scores"], serde_json::json!([1]));
        assert_eq!(summary["winners"], serde_json::json!([0]));
    }

    #[tokio::test]
    async fn test_cancel_stops_game() {
        let config = GameConfig {
            computer_players: 2,
            computer_delay_ms: 5,
            turn_timeout_ms: 60_000,
            ..GameConfig::default()
        };
        let game = Game::new(
            &config,
            Arc::new(FeatureRule::new(config.layout(), 3)),
            Arc::new(RecordingSink::default()),
        )
        .unwrap();
        let token = game.cancel_token();
        let handle = tokio::spawn(game.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("game should stop")
            .unwrap();
        assert_eq!(outcome.scores.len(), 2);
        assert!(!outcome.winners.is_empty());
    }
}
