use setgrid_types::GameConfig;
use std::str::FromStr;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "SETGRID_";

/// Applies `SETGRID_*` overrides on top of `config`.
///
/// `lookup` resolves a variable name to its value; unset or unparsable values
/// leave the field untouched.
pub fn apply_overrides(config: &mut GameConfig, lookup: impl Fn(&str) -> Option<String>) {
    let read = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));

    override_with(&read, "FEATURES", &mut config.features);
    override_with(&read, "FEATURE_SIZE", &mut config.feature_size);
    override_with(&read, "DECK_SIZE", &mut config.deck_size);
    override_with(&read, "TABLE_SIZE", &mut config.table_size);
    override_with(&read, "HAND_SIZE", &mut config.hand_size);
    override_with(&read, "HUMAN_PLAYERS", &mut config.human_players);
    override_with(&read, "COMPUTER_PLAYERS", &mut config.computer_players);
    override_with(&read, "TURN_TIMEOUT_MS", &mut config.turn_timeout_ms);
    override_with(&read, "TURN_TIMEOUT_WARNING_MS", &mut config.turn_timeout_warning_ms);
    override_with(&read, "POINT_FREEZE_MS", &mut config.point_freeze_ms);
    override_with(&read, "PENALTY_FREEZE_MS", &mut config.penalty_freeze_ms);
    override_with(&read, "FREEZE_STEP_MS", &mut config.freeze_step_ms);
    override_with(&read, "TICK_MS", &mut config.tick_ms);
    override_with(&read, "WARNING_TICK_MS", &mut config.warning_tick_ms);
    override_with(&read, "TABLE_DELAY_MS", &mut config.table_delay_ms);
    override_with(&read, "COMPUTER_DELAY_MS", &mut config.computer_delay_ms);
    override_with(&read, "END_GAME_PAUSE_MS", &mut config.end_game_pause_ms);
    override_with(&read, "HINTS", &mut config.hints);
    override_with(&read, "SEED", &mut config.seed);
    override_with(&read, "INPUT_QUEUE", &mut config.input_queue);

    if let Some(raw) = read("PLAYER_NAMES") {
        config.player_names = raw
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
    }
}

fn override_with<T: FromStr>(read: &impl Fn(&str) -> Option<String>, key: &str, field: &mut T) {
    if let Some(value) = read(key).and_then(|raw| raw.trim().parse::<T>().ok()) {
        *field = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_applies_known_overrides() {
        let mut config = GameConfig::default();
        apply_overrides(
            &mut config,
            env(&[
                ("SETGRID_TABLE_SIZE", "9"),
                ("SETGRID_TURN_TIMEOUT_MS", "-1"),
                ("SETGRID_HINTS", "true"),
                ("SETGRID_PLAYER_NAMES", "ana, bo ,"),
            ]),
        );
        assert_eq!(config.table_size, 9);
        assert_eq!(config.turn_timeout_ms, -1);
        assert!(config.hints);
        assert_eq!(config.player_names, vec!["ana".to_string(), "bo".to_string()]);
    }

    #[test]
    fn test_ignores_unparsable_values() {
        let mut config = GameConfig::default();
        apply_overrides(
            &mut config,
            env(&[("SETGRID_HAND_SIZE", "three"), ("TABLE_SIZE", "1")]),
        );
        assert_eq!(config, GameConfig::default());
    }
}
