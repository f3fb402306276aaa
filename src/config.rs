//! Game configuration.

use crate::validator::SetRules;
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Longest controller tick that still keeps the countdown display live.
const MAX_TICK_MILLIS: u64 = 1000;

/// Configuration consumed when a [`GameSession`](crate::GameSession) starts.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct GameConfig {
    /// Number of board slots.
    slot_count: usize,

    /// Number of items in the full supply.
    total_items: u32,

    /// Features per item, for the default rule set.
    feature_count: u32,

    /// Values per feature, for the default rule set.
    feature_size: u32,

    /// Players driven by `on_key_press` input.
    human_players: usize,

    /// Players driven by a random action generator.
    computer_players: usize,

    /// Time without a valid triple before the board is reshuffled.
    turn_timeout_millis: u64,

    /// Remaining time at which the countdown is flagged as low.
    turn_timeout_warning_millis: u64,

    /// Freeze served after scoring a point.
    point_freeze_millis: u64,

    /// Freeze served after an invalid triple.
    penalty_freeze_millis: u64,

    /// Controller wake-up interval.
    tick_millis: u64,

    /// Freeze display refresh interval.
    freeze_tick_millis: u64,

    /// Delay between generated actions of a computer player.
    computer_delay_millis: u64,

    /// Log the valid triples on the board after every deal.
    hints: bool,

    /// Seed for every random stream; entropy when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            slot_count: 12,
            total_items: 81,
            feature_count: 4,
            feature_size: 3,
            human_players: 0,
            computer_players: 2,
            turn_timeout_millis: 60_000,
            turn_timeout_warning_millis: 5_000,
            point_freeze_millis: 1_000,
            penalty_freeze_millis: 3_000,
            tick_millis: 100,
            freeze_tick_millis: 100,
            computer_delay_millis: 50,
            hints: false,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        info!(
            slots = config.slot_count,
            players = config.player_count(),
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Checks that the configured shape can actually be played.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_count < 3 {
            return Err(ConfigError::new(format!(
                "slot_count must be at least 3, got {}",
                self.slot_count
            )));
        }
        if self.player_count() == 0 {
            return Err(ConfigError::new("at least one player is required"));
        }
        if self.turn_timeout_millis == 0 {
            return Err(ConfigError::new("turn_timeout_millis must be positive"));
        }
        if self.tick_millis == 0 || self.tick_millis > MAX_TICK_MILLIS {
            return Err(ConfigError::new(format!(
                "tick_millis must be in 1..={}, got {}",
                MAX_TICK_MILLIS, self.tick_millis
            )));
        }
        if self.freeze_tick_millis == 0 {
            return Err(ConfigError::new("freeze_tick_millis must be positive"));
        }
        let universe = self.rules().universe();
        if u64::from(self.total_items) > universe {
            return Err(ConfigError::new(format!(
                "total_items {} exceeds the {} items the feature space can encode",
                self.total_items, universe
            )));
        }
        Ok(())
    }

    /// Total number of seated players; humans take the lowest ids.
    pub fn player_count(&self) -> usize {
        self.human_players + self.computer_players
    }

    /// Default rule set matching the configured feature space.
    pub fn rules(&self) -> SetRules {
        SetRules::new(self.feature_count, self.feature_size)
    }

    /// Reshuffle deadline length.
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_millis)
    }

    /// Low-time warning threshold.
    pub fn turn_timeout_warning(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_warning_millis)
    }

    /// Point freeze length.
    pub fn point_freeze(&self) -> Duration {
        Duration::from_millis(self.point_freeze_millis)
    }

    /// Penalty freeze length.
    pub fn penalty_freeze(&self) -> Duration {
        Duration::from_millis(self.penalty_freeze_millis)
    }

    /// Controller tick.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Freeze display tick.
    pub fn freeze_tick(&self) -> Duration {
        Duration::from_millis(self.freeze_tick_millis)
    }

    /// Computer player pacing.
    pub fn computer_delay(&self) -> Duration {
        Duration::from_millis(self.computer_delay_millis)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_playable() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.player_count(), 2);
        assert_eq!(config.turn_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn rejects_unplayable_shapes() {
        assert!(GameConfig::default().with_slot_count(2).validate().is_err());
        assert!(
            GameConfig::default()
                .with_computer_players(0)
                .validate()
                .is_err()
        );
        assert!(GameConfig::default().with_tick_millis(5_000).validate().is_err());
        assert!(GameConfig::default().with_total_items(82).validate().is_err());
    }

    #[test]
    fn error_records_caller_location() {
        let err = ConfigError::new("boom");
        assert!(err.line > 0);
        assert!(err.to_string().contains("boom"));
    }
}
