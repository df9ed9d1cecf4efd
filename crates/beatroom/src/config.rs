//! Lobby configuration.

use std::time::Duration;

use beatroom_room::ScoreNormalization;
use serde::{Deserialize, Serialize};

/// Tunables for the lobby service.
///
/// Room-level settings live in [`RoomSettings`](beatroom_room::RoomSettings);
/// these apply to every room the lobby manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// How long the countdown runs between "start" and the round.
    pub countdown: Duration,

    /// Longest a round may run when the beatmap length is unknown.
    pub round_timeout: Duration,

    /// Added to the beatmap length to get the round timeout, for loading
    /// and late reporters.
    pub round_grace: Duration,

    /// Compare-and-swap attempts before giving up with `Contention`.
    pub max_retries: u32,

    /// ScoreV2 baseline when the beatmap rules don't supply a maximum.
    pub normalization: ScoreNormalization,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(5),
            round_timeout: Duration::from_secs(10 * 60),
            round_grace: Duration::from_secs(30),
            max_retries: 8,
            normalization: ScoreNormalization::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LobbyConfig::default();
        assert_eq!(config.countdown, Duration::from_secs(5));
        assert_eq!(config.max_retries, 8);
        assert_eq!(config.normalization.max_score, 1_000_000.0);
    }

    #[test]
    fn test_partial_config_fills_in_defaults() {
        let config: LobbyConfig =
            serde_json::from_str(r#"{ "max_retries": 3 }"#).unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.round_grace, Duration::from_secs(30));
    }
}
