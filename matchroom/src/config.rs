//! Match timing windows and rating constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_RATING;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// All tunables for one match run. Every window is in whole seconds; the
/// defaults mirror a production deployment rather than the original's 5 s
/// test timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Window for the pool-wide captain vote.
    pub captain_vote_secs: u64,
    /// Window for the two-captain draft-format vote.
    pub format_vote_secs: u64,
    /// Window for each private duel gesture.
    pub duel_secs: u64,
    /// Window for each draft turn before the auto-pick fires.
    pub draft_turn_secs: u64,
    /// Countdown before participants are moved into their team rooms.
    pub move_countdown_secs: u64,
    /// Grace period between settlement and room teardown.
    pub archive_grace_secs: u64,
    /// Non-captain votes needed to settle a win report.
    pub win_report_quorum: usize,
    /// Total votes needed to settle a void.
    pub void_quorum: usize,
    /// Rating for participants with no stored record.
    pub default_rating: i64,
    /// Elo K-factor.
    pub k_factor: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            captain_vote_secs: 60,
            format_vote_secs: 30,
            duel_secs: 30,
            draft_turn_secs: 45,
            move_countdown_secs: 60,
            archive_grace_secs: 20,
            win_report_quorum: 3,
            void_quorum: 4,
            default_rating: DEFAULT_RATING,
            k_factor: 32.0,
        }
    }
}

impl MatchConfig {
    /// Parse from TOML and validate.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("captain_vote_secs", self.captain_vote_secs),
            ("format_vote_secs", self.format_vote_secs),
            ("duel_secs", self.duel_secs),
            ("draft_turn_secs", self.draft_turn_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }
        if self.win_report_quorum == 0 || self.win_report_quorum > 8 {
            return Err(ConfigError::Invalid(
                "win_report_quorum must be in 1..=8".to_string(),
            ));
        }
        if self.void_quorum == 0 || self.void_quorum > 8 {
            return Err(ConfigError::Invalid(
                "void_quorum must be in 1..=8".to_string(),
            ));
        }
        if !self.k_factor.is_finite() || self.k_factor <= 0.0 {
            return Err(ConfigError::Invalid(
                "k_factor must be a positive number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn captain_vote_window(&self) -> Duration {
        Duration::from_secs(self.captain_vote_secs)
    }

    pub fn format_vote_window(&self) -> Duration {
        Duration::from_secs(self.format_vote_secs)
    }

    pub fn duel_window(&self) -> Duration {
        Duration::from_secs(self.duel_secs)
    }

    pub fn draft_turn_window(&self) -> Duration {
        Duration::from_secs(self.draft_turn_secs)
    }

    pub fn move_countdown(&self) -> Duration {
        Duration::from_secs(self.move_countdown_secs)
    }

    pub fn archive_grace(&self) -> Duration {
        Duration::from_secs(self.archive_grace_secs)
    }
}
