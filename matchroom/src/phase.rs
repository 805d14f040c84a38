//! Match lifecycle phases and the transition machine that guards them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Error type for phase transitions.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    Invalid { from: MatchPhase, to: MatchPhase },
}

pub type TransitionResult<T> = Result<T, TransitionError>;

/// Phases a match moves through, in order. Settlement can preempt any
/// pre-settled phase (a forced void cuts the lifecycle short); `Archived`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    CaptainVote,
    PickOrder,
    FormatVote,
    Drafting,
    AwaitingReport,
    Settled,
    Archived,
}

impl MatchPhase {
    /// Phases reachable from this one.
    pub fn valid_transitions(self) -> Vec<MatchPhase> {
        match self {
            Self::CaptainVote => vec![Self::PickOrder, Self::Settled],
            Self::PickOrder => vec![Self::FormatVote, Self::Settled],
            Self::FormatVote => vec![Self::Drafting, Self::Settled],
            Self::Drafting => vec![Self::AwaitingReport, Self::Settled],
            Self::AwaitingReport => vec![Self::Settled],
            Self::Settled => vec![Self::Archived],
            Self::Archived => vec![],
        }
    }

    pub fn can_transition_to(self, next: MatchPhase) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Archived)
    }
}

impl std::fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CaptainVote => "captain_vote",
            Self::PickOrder => "pick_order",
            Self::FormatVote => "format_vote",
            Self::Drafting => "drafting",
            Self::AwaitingReport => "awaiting_report",
            Self::Settled => "settled",
            Self::Archived => "archived",
        };
        write!(f, "{}", name)
    }
}

/// One recorded phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: MatchPhase,
    pub to: MatchPhase,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Tracks the current phase and the full transition history.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    current: MatchPhase,
    history: Vec<PhaseTransition>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            current: MatchPhase::CaptainVote,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> MatchPhase {
        self.current
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    /// Move to the next phase, recording the transition.
    pub fn advance(&mut self, to: MatchPhase, reason: impl Into<String>) -> TransitionResult<()> {
        if !self.current.can_transition_to(to) {
            return Err(TransitionError::Invalid {
                from: self.current,
                to,
            });
        }
        let transition = PhaseTransition {
            from: self.current,
            to,
            at: Utc::now(),
            reason: reason.into(),
        };
        debug!(from = %transition.from, to = %transition.to, reason = %transition.reason, "phase transition");
        self.current = to;
        self.history.push(transition);
        Ok(())
    }
}
