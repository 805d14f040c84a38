//! Result reporting — win and void vote tracks with quorum and captain
//! override, settling a match exactly once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{MatchEvent, SharedEventBus};
use crate::participant::{ParticipantId, Team, TeamSide};
use crate::presenter::ObservedChoice;
use crate::registry::MatchId;

/// Error type for settlement vote submission.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("participant {0} is not in this match")]
    NotEligible(ParticipantId),

    #[error("participant {0} already voted on this track")]
    DuplicateVote(ParticipantId),

    #[error("match is already settled")]
    AlreadySettled,
}

pub type SettlementResult<T> = Result<T, SettlementError>;

/// Final outcome of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    TeamAWin,
    TeamBWin,
    Void,
}

impl MatchOutcome {
    pub fn winning_side(self) -> Option<TeamSide> {
        match self {
            Self::TeamAWin => Some(TeamSide::A),
            Self::TeamBWin => Some(TeamSide::B),
            Self::Void => None,
        }
    }
}

impl std::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::TeamAWin => "team_a_win",
            Self::TeamBWin => "team_b_win",
            Self::Void => "void",
        };
        write!(f, "{}", name)
    }
}

/// One settlement vote: a win report for a team, or a void.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportVote {
    Win(TeamSide),
    Void,
}

impl ReportVote {
    pub fn option_id(self) -> &'static str {
        match self {
            Self::Win(TeamSide::A) => "report_team_a",
            Self::Win(TeamSide::B) => "report_team_b",
            Self::Void => "void",
        }
    }

    pub fn from_option_id(id: &str) -> Option<Self> {
        match id {
            "report_team_a" => Some(Self::Win(TeamSide::A)),
            "report_team_b" => Some(Self::Win(TeamSide::B)),
            "void" => Some(Self::Void),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Win(TeamSide::A) => "Team A won",
            Self::Win(TeamSide::B) => "Team B won",
            Self::Void => "Void match",
        }
    }
}

/// What a submitted vote did to the settlement state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteStanding {
    /// Vote counted; the track has `count` of `quorum` votes.
    Recorded {
        vote: ReportVote,
        count: usize,
        quorum: usize,
    },
    /// The vote settled the match.
    Settled(MatchOutcome),
}

/// Collects report and void votes until one track reaches quorum or a
/// captain decides. Settles at most once; every later vote or signal is
/// rejected or ignored.
#[derive(Debug)]
pub struct SettlementEngine {
    team_a: Team,
    team_b: Team,
    win_votes_a: HashSet<ParticipantId>,
    win_votes_b: HashSet<ParticipantId>,
    void_votes: HashSet<ParticipantId>,
    win_quorum: usize,
    void_quorum: usize,
    outcome: Option<MatchOutcome>,
}

impl SettlementEngine {
    pub fn new(team_a: Team, team_b: Team, win_quorum: usize, void_quorum: usize) -> Self {
        Self {
            team_a,
            team_b,
            win_votes_a: HashSet::new(),
            win_votes_b: HashSet::new(),
            void_votes: HashSet::new(),
            win_quorum,
            void_quorum,
            outcome: None,
        }
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    fn is_captain(&self, id: &ParticipantId) -> bool {
        self.team_a.captain == *id || self.team_b.captain == *id
    }

    fn is_eligible(&self, id: &ParticipantId) -> bool {
        self.team_a.contains(id) || self.team_b.contains(id)
    }

    /// Record one vote. Captains are authoritative on any track; non-captain
    /// win reports need `win_quorum` votes for one team, voids need
    /// `void_quorum` votes in total. A participant may vote on several
    /// tracks but only once per track.
    pub fn submit(&mut self, voter: &ParticipantId, vote: ReportVote) -> SettlementResult<VoteStanding> {
        if self.is_settled() {
            return Err(SettlementError::AlreadySettled);
        }
        if !self.is_eligible(voter) {
            return Err(SettlementError::NotEligible(voter.clone()));
        }

        let captain = self.is_captain(voter);
        match vote {
            ReportVote::Win(side) => {
                let track = match side {
                    TeamSide::A => &mut self.win_votes_a,
                    TeamSide::B => &mut self.win_votes_b,
                };
                if !track.insert(voter.clone()) {
                    return Err(SettlementError::DuplicateVote(voter.clone()));
                }
                if captain {
                    let outcome = match side {
                        TeamSide::A => MatchOutcome::TeamAWin,
                        TeamSide::B => MatchOutcome::TeamBWin,
                    };
                    info!(%voter, %outcome, "captain report settled the match");
                    self.outcome = Some(outcome);
                    return Ok(VoteStanding::Settled(outcome));
                }
                let count = match side {
                    TeamSide::A => self.non_captain_count(&self.win_votes_a),
                    TeamSide::B => self.non_captain_count(&self.win_votes_b),
                };
                if count >= self.win_quorum {
                    let outcome = match side {
                        TeamSide::A => MatchOutcome::TeamAWin,
                        TeamSide::B => MatchOutcome::TeamBWin,
                    };
                    info!(count, quorum = self.win_quorum, %outcome, "win quorum reached");
                    self.outcome = Some(outcome);
                    return Ok(VoteStanding::Settled(outcome));
                }
                debug!(%voter, %side, count, quorum = self.win_quorum, "win report recorded");
                Ok(VoteStanding::Recorded {
                    vote,
                    count,
                    quorum: self.win_quorum,
                })
            }
            ReportVote::Void => {
                if !self.void_votes.insert(voter.clone()) {
                    return Err(SettlementError::DuplicateVote(voter.clone()));
                }
                if captain {
                    info!(%voter, "captain voided the match");
                    self.outcome = Some(MatchOutcome::Void);
                    return Ok(VoteStanding::Settled(MatchOutcome::Void));
                }
                let count = self.void_votes.len();
                if count >= self.void_quorum {
                    info!(count, quorum = self.void_quorum, "void quorum reached");
                    self.outcome = Some(MatchOutcome::Void);
                    return Ok(VoteStanding::Settled(MatchOutcome::Void));
                }
                debug!(%voter, count, quorum = self.void_quorum, "void vote recorded");
                Ok(VoteStanding::Recorded {
                    vote,
                    count,
                    quorum: self.void_quorum,
                })
            }
        }
    }

    fn non_captain_count(&self, track: &HashSet<ParticipantId>) -> usize {
        track.iter().filter(|v| !self.is_captain(v)).count()
    }

    /// External force-terminate: voids an unsettled match, no-op afterwards.
    /// Returns whether this call performed the settlement.
    pub fn force_void(&mut self) -> bool {
        if self.is_settled() {
            debug!("force-void ignored, match already settled");
            return false;
        }
        info!("match force-voided");
        self.outcome = Some(MatchOutcome::Void);
        true
    }
}

/// Drive the engine from an observed-choice stream until the match settles.
///
/// Rejected votes are reported through `on_reject` and never settle
/// anything. A closed stream leaves the engine waiting forever; the caller
/// races this future against the force-terminate signal.
pub async fn collect<F, Fut>(
    engine: &mut SettlementEngine,
    rx: &mut mpsc::Receiver<ObservedChoice>,
    events: &SharedEventBus,
    match_id: MatchId,
    mut on_reject: F,
) -> MatchOutcome
where
    F: FnMut(ParticipantId, SettlementError) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        let Some(observed) = rx.recv().await else {
            // Stream closed without settlement; only force-terminate can
            // finish the match now.
            std::future::pending::<()>().await;
            unreachable!();
        };
        let Some(vote) = ReportVote::from_option_id(&observed.option_id) else {
            warn!(voter = %observed.voter, option = %observed.option_id, "unparseable report vote");
            continue;
        };
        match engine.submit(&observed.voter, vote) {
            Ok(VoteStanding::Settled(outcome)) => return outcome,
            Ok(VoteStanding::Recorded { vote, count, quorum }) => {
                events.publish(MatchEvent::report_vote_recorded(
                    match_id,
                    observed.voter.clone(),
                    vote,
                    count,
                    quorum,
                ));
            }
            Err(err) => {
                debug!(voter = %observed.voter, %err, "report vote rejected");
                on_reject(observed.voter, err).await;
            }
        }
    }
}
