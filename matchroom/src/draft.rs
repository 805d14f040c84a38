//! Turn-based drafting — captains alternate picks over the undrafted pool,
//! with a deterministic auto-pick when a turn times out.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ballot::{self, Ballot, SubmitError};
use crate::events::{MatchEvent, SharedEventBus};
use crate::format::DraftFormat;
use crate::participant::{NameCache, ParticipantId, Team, TeamSide};
use crate::presenter::{
    ChoiceOption, Presenter, PresenterError, PromptRequest, PromptScope, RoomHandle,
};
use crate::registry::MatchId;

/// Error type for draft operations.
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("the draft is already complete")]
    Complete,

    #[error("participant {0} is not in the undrafted pool")]
    NotInPool(ParticipantId),

    #[error(transparent)]
    Presenter(#[from] PresenterError),
}

pub type DraftResult<T> = Result<T, DraftError>;

/// One entry in the pick log. Turns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub turn: usize,
    pub picker: ParticipantId,
    pub pickee: ParticipantId,
    pub auto: bool,
}

/// Draft bookkeeping: the undrafted pool, both rosters, and the pick log.
///
/// Invariant: every participant is in exactly one of {pool, team A, team B};
/// rosters only grow and the pool only shrinks.
#[derive(Debug, Clone)]
pub struct DraftState {
    format: DraftFormat,
    pool: Vec<ParticipantId>,
    team_a: Team,
    team_b: Team,
    picks: Vec<Pick>,
}

impl DraftState {
    /// Seed a draft: captains head their rosters, everyone else enters the
    /// undrafted pool in the given order.
    pub fn new(
        format: DraftFormat,
        captain_a: ParticipantId,
        captain_b: ParticipantId,
        participants: &[ParticipantId],
    ) -> Self {
        let pool = participants
            .iter()
            .filter(|p| **p != captain_a && **p != captain_b)
            .cloned()
            .collect();
        Self {
            format,
            pool,
            team_a: Team::new(TeamSide::A, captain_a),
            team_b: Team::new(TeamSide::B, captain_b),
            picks: Vec::new(),
        }
    }

    pub fn format(&self) -> DraftFormat {
        self.format
    }

    pub fn pool(&self) -> &[ParticipantId] {
        &self.pool
    }

    pub fn team(&self, side: TeamSide) -> &Team {
        match side {
            TeamSide::A => &self.team_a,
            TeamSide::B => &self.team_b,
        }
    }

    pub fn picks(&self) -> &[Pick] {
        &self.picks
    }

    pub fn is_complete(&self) -> bool {
        self.pool.is_empty()
    }

    /// Which side is on the clock for the next pick. Straight alternates
    /// strictly; snake reverses each pair of picks (A,B,B,A,A,B,…).
    pub fn clocked_side(&self) -> TeamSide {
        let i = self.picks.len();
        let a_turn = match self.format {
            DraftFormat::Straight => i % 2 == 0,
            DraftFormat::Snake => ((i + 1) / 2) % 2 == 0,
        };
        if a_turn {
            TeamSide::A
        } else {
            TeamSide::B
        }
    }

    /// Captain whose pick is due.
    pub fn clocked_captain(&self) -> &ParticipantId {
        &self.team(self.clocked_side()).captain
    }

    /// Apply the clocked captain's manual pick.
    pub fn apply_pick(&mut self, pickee: &ParticipantId) -> DraftResult<Pick> {
        self.take(pickee, false)
    }

    /// Timeout resolution: the head of the pool joins the clocked team.
    pub fn auto_pick(&mut self) -> DraftResult<Pick> {
        let head = self.pool.first().cloned().ok_or(DraftError::Complete)?;
        self.take(&head, true)
    }

    fn take(&mut self, pickee: &ParticipantId, auto: bool) -> DraftResult<Pick> {
        if self.is_complete() {
            return Err(DraftError::Complete);
        }
        let index = self
            .pool
            .iter()
            .position(|p| p == pickee)
            .ok_or_else(|| DraftError::NotInPool(pickee.clone()))?;
        let side = self.clocked_side();
        let pickee = self.pool.remove(index);
        let pick = Pick {
            turn: self.picks.len() + 1,
            picker: self.team(side).captain.clone(),
            pickee: pickee.clone(),
            auto,
        };
        match side {
            TeamSide::A => self.team_a.add(pickee),
            TeamSide::B => self.team_b.add(pickee),
        }
        debug!(turn = pick.turn, picker = %pick.picker, pickee = %pick.pickee, auto, "pick applied");
        self.picks.push(pick.clone());
        Ok(pick)
    }

    /// Consume the state into the final rosters.
    pub fn into_teams(self) -> (Team, Team) {
        (self.team_a, self.team_b)
    }
}

/// Drives a draft to completion against the presenter.
pub struct DraftEngine<P> {
    presenter: Arc<P>,
    events: SharedEventBus,
    turn_window: Duration,
}

impl<P: Presenter> DraftEngine<P> {
    pub fn new(presenter: Arc<P>, events: SharedEventBus, turn_window: Duration) -> Self {
        Self {
            presenter,
            events,
            turn_window,
        }
    }

    /// Run every remaining turn. Each turn opens a single-voter ballot for
    /// the clocked captain over the current pool; submissions from anyone
    /// else are rejected and privately explained without consuming the
    /// turn, and a lapsed window auto-picks the pool head.
    pub async fn run(
        &self,
        match_id: MatchId,
        room: &RoomHandle,
        state: &mut DraftState,
        names: &NameCache,
    ) -> DraftResult<()> {
        while !state.is_complete() {
            let captain = state.clocked_captain().clone();
            let side = state.clocked_side();
            let options = state
                .pool()
                .iter()
                .map(|id| ChoiceOption::new(id.as_str(), names.label_for(id)))
                .collect();
            let request = PromptRequest::new(
                PromptScope::Room(room.clone()),
                format!("draft pick {} ({})", state.picks().len() + 1, side),
                options,
                self.turn_window,
            );
            self.presenter
                .announce(
                    room,
                    &format!("{} is on the clock.", names.label_for(&captain)),
                )
                .await?;
            let mut rx = self.presenter.prompt(request).await?;

            let mut ballot: Ballot<ParticipantId> =
                Ballot::open(vec![captain.clone()], self.turn_window);
            let pool_snapshot = state.pool().to_vec();
            let presenter = Arc::clone(&self.presenter);
            ballot::collect(
                &mut ballot,
                &mut rx,
                |observed| {
                    let pickee = ParticipantId::new(observed.option_id.clone());
                    pool_snapshot.contains(&pickee).then_some(pickee)
                },
                Ballot::all_voted,
                |voter, err| {
                    let presenter = Arc::clone(&presenter);
                    async move {
                        if matches!(err, SubmitError::NotEligible(_)) {
                            let _ = presenter
                                .notify(&voter, "You're not on the clock.")
                                .await;
                        }
                    }
                },
            )
            .await;

            let pick = match ballot.vote_of(&captain).cloned() {
                Some(pickee) => state.apply_pick(&pickee)?,
                None => {
                    info!(%captain, "draft turn lapsed, auto-picking");
                    state.auto_pick()?
                }
            };

            let line = if pick.auto {
                format!(
                    "Time's up — {} is auto-assigned to {}.",
                    names.label_for(&pick.pickee),
                    side
                )
            } else {
                format!(
                    "{} picks {}.",
                    names.label_for(&pick.picker),
                    names.label_for(&pick.pickee)
                )
            };
            self.presenter.announce(room, &line).await?;
            self.events.publish(MatchEvent::PickMade {
                match_id,
                pick,
                timestamp: chrono::Utc::now(),
            });
        }

        info!(match_id, picks = state.picks().len(), "draft complete");
        self.events.publish(MatchEvent::DraftCompleted {
            match_id,
            team_a: state.team(TeamSide::A).members.clone(),
            team_b: state.team(TeamSide::B).members.clone(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }
}
