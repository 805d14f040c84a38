//! Timed voting primitive — collects choices from a fixed eligible set
//! within a deadline and exposes a tally.
//!
//! A ballot is created per decision point and never reused. It only
//! aggregates: callers render the prompt through the presenter and feed the
//! observed choices into [`collect`], which suspends until the deadline or
//! an early-exit quorum.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::participant::ParticipantId;
use crate::presenter::ObservedChoice;

/// Why a submission was rejected. Rejections never change ballot state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("{0} is not eligible to vote in this ballot")]
    NotEligible(ParticipantId),

    #[error("{0} already voted; the first choice stands")]
    DuplicateVote(ParticipantId),

    #[error("the ballot deadline has passed")]
    AfterDeadline,
}

/// How a ballot finished collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotClose {
    /// The deadline was reached.
    Deadline,
    /// An early-exit quorum was satisfied before the deadline.
    EarlyQuorum,
}

/// A single-use timed ballot over choices of type `C`.
#[derive(Debug)]
pub struct Ballot<C> {
    id: String,
    eligible: Vec<ParticipantId>,
    votes: HashMap<ParticipantId, C>,
    deadline: Instant,
}

impl<C> Ballot<C>
where
    C: Clone + Eq + Hash + std::fmt::Debug,
{
    /// Open a ballot over a fixed eligible-voter set with a deadline
    /// `window` from now.
    pub fn open(eligible: Vec<ParticipantId>, window: Duration) -> Self {
        let ballot = Self {
            id: uuid::Uuid::new_v4().to_string(),
            eligible,
            votes: HashMap::new(),
            deadline: Instant::now() + window,
        };
        debug!(ballot = %ballot.id, eligible = ballot.eligible.len(), "ballot opened");
        ballot
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Record one choice. Later re-votes from the same voter are rejected;
    /// the first choice stands.
    pub fn submit(&mut self, voter: &ParticipantId, choice: C) -> Result<(), SubmitError> {
        if Instant::now() > self.deadline {
            return Err(SubmitError::AfterDeadline);
        }
        if !self.eligible.contains(voter) {
            return Err(SubmitError::NotEligible(voter.clone()));
        }
        if self.votes.contains_key(voter) {
            return Err(SubmitError::DuplicateVote(voter.clone()));
        }
        debug!(ballot = %self.id, voter = %voter, choice = ?choice, "vote accepted");
        self.votes.insert(voter.clone(), choice);
        Ok(())
    }

    /// The choice a voter submitted, if any.
    pub fn vote_of(&self, voter: &ParticipantId) -> Option<&C> {
        self.votes.get(voter)
    }

    pub fn votes_cast(&self) -> usize {
        self.votes.len()
    }

    /// Whether every eligible voter has voted.
    pub fn all_voted(&self) -> bool {
        self.votes.len() == self.eligible.len()
    }

    pub fn tally(&self) -> Tally<C> {
        let mut counts: HashMap<C, usize> = HashMap::new();
        for choice in self.votes.values() {
            *counts.entry(choice.clone()).or_insert(0) += 1;
        }
        Tally { counts }
    }
}

/// Vote counts per choice with plurality helpers.
#[derive(Debug, Clone)]
pub struct Tally<C> {
    counts: HashMap<C, usize>,
}

impl<C> Tally<C>
where
    C: Clone + Eq + Hash,
{
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, choice: &C) -> usize {
        self.counts.get(choice).copied().unwrap_or(0)
    }

    /// Highest vote count; 0 when no votes were cast.
    pub fn max_count(&self) -> usize {
        self.counts.values().copied().max().unwrap_or(0)
    }

    /// All choices tied for the plurality lead.
    pub fn leaders(&self) -> Vec<C> {
        let max = self.max_count();
        if max == 0 {
            return Vec::new();
        }
        self.counts
            .iter()
            .filter(|(_, &count)| count == max)
            .map(|(choice, _)| choice.clone())
            .collect()
    }

    /// All choices tied for second place, strictly below the lead. Empty
    /// when nothing but the leaders received votes.
    pub fn runners_up(&self) -> Vec<C> {
        let max = self.max_count();
        let second = self
            .counts
            .values()
            .copied()
            .filter(|&count| count < max)
            .max();
        match second {
            None => Vec::new(),
            Some(second) => self
                .counts
                .iter()
                .filter(|(_, &count)| count == second)
                .map(|(choice, _)| choice.clone())
                .collect(),
        }
    }
}

/// Drive a ballot to resolution from a stream of observed choices.
///
/// Suspends until the deadline or until `quorum` returns true. Choices the
/// parser cannot map are ignored; rejected submissions are reported through
/// `on_reject` so callers can explain them privately without consuming the
/// decision.
pub async fn collect<C, P, Q, R, Fut>(
    ballot: &mut Ballot<C>,
    rx: &mut mpsc::Receiver<ObservedChoice>,
    parse: P,
    quorum: Q,
    mut on_reject: R,
) -> BallotClose
where
    C: Clone + Eq + Hash + std::fmt::Debug,
    P: Fn(&ObservedChoice) -> Option<C>,
    Q: Fn(&Ballot<C>) -> bool,
    R: FnMut(ParticipantId, SubmitError) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    if quorum(ballot) {
        return BallotClose::EarlyQuorum;
    }
    loop {
        tokio::select! {
            _ = time::sleep_until(ballot.deadline()) => {
                debug!(ballot = %ballot.id(), votes = ballot.votes_cast(), "ballot closed at deadline");
                return BallotClose::Deadline;
            }
            observed = rx.recv() => {
                let Some(observed) = observed else {
                    // Prompt closed by the transport; no further votes can
                    // arrive, so wait out the deadline.
                    time::sleep_until(ballot.deadline()).await;
                    return BallotClose::Deadline;
                };
                let Some(choice) = parse(&observed) else {
                    warn!(ballot = %ballot.id(), option = %observed.option_id, "unparseable choice ignored");
                    continue;
                };
                match ballot.submit(&observed.voter, choice) {
                    Ok(()) => {
                        if quorum(ballot) {
                            debug!(ballot = %ballot.id(), votes = ballot.votes_cast(), "ballot closed by quorum");
                            return BallotClose::EarlyQuorum;
                        }
                    }
                    Err(err) => {
                        debug!(ballot = %ballot.id(), voter = %observed.voter, %err, "vote rejected");
                        on_reject(observed.voter, err).await;
                    }
                }
            }
        }
    }
}
