//! Observable match event stream over a broadcast bus.
//!
//! Every externally interesting state change is published here so audit
//! and leaderboard collaborators can follow a match without being wired
//! into the runner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::draft::Pick;
use crate::format::DraftFormat;
use crate::participant::ParticipantId;
use crate::rating::RatingDelta;
use crate::registry::MatchId;
use crate::settlement::{MatchOutcome, ReportVote};

/// Bounded lag before slow subscribers start missing events.
pub const CHANNEL_CAPACITY: usize = 256;

/// Everything a match emits, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    MatchCreated {
        match_id: MatchId,
        participants: Vec<ParticipantId>,
        timestamp: DateTime<Utc>,
    },
    CaptainsSelected {
        match_id: MatchId,
        first: ParticipantId,
        second: ParticipantId,
        timestamp: DateTime<Utc>,
    },
    PickOrderDecided {
        match_id: MatchId,
        first_pick: ParticipantId,
        timestamp: DateTime<Utc>,
    },
    FormatChosen {
        match_id: MatchId,
        format: DraftFormat,
        by_duel: bool,
        timestamp: DateTime<Utc>,
    },
    PickMade {
        match_id: MatchId,
        pick: Pick,
        timestamp: DateTime<Utc>,
    },
    DraftCompleted {
        match_id: MatchId,
        team_a: Vec<ParticipantId>,
        team_b: Vec<ParticipantId>,
        timestamp: DateTime<Utc>,
    },
    ReportVoteRecorded {
        match_id: MatchId,
        voter: ParticipantId,
        vote: ReportVote,
        count: usize,
        quorum: usize,
        timestamp: DateTime<Utc>,
    },
    MatchSettled {
        match_id: MatchId,
        outcome: MatchOutcome,
        forced: bool,
        timestamp: DateTime<Utc>,
    },
    RatingsApplied {
        match_id: MatchId,
        deltas: Vec<RatingDelta>,
        timestamp: DateTime<Utc>,
    },
    PersistenceFailure {
        match_id: MatchId,
        detail: String,
        timestamp: DateTime<Utc>,
    },
    MatchArchived {
        match_id: MatchId,
        timestamp: DateTime<Utc>,
    },
}

impl MatchEvent {
    pub fn report_vote_recorded(
        match_id: MatchId,
        voter: ParticipantId,
        vote: ReportVote,
        count: usize,
        quorum: usize,
    ) -> Self {
        Self::ReportVoteRecorded {
            match_id,
            voter,
            vote,
            count,
            quorum,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MatchCreated { .. } => "match_created",
            Self::CaptainsSelected { .. } => "captains_selected",
            Self::PickOrderDecided { .. } => "pick_order_decided",
            Self::FormatChosen { .. } => "format_chosen",
            Self::PickMade { .. } => "pick_made",
            Self::DraftCompleted { .. } => "draft_completed",
            Self::ReportVoteRecorded { .. } => "report_vote_recorded",
            Self::MatchSettled { .. } => "match_settled",
            Self::RatingsApplied { .. } => "ratings_applied",
            Self::PersistenceFailure { .. } => "persistence_failure",
            Self::MatchArchived { .. } => "match_archived",
        }
    }

    pub fn match_id(&self) -> MatchId {
        match self {
            Self::MatchCreated { match_id, .. }
            | Self::CaptainsSelected { match_id, .. }
            | Self::PickOrderDecided { match_id, .. }
            | Self::FormatChosen { match_id, .. }
            | Self::PickMade { match_id, .. }
            | Self::DraftCompleted { match_id, .. }
            | Self::ReportVoteRecorded { match_id, .. }
            | Self::MatchSettled { match_id, .. }
            | Self::RatingsApplied { match_id, .. }
            | Self::PersistenceFailure { match_id, .. }
            | Self::MatchArchived { match_id, .. } => *match_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::MatchCreated { timestamp, .. }
            | Self::CaptainsSelected { timestamp, .. }
            | Self::PickOrderDecided { timestamp, .. }
            | Self::FormatChosen { timestamp, .. }
            | Self::PickMade { timestamp, .. }
            | Self::DraftCompleted { timestamp, .. }
            | Self::ReportVoteRecorded { timestamp, .. }
            | Self::MatchSettled { timestamp, .. }
            | Self::RatingsApplied { timestamp, .. }
            | Self::PersistenceFailure { timestamp, .. }
            | Self::MatchArchived { timestamp, .. } => *timestamp,
        }
    }
}

/// Broadcast bus for match events. Publishing never fails; events sent
/// with no live subscribers are dropped.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<MatchEvent>,
}

pub type SharedEventBus = Arc<EventBus>;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: MatchEvent) {
        debug!(
            event_type = event.event_type(),
            match_id = event.match_id(),
            "publishing match event"
        );
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
