//! Match Orchestration Engine
//!
//! Turns a filled pool of eight participants into two drafted, rated teams
//! and a settled outcome:
//!
//! - `captain`: pool-wide captain vote with cascading tie-break rules
//! - `duel`: rock/paper/scissors tie-break for pick order and draft format
//! - `format`: straight vs. snake draft selection between the captains
//! - `draft`: turn-based drafting with auto-picks on lapsed turns
//! - `settlement`: result-report and void vote tracks, settling exactly once
//! - `rating`: Elo-style team-average rating update at settlement
//! - `runner`: the phase machine that drives one match end to end
//!
//! Presentation and persistence are collaborator traits ([`Presenter`],
//! [`RatingStore`]); the engine renders nothing and stores nothing itself.
//! Everything observable is also published on the [`EventBus`].

pub mod ballot;
pub mod captain;
pub mod config;
pub mod draft;
pub mod duel;
pub mod error;
pub mod events;
pub mod format;
pub mod leaderboard;
pub mod participant;
pub mod phase;
pub mod presenter;
pub mod rating;
pub mod registry;
pub mod runner;
pub mod settlement;
pub mod store;

pub use ballot::{Ballot, BallotClose, SubmitError, Tally};
pub use config::MatchConfig;
pub use draft::{DraftEngine, DraftState, Pick};
pub use duel::{DuelResolver, DuelResult, Gesture};
pub use error::{MatchError, MatchResult};
pub use events::{EventBus, MatchEvent, SharedEventBus};
pub use format::{DraftFormat, FormatDecision};
pub use participant::{NameCache, ParticipantId, Team, TeamSide};
pub use phase::{MatchPhase, PhaseMachine, PhaseTransition};
pub use presenter::{
    ChannelPresenter, ChoiceOption, Delivery, ObservedChoice, OpenPrompt, Presenter,
    PresenterError, PromptRequest, PromptScope, RoomHandle, RoomKind,
};
pub use rating::{RatingDelta, RatingEngine};
pub use registry::{MatchId, ParticipantRegistry, RegistryError};
pub use runner::{ForceSignal, MatchRecord, MatchRunner};
pub use settlement::{MatchOutcome, ReportVote, SettlementEngine, VoteStanding};
pub use store::{
    GameResult, MemoryStore, RatingRecord, RatingStore, SharedStore, StoreError, DEFAULT_RATING,
};
