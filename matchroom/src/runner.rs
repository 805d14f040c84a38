//! The match runner — drives one pool of eight through every phase,
//! from captain vote to archive, racing the whole run against the
//! force-terminate signal.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::captain;
use crate::config::MatchConfig;
use crate::draft::{DraftEngine, DraftState, Pick};
use crate::duel::DuelResolver;
use crate::error::{MatchError, MatchResult};
use crate::events::{MatchEvent, SharedEventBus};
use crate::format::{self, DraftFormat, FormatDecision};
use crate::participant::{NameCache, ParticipantId, Team, TeamSide};
use crate::phase::{MatchPhase, PhaseMachine, PhaseTransition};
use crate::presenter::{ChoiceOption, Presenter, PromptRequest, PromptScope, RoomHandle, RoomKind};
use crate::rating::{RatingDelta, RatingEngine};
use crate::registry::{MatchId, ParticipantRegistry, RegistryError};
use crate::settlement::{self, MatchOutcome, ReportVote, SettlementEngine};
use crate::store::RatingStore;

/// External force-terminate handle. Cloneable; firing it settles the
/// match as void from wherever it currently is. Firing before the match
/// reaches a race point still takes effect (the permit persists), and
/// firing after settlement is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ForceSignal {
    inner: Arc<Notify>,
}

impl ForceSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminate(&self) {
        self.inner.notify_one();
    }

    pub async fn triggered(&self) {
        self.inner.notified().await;
    }
}

/// Everything observable about a finished match.
///
/// Team and draft fields are `None`/empty when a force-terminate cut the
/// match short before the draft completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub participants: Vec<ParticipantId>,
    pub format: Option<DraftFormat>,
    pub team_a: Option<Team>,
    pub team_b: Option<Team>,
    pub picks: Vec<Pick>,
    pub outcome: MatchOutcome,
    pub forced: bool,
    pub rating_deltas: Vec<RatingDelta>,
    pub created_at: DateTime<Utc>,
    pub settled_at: DateTime<Utc>,
    pub transitions: Vec<PhaseTransition>,
}

/// Orchestrates one match at a time over shared collaborators.
pub struct MatchRunner<P, S: ?Sized> {
    presenter: Arc<P>,
    store: Arc<S>,
    registry: Arc<ParticipantRegistry>,
    events: SharedEventBus,
    config: MatchConfig,
}

impl<P: Presenter, S: RatingStore + ?Sized> MatchRunner<P, S> {
    pub fn new(
        presenter: Arc<P>,
        store: Arc<S>,
        registry: Arc<ParticipantRegistry>,
        events: SharedEventBus,
        config: MatchConfig,
    ) -> Self {
        Self {
            presenter,
            store,
            registry,
            events,
            config,
        }
    }

    /// Entry point for a filled pool. Validates the pool, allocates the
    /// durable match number, locks every participant, and runs the match.
    /// Locks are released the moment the match settles (or is force-voided),
    /// not after the archive grace, so participants can queue again while
    /// rooms are still being torn down.
    pub async fn run(
        &self,
        pool: Vec<ParticipantId>,
        force: ForceSignal,
    ) -> MatchResult<MatchRecord> {
        validate_pool(&pool)?;
        let match_id = self.store.next_match_sequence().await?;
        self.registry.lock_all(&pool, match_id)?;
        info!(match_id, "match starting");

        let result = self.run_locked(match_id, &pool, force).await;
        if result.is_err() {
            // An error can land on either side of the settlement release,
            // so a lock that is already gone is not a failure here.
            match self.registry.unlock_all(&pool, match_id) {
                Ok(()) | Err(RegistryError::NotLocked { .. }) => {}
                Err(err) => error!(match_id, %err, "failed to release participant locks"),
            }
        }
        result
    }

    /// Release the pool's locks at settlement.
    fn release(&self, match_id: MatchId, pool: &[ParticipantId]) {
        if let Err(err) = self.registry.unlock_all(pool, match_id) {
            error!(match_id, %err, "failed to release participant locks");
        }
    }

    async fn run_locked(
        &self,
        match_id: MatchId,
        pool: &[ParticipantId],
        force: ForceSignal,
    ) -> MatchResult<MatchRecord> {
        let created_at = Utc::now();
        let mut names = NameCache::new();
        names.resolve_all(self.presenter.as_ref(), pool).await;
        let ratings = self.prefetch_ratings(pool).await;

        let room = self
            .presenter
            .create_room(RoomKind::Match, &format!("match-{}", match_id), pool)
            .await?;
        self.events.publish(MatchEvent::MatchCreated {
            match_id,
            participants: pool.to_vec(),
            timestamp: Utc::now(),
        });
        self.presenter
            .announce(&room, &format!("Match #{} — vote for your captains!", match_id))
            .await?;

        let mut machine = PhaseMachine::new();
        let duels = DuelResolver::new(Arc::clone(&self.presenter), self.config.duel_window());

        // The whole pre-settlement pipeline races the force signal.
        let staged = {
            let pipeline = self.pipeline(match_id, &room, pool, &names, &duels, &mut machine);
            tokio::select! {
                staged = pipeline => Some(staged?),
                _ = force.triggered() => None,
            }
        };

        let Some((state, decision)) = staged else {
            info!(match_id, "force-terminated before settlement");
            machine.advance(MatchPhase::Settled, "force-terminated")?;
            self.events.publish(MatchEvent::MatchSettled {
                match_id,
                outcome: MatchOutcome::Void,
                forced: true,
                timestamp: Utc::now(),
            });
            self.release(match_id, pool);
            self.presenter
                .announce(&room, "Match terminated — voided, ratings unchanged.")
                .await?;
            let settled_at = Utc::now();
            self.archive(match_id, &mut machine, &[room]).await?;
            return Ok(MatchRecord {
                match_id,
                participants: pool.to_vec(),
                format: None,
                team_a: None,
                team_b: None,
                picks: Vec::new(),
                outcome: MatchOutcome::Void,
                forced: true,
                rating_deltas: Vec::new(),
                created_at,
                settled_at,
                transitions: machine.history().to_vec(),
            });
        };

        let picks = state.picks().to_vec();
        let (team_a, team_b) = state.into_teams();

        let room_a = self
            .presenter
            .create_room(
                RoomKind::TeamVoice,
                &format!("match-{}-team-a", match_id),
                &team_a.members,
            )
            .await?;
        let room_b = self
            .presenter
            .create_room(
                RoomKind::TeamVoice,
                &format!("match-{}-team-b", match_id),
                &team_b.members,
            )
            .await?;
        self.announce_summary(&room, &names, &ratings, &team_a, &team_b)
            .await?;

        let (outcome, forced) = self
            .settle(match_id, &room, &[(&team_a, &room_a), (&team_b, &room_b)], &force)
            .await?;
        machine.advance(MatchPhase::Settled, if forced { "force-terminated" } else { "reported" })?;
        self.events.publish(MatchEvent::MatchSettled {
            match_id,
            outcome,
            forced,
            timestamp: Utc::now(),
        });
        let settled_at = Utc::now();
        self.release(match_id, pool);

        let rating_deltas = self
            .apply_ratings(match_id, outcome, &team_a, &team_b, &names, &room)
            .await?;

        self.archive(match_id, &mut machine, &[room, room_a, room_b])
            .await?;

        Ok(MatchRecord {
            match_id,
            participants: pool.to_vec(),
            format: Some(decision.format),
            team_a: Some(team_a),
            team_b: Some(team_b),
            picks,
            outcome,
            forced,
            rating_deltas,
            created_at,
            settled_at,
            transitions: machine.history().to_vec(),
        })
    }

    /// Captain vote → pick-order duel → format vote → draft.
    async fn pipeline(
        &self,
        match_id: MatchId,
        room: &RoomHandle,
        pool: &[ParticipantId],
        names: &NameCache,
        duels: &DuelResolver<P>,
        machine: &mut PhaseMachine,
    ) -> MatchResult<(DraftState, FormatDecision)> {
        let (first, second) = captain::select_captains(
            &self.presenter,
            room,
            pool,
            names,
            self.config.captain_vote_window(),
        )
        .await?;
        self.events.publish(MatchEvent::CaptainsSelected {
            match_id,
            first: first.clone(),
            second: second.clone(),
            timestamp: Utc::now(),
        });

        machine.advance(MatchPhase::PickOrder, "captains selected")?;
        let order = duels.run(room, &first, &second, "first pick").await?;
        let captain_a = order.winner.clone();
        let captain_b = order.loser.clone();
        self.events.publish(MatchEvent::PickOrderDecided {
            match_id,
            first_pick: captain_a.clone(),
            timestamp: Utc::now(),
        });

        machine.advance(MatchPhase::FormatVote, "pick order decided")?;
        let decision = format::select_format(
            &self.presenter,
            duels,
            room,
            &captain_a,
            &captain_b,
            self.config.format_vote_window(),
        )
        .await?;
        self.events.publish(MatchEvent::FormatChosen {
            match_id,
            format: decision.format,
            by_duel: decision.by_duel,
            timestamp: Utc::now(),
        });

        machine.advance(MatchPhase::Drafting, "format chosen")?;
        let mut state = DraftState::new(decision.format, captain_a, captain_b, pool);
        let engine = DraftEngine::new(
            Arc::clone(&self.presenter),
            Arc::clone(&self.events),
            self.config.draft_turn_window(),
        );
        engine.run(match_id, room, &mut state, names).await?;

        machine.advance(MatchPhase::AwaitingReport, "draft complete")?;
        Ok((state, decision))
    }

    /// Collect settlement votes while (concurrently) moving participants
    /// into their team rooms after the countdown. Settlement has no
    /// deadline; only a report, a void quorum, or the force signal ends it.
    async fn settle(
        &self,
        match_id: MatchId,
        room: &RoomHandle,
        teams: &[(&Team, &RoomHandle)],
        force: &ForceSignal,
    ) -> MatchResult<(MatchOutcome, bool)> {
        let options = [
            ReportVote::Win(TeamSide::A),
            ReportVote::Win(TeamSide::B),
            ReportVote::Void,
        ]
        .iter()
        .map(|v| ChoiceOption::new(v.option_id(), v.label()))
        .collect();
        // The prompt stays open until settlement; the window is advisory
        // for the transport only.
        let request = PromptRequest::new(
            PromptScope::Room(room.clone()),
            "result report",
            options,
            self.config.move_countdown() + std::time::Duration::from_secs(24 * 60 * 60),
        );
        self.presenter
            .announce(room, "Report the result when the match is over.")
            .await?;
        let mut rx = self.presenter.prompt(request).await?;

        let (team_a, _) = teams[0];
        let (team_b, _) = teams[1];
        let mut engine = SettlementEngine::new(
            team_a.clone(),
            team_b.clone(),
            self.config.win_report_quorum,
            self.config.void_quorum,
        );

        let mover = self.mover(teams);
        let presenter = Arc::clone(&self.presenter);
        let outcome = {
            let collecting = settlement::collect(
                &mut engine,
                &mut rx,
                &self.events,
                match_id,
                |voter, err| {
                    let presenter = Arc::clone(&presenter);
                    async move {
                        let _ = presenter.notify(&voter, &err.to_string()).await;
                    }
                },
            );
            tokio::select! {
                outcome = collecting => Some(outcome),
                _ = force.triggered() => None,
                _ = mover => unreachable!(),
            }
        };

        match outcome {
            Some(outcome) => Ok((outcome, false)),
            None => {
                engine.force_void();
                Ok((MatchOutcome::Void, true))
            }
        }
    }

    /// After the countdown, move every team member into their voice room.
    /// A failed move (participant not movable) falls back to a private
    /// notification. Never completes; meant to lose the settlement race.
    async fn mover(&self, teams: &[(&Team, &RoomHandle)]) {
        sleep(self.config.move_countdown()).await;
        for (team, room) in teams {
            for member in &team.members {
                if let Err(err) = self.presenter.move_participant(member, room).await {
                    warn!(participant = %member, %err, "move failed, notifying instead");
                    let _ = self
                        .presenter
                        .notify(member, &format!("Couldn't move you — join {} manually.", room))
                        .await;
                }
            }
        }
        std::future::pending::<()>().await
    }

    async fn apply_ratings(
        &self,
        match_id: MatchId,
        outcome: MatchOutcome,
        team_a: &Team,
        team_b: &Team,
        names: &NameCache,
        room: &RoomHandle,
    ) -> MatchResult<Vec<RatingDelta>> {
        let engine = RatingEngine::new(
            Arc::clone(&self.store),
            self.config.k_factor,
            self.config.default_rating,
        );
        let deltas = match engine.apply(outcome, team_a, team_b).await {
            Ok(deltas) => deltas,
            Err(err) => {
                // Settlement stands; the write is not retried.
                error!(match_id, %err, "rating batch write failed");
                self.events.publish(MatchEvent::PersistenceFailure {
                    match_id,
                    detail: err.to_string(),
                    timestamp: Utc::now(),
                });
                self.presenter
                    .announce(room, "Result recorded, but rating updates could not be saved.")
                    .await?;
                return Ok(Vec::new());
            }
        };

        if deltas.is_empty() {
            self.presenter
                .announce(room, "Match voided — ratings unchanged.")
                .await?;
            return Ok(deltas);
        }

        self.events.publish(MatchEvent::RatingsApplied {
            match_id,
            deltas: deltas.clone(),
            timestamp: Utc::now(),
        });
        if let Some(side) = outcome.winning_side() {
            let winners = if side == TeamSide::A { team_a } else { team_b };
            let line = winners
                .members
                .iter()
                .map(|m| names.label_for(m))
                .collect::<Vec<_>>()
                .join(", ");
            self.presenter
                .announce(room, &format!("{} wins! GGs: {}", side, line))
                .await?;
        }
        for delta in &deltas {
            let _ = self
                .presenter
                .notify(
                    &delta.participant,
                    &format!(
                        "Rating update: {} → {} ({:+})",
                        delta.before, delta.after, delta.delta
                    ),
                )
                .await;
        }
        Ok(deltas)
    }

    /// Grace period, then room teardown and the terminal transition.
    async fn archive(
        &self,
        match_id: MatchId,
        machine: &mut PhaseMachine,
        rooms: &[RoomHandle],
    ) -> MatchResult<()> {
        sleep(self.config.archive_grace()).await;
        for room in rooms {
            if let Err(err) = self.presenter.delete_room(room).await {
                warn!(match_id, room = %room, %err, "room teardown failed");
            }
        }
        machine.advance(MatchPhase::Archived, "rooms torn down")?;
        self.events.publish(MatchEvent::MatchArchived {
            match_id,
            timestamp: Utc::now(),
        });
        info!(match_id, "match archived");
        Ok(())
    }

    async fn prefetch_ratings(&self, pool: &[ParticipantId]) -> HashMap<ParticipantId, i64> {
        let mut ratings = HashMap::with_capacity(pool.len());
        for id in pool {
            let rating = match self.store.get_rating(id).await {
                Ok(Some(record)) => record.rating,
                Ok(None) => self.config.default_rating,
                Err(err) => {
                    warn!(participant = %id, %err, "rating prefetch failed, using default");
                    self.config.default_rating
                }
            };
            ratings.insert(id.clone(), rating);
        }
        ratings
    }

    async fn announce_summary(
        &self,
        room: &RoomHandle,
        names: &NameCache,
        ratings: &HashMap<ParticipantId, i64>,
        team_a: &Team,
        team_b: &Team,
    ) -> MatchResult<()> {
        let roster = |team: &Team| {
            team.members
                .iter()
                .map(|m| names.label_for(m))
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.presenter
            .announce(
                room,
                &format!(
                    "Draft complete! Team A ({}): {} vs Team B ({}): {}",
                    team_a.total_rating(ratings),
                    roster(team_a),
                    team_b.total_rating(ratings),
                    roster(team_b)
                ),
            )
            .await?;
        Ok(())
    }
}

fn validate_pool(pool: &[ParticipantId]) -> MatchResult<()> {
    if pool.len() != 8 {
        return Err(MatchError::InvalidPool(format!(
            "expected 8 participants, got {}",
            pool.len()
        )));
    }
    let mut seen = HashSet::new();
    for id in pool {
        if !seen.insert(id) {
            return Err(MatchError::InvalidPool(format!(
                "duplicate participant {}",
                id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::presenter::ChannelPresenter;
    use crate::store::MemoryStore;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn pool8() -> Vec<ParticipantId> {
        (1..=8).map(|i| pid(&format!("p{}", i))).collect()
    }

    fn runner(
        presenter: Arc<ChannelPresenter>,
        store: Arc<MemoryStore>,
        registry: Arc<ParticipantRegistry>,
    ) -> MatchRunner<ChannelPresenter, MemoryStore> {
        MatchRunner::new(
            presenter,
            store,
            registry,
            Arc::new(EventBus::new()),
            MatchConfig::default(),
        )
    }

    #[test]
    fn test_validate_pool() {
        validate_pool(&pool8()).unwrap();

        let err = validate_pool(&pool8()[..7]).unwrap_err();
        assert!(err.to_string().contains("expected 8"));

        let mut dupes = pool8();
        dupes[7] = pid("p1");
        let err = validate_pool(&dupes).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[tokio::test]
    async fn test_run_rejects_bad_pool_without_locking() {
        let (presenter, _prompts) = ChannelPresenter::new(8);
        let registry = ParticipantRegistry::new().shared();
        let runner = runner(
            Arc::new(presenter),
            MemoryStore::new().shared(),
            Arc::clone(&registry),
        );

        let err = runner
            .run(pool8()[..3].to_vec(), ForceSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidPool(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_run_rejects_already_locked_participant() {
        let (presenter, _prompts) = ChannelPresenter::new(8);
        let registry = ParticipantRegistry::new().shared();
        registry.lock(&pid("p4"), 99).unwrap();
        let runner = runner(
            Arc::new(presenter),
            MemoryStore::new().shared(),
            Arc::clone(&registry),
        );

        let err = runner.run(pool8(), ForceSignal::new()).await.unwrap_err();
        assert!(matches!(err, MatchError::Registry(_)));
        // Only the pre-existing lock remains.
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.holder(&pid("p4")), Some(99));
    }

    #[tokio::test]
    async fn test_force_signal_permit_persists() {
        let force = ForceSignal::new();
        force.terminate();
        // Fired before anyone waited; the wait must still resolve.
        force.triggered().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_before_captains_voids_and_unlocks() {
        let (presenter, mut prompts) = ChannelPresenter::new(8);
        let presenter = Arc::new(presenter);
        let store = MemoryStore::new().shared();
        let registry = ParticipantRegistry::new().shared();
        let runner = Arc::new(runner(
            Arc::clone(&presenter),
            Arc::clone(&store),
            Arc::clone(&registry),
        ));

        let force = ForceSignal::new();
        let run = tokio::spawn({
            let runner = Arc::clone(&runner);
            let force = force.clone();
            async move { runner.run(pool8(), force).await.unwrap() }
        });

        // Wait until the captain-vote prompt is open, then pull the plug.
        let open = prompts.recv().await.unwrap();
        assert_eq!(open.request.purpose, "captain vote");
        force.terminate();

        let record = run.await.unwrap();
        assert_eq!(record.outcome, MatchOutcome::Void);
        assert!(record.forced);
        assert!(record.team_a.is_none());
        assert!(record.picks.is_empty());
        assert!(record.rating_deltas.is_empty());
        assert!(registry.is_empty());
        // Void run leaves the store untouched.
        assert!(store.snapshot().is_empty());
        // Settled then archived.
        let phases: Vec<_> = record.transitions.iter().map(|t| t.to).collect();
        assert_eq!(phases, vec![MatchPhase::Settled, MatchPhase::Archived]);
    }
}
