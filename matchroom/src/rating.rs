//! Elo-style rating update applied once per settled match.
//!
//! Team strength is the average member rating; each member of a team
//! receives the same expected score and the same pre-rounding delta.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::participant::{ParticipantId, Team, TeamSide};
use crate::settlement::MatchOutcome;
use crate::store::{RatingRecord, RatingStore, StoreResult};

/// One participant's rating movement from a settled match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingDelta {
    pub participant: ParticipantId,
    pub before: i64,
    pub after: i64,
    pub delta: i64,
}

/// Expected score of a team with average rating `own` against `other`.
pub(crate) fn expected_score(own: f64, other: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((other - own) / 400.0))
}

/// Applies rating updates through the persistence collaborator.
pub struct RatingEngine<S: RatingStore + ?Sized> {
    store: Arc<S>,
    k: f64,
    default_rating: i64,
}

impl<S: RatingStore + ?Sized> RatingEngine<S> {
    pub fn new(store: Arc<S>, k: f64, default_rating: i64) -> Self {
        Self {
            store,
            k,
            default_rating,
        }
    }

    /// Apply the outcome to every participant's record in one atomic
    /// batch. A void outcome is a strict no-op: no reads matter, no
    /// writes happen, zero deltas are returned.
    pub async fn apply(
        &self,
        outcome: MatchOutcome,
        team_a: &Team,
        team_b: &Team,
    ) -> StoreResult<Vec<RatingDelta>> {
        let Some(winning_side) = outcome.winning_side() else {
            info!("void outcome, ratings untouched");
            return Ok(Vec::new());
        };

        let mut records_a = self.fetch_records(team_a).await?;
        let mut records_b = self.fetch_records(team_b).await?;

        let avg_a = average_rating(&records_a);
        let avg_b = average_rating(&records_b);
        let expected_a = expected_score(avg_a, avg_b);
        let expected_b = expected_score(avg_b, avg_a);

        let a_won = winning_side == TeamSide::A;
        let delta_a = if a_won {
            self.k * (1.0 - expected_a)
        } else {
            -self.k * expected_a
        };
        let delta_b = if a_won {
            -self.k * expected_b
        } else {
            self.k * (1.0 - expected_b)
        };
        debug!(avg_a, avg_b, delta_a, delta_b, "team rating deltas computed");

        let mut deltas = Vec::with_capacity(records_a.len() + records_b.len());
        let mut batch = Vec::with_capacity(records_a.len() + records_b.len());
        for (records, delta, won) in [
            (&mut records_a, delta_a, a_won),
            (&mut records_b, delta_b, !a_won),
        ] {
            for (id, record) in records.iter_mut() {
                let before = record.rating;
                // Per-member rounding; ratings have no floor.
                let after = (before as f64 + delta).round() as i64;
                record.rating = after;
                record.record_result(won);
                deltas.push(RatingDelta {
                    participant: id.clone(),
                    before,
                    after,
                    delta: after - before,
                });
                batch.push((id.clone(), record.clone()));
            }
        }

        self.store.batch_write(&batch).await?;
        info!(outcome = %outcome, entries = deltas.len(), "ratings applied");
        Ok(deltas)
    }

    async fn fetch_records(&self, team: &Team) -> StoreResult<Vec<(ParticipantId, RatingRecord)>> {
        let mut records = Vec::with_capacity(team.len());
        for id in &team.members {
            let record = self.store.get_rating(id).await?.unwrap_or(RatingRecord {
                rating: self.default_rating,
                ..RatingRecord::default()
            });
            records.push((id.clone(), record));
        }
        Ok(records)
    }
}

fn average_rating(records: &[(ParticipantId, RatingRecord)]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|(_, r)| r.rating as f64).sum::<f64>() / records.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn teams() -> (Team, Team) {
        let mut team_a = Team::new(TeamSide::A, pid("a1"));
        let mut team_b = Team::new(TeamSide::B, pid("b1"));
        for p in ["a2", "a3", "a4"] {
            team_a.add(pid(p));
        }
        for p in ["b2", "b3", "b4"] {
            team_b.add(pid(p));
        }
        (team_a, team_b)
    }

    #[test]
    fn test_expected_score_symmetry() {
        let e = expected_score(100.0, 100.0);
        assert!((e - 0.5).abs() < 1e-9);
        let strong = expected_score(500.0, 100.0);
        let weak = expected_score(100.0, 500.0);
        assert!((strong + weak - 1.0).abs() < 1e-9);
        assert!(strong > 0.9);
    }

    #[test]
    fn test_underdog_wins_bigger_than_favourite() {
        // Underdog winning moves more points than a favourite winning.
        let k = 32.0;
        let underdog_gain = k * (1.0 - expected_score(100.0, 300.0));
        let favourite_gain = k * (1.0 - expected_score(300.0, 100.0));
        assert!(underdog_gain > favourite_gain);
    }

    #[tokio::test]
    async fn test_equal_teams_win_moves_sixteen() {
        let store = MemoryStore::new().shared();
        let engine = RatingEngine::new(Arc::clone(&store), 32.0, 100);
        let (team_a, team_b) = teams();

        let deltas = engine
            .apply(MatchOutcome::TeamAWin, &team_a, &team_b)
            .await
            .unwrap();
        assert_eq!(deltas.len(), 8);
        for delta in &deltas {
            if team_a.contains(&delta.participant) {
                assert_eq!(delta.delta, 16);
                assert_eq!(delta.after, 116);
            } else {
                assert_eq!(delta.delta, -16);
                assert_eq!(delta.after, 84);
            }
        }

        let record = store.get_rating(&pid("a1")).await.unwrap().unwrap();
        assert_eq!(record.rating, 116);
        assert_eq!(record.wins, 1);
        assert_eq!(record.streak, 1);
        let loser = store.get_rating(&pid("b3")).await.unwrap().unwrap();
        assert_eq!(loser.losses, 1);
        assert_eq!(loser.streak, -1);
    }

    #[tokio::test]
    async fn test_void_leaves_records_identical() {
        let store = MemoryStore::new().shared();
        let mut seeded = RatingRecord::default();
        seeded.rating = 250;
        store.put(pid("a1"), seeded);
        let before = store.snapshot();

        let engine = RatingEngine::new(Arc::clone(&store), 32.0, 100);
        let (team_a, team_b) = teams();
        let deltas = engine
            .apply(MatchOutcome::Void, &team_a, &team_b)
            .await
            .unwrap();
        assert!(deltas.is_empty());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_ratings_may_go_negative() {
        let store = MemoryStore::new().shared();
        for p in ["b1", "b2", "b3", "b4"] {
            let mut record = RatingRecord::default();
            record.rating = 5;
            store.put(pid(p), record);
        }
        let engine = RatingEngine::new(Arc::clone(&store), 32.0, 100);
        let (team_a, team_b) = teams();
        engine
            .apply(MatchOutcome::TeamAWin, &team_a, &team_b)
            .await
            .unwrap();
        let record = store.get_rating(&pid("b1")).await.unwrap().unwrap();
        assert!(record.rating < 5);
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let store = MemoryStore::new().shared();
        store.fail_next_write();
        let engine = RatingEngine::new(Arc::clone(&store), 32.0, 100);
        let (team_a, team_b) = teams();
        let err = engine
            .apply(MatchOutcome::TeamBWin, &team_a, &team_b)
            .await;
        assert!(err.is_err());
    }
}
