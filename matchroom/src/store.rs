//! Persistence collaborator seam — rating records and the durable match
//! counter.
//!
//! Records are owned by the store; the rating engine reads, mutates, and
//! writes them back in one atomic batch at settlement. `MemoryStore` is the
//! in-process implementation used by tests and simple embeddings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;

/// Rating assigned to participants with no stored record.
pub const DEFAULT_RATING: i64 = 100;

/// Depth of the most-recent-results buffer.
pub const LAST_TEN_DEPTH: usize = 10;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("write rejected: {0}")]
    WriteRejected(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One W/L entry in the last-10 buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Win,
    Loss,
}

impl GameResult {
    pub fn letter(self) -> char {
        match self {
            Self::Win => 'W',
            Self::Loss => 'L',
        }
    }
}

/// A participant's persistent rating record.
///
/// `streak` is a signed run: sign is the current direction, magnitude the
/// run length. `last10` is most-recent-first, at most [`LAST_TEN_DEPTH`]
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub rating: i64,
    pub wins: u32,
    pub losses: u32,
    pub streak: i64,
    pub last10: Vec<GameResult>,
}

impl Default for RatingRecord {
    fn default() -> Self {
        Self {
            rating: DEFAULT_RATING,
            wins: 0,
            losses: 0,
            streak: 0,
            last10: Vec::new(),
        }
    }
}

impl RatingRecord {
    /// Fold one decisive result into counters, streak, and the last-10
    /// buffer. Does not touch `rating`; the rating engine owns that.
    pub fn record_result(&mut self, won: bool) {
        self.streak = if won {
            if self.streak > 0 {
                self.streak + 1
            } else {
                1
            }
        } else if self.streak < 0 {
            self.streak - 1
        } else {
            -1
        };
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.last10.insert(
            0,
            if won { GameResult::Win } else { GameResult::Loss },
        );
        self.last10.truncate(LAST_TEN_DEPTH);
    }

    /// "wins-losses" record string, e.g. "24-10".
    pub fn win_loss(&self) -> String {
        format!("{}-{}", self.wins, self.losses)
    }
}

/// Persistence collaborator.
#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Fetch a record; `None` when the participant has never been rated.
    async fn get_rating(&self, id: &ParticipantId) -> StoreResult<Option<RatingRecord>>;

    /// Write every record in the batch atomically — all or nothing, so one
    /// match never leaves a team half-updated.
    async fn batch_write(&self, records: &[(ParticipantId, RatingRecord)]) -> StoreResult<()>;

    /// Durable, monotonically increasing match counter. Values survive
    /// restarts and are never reused.
    async fn next_match_sequence(&self) -> StoreResult<u64>;

    /// Top `limit` records by rating, descending.
    async fn top_ratings(&self, limit: usize) -> StoreResult<Vec<(ParticipantId, RatingRecord)>>;
}

/// Shared reference to a rating store.
pub type SharedStore = Arc<dyn RatingStore>;

/// In-memory store for tests and simple embeddings.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<ParticipantId, RatingRecord>>,
    counter: AtomicU64,
    fail_next_write: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Pre-load a record, e.g. to seed ratings in tests.
    pub fn put(&self, id: ParticipantId, record: RatingRecord) {
        lock_clean(&self.records).insert(id, record);
    }

    /// Make the next `batch_write` fail, exercising the
    /// persistence-failure path.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Full snapshot of stored records.
    pub fn snapshot(&self) -> HashMap<ParticipantId, RatingRecord> {
        lock_clean(&self.records).clone()
    }
}

fn lock_clean<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RatingStore for MemoryStore {
    async fn get_rating(&self, id: &ParticipantId) -> StoreResult<Option<RatingRecord>> {
        Ok(lock_clean(&self.records).get(id).cloned())
    }

    async fn batch_write(&self, records: &[(ParticipantId, RatingRecord)]) -> StoreResult<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated write failure".to_string()));
        }
        let mut guard = lock_clean(&self.records);
        for (id, record) in records {
            guard.insert(id.clone(), record.clone());
        }
        Ok(())
    }

    async fn next_match_sequence(&self) -> StoreResult<u64> {
        Ok(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn top_ratings(&self, limit: usize) -> StoreResult<Vec<(ParticipantId, RatingRecord)>> {
        let mut all: Vec<(ParticipantId, RatingRecord)> = lock_clean(&self.records)
            .iter()
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        all.sort_by(|a, b| b.1.rating.cmp(&a.1.rating).then_with(|| a.0.cmp(&b.0)));
        all.truncate(limit);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    #[test]
    fn test_record_result_streak_and_last10() {
        let mut record = RatingRecord::default();
        record.record_result(true);
        record.record_result(true);
        assert_eq!(record.streak, 2);
        assert_eq!(record.wins, 2);

        record.record_result(false);
        assert_eq!(record.streak, -1);
        assert_eq!(record.losses, 1);
        assert_eq!(record.last10[0], GameResult::Loss);
        assert_eq!(record.last10.len(), 3);

        for _ in 0..12 {
            record.record_result(true);
        }
        assert_eq!(record.last10.len(), LAST_TEN_DEPTH);
        assert_eq!(record.streak, 12);
        assert_eq!(record.win_loss(), "14-1");
    }

    #[test]
    fn test_default_record() {
        let record = RatingRecord::default();
        assert_eq!(record.rating, DEFAULT_RATING);
        assert_eq!(record.streak, 0);
        assert!(record.last10.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get_rating(&pid("p1")).await.unwrap().is_none());

        let mut record = RatingRecord::default();
        record.rating = 150;
        store
            .batch_write(&[(pid("p1"), record.clone())])
            .await
            .unwrap();
        assert_eq!(store.get_rating(&pid("p1")).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_sequence_monotonic() {
        let store = MemoryStore::new();
        let a = store.next_match_sequence().await.unwrap();
        let b = store.next_match_sequence().await.unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_records_untouched() {
        let store = MemoryStore::new();
        store.put(pid("p1"), RatingRecord::default());
        store.fail_next_write();

        let mut changed = RatingRecord::default();
        changed.rating = 999;
        let err = store.batch_write(&[(pid("p1"), changed)]).await;
        assert!(err.is_err());
        assert_eq!(
            store.get_rating(&pid("p1")).await.unwrap().unwrap().rating,
            DEFAULT_RATING
        );

        // Only the next write fails.
        store
            .batch_write(&[(pid("p1"), RatingRecord::default())])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_top_ratings_ordering() {
        let store = MemoryStore::new();
        for (id, rating) in [("a", 90), ("b", 120), ("c", 105)] {
            let mut record = RatingRecord::default();
            record.rating = rating;
            store.put(pid(id), record);
        }
        let top = store.top_ratings(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, pid("b"));
        assert_eq!(top[1].0, pid("c"));
    }
}
