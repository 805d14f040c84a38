//! Read-only leaderboard rendering over the store.

use crate::store::{RatingStore, StoreResult};

/// Top-`limit` leaderboard, one formatted line per entry:
/// `"{rank}. {name} — {rating} ({wins}-{losses})"`.
pub async fn leaderboard_lines<S: RatingStore + ?Sized>(
    store: &S,
    limit: usize,
) -> StoreResult<Vec<String>> {
    let top = store.top_ratings(limit).await?;
    Ok(top
        .iter()
        .enumerate()
        .map(|(i, (id, record))| {
            format!(
                "{}. {} — {} ({})",
                i + 1,
                id,
                record.rating,
                record.win_loss()
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::ParticipantId;
    use crate::store::{MemoryStore, RatingRecord};

    #[tokio::test]
    async fn test_lines_ranked_and_formatted() {
        let store = MemoryStore::new();
        for (id, rating, wins, losses) in [("ava", 140, 7, 3), ("bo", 90, 2, 8), ("cy", 180, 12, 1)] {
            let mut record = RatingRecord::default();
            record.rating = rating;
            record.wins = wins;
            record.losses = losses;
            store.put(ParticipantId::new(id), record);
        }

        let lines = leaderboard_lines(&store, 2).await.unwrap();
        assert_eq!(lines, vec![
            "1. cy — 180 (12-1)".to_string(),
            "2. ava — 140 (7-3)".to_string(),
        ]);
    }

    #[tokio::test]
    async fn test_empty_store_yields_no_lines() {
        let store = MemoryStore::new();
        assert!(leaderboard_lines(&store, 10).await.unwrap().is_empty());
    }
}
