//! Participant identities, display names, and team rosters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::presenter::Presenter;

/// Opaque identity handle for a pool member.
///
/// The transport decides what the string is (the original deployment used
/// chat-platform snowflakes); the engine never inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which of the two rosters a participant ends up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    A,
    B,
}

impl TeamSide {
    pub fn other(self) -> TeamSide {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl std::fmt::Display for TeamSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "team_a"),
            Self::B => write!(f, "team_b"),
        }
    }
}

/// A team roster. The captain is seeded as the first member before drafting
/// starts and the roster only grows from there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub side: TeamSide,
    pub captain: ParticipantId,
    pub members: Vec<ParticipantId>,
}

impl Team {
    pub fn new(side: TeamSide, captain: ParticipantId) -> Self {
        Self {
            side,
            captain: captain.clone(),
            members: vec![captain],
        }
    }

    pub fn add(&mut self, participant: ParticipantId) {
        self.members.push(participant);
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.members.contains(participant)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sum of the given ratings over the roster; missing entries count as 0.
    pub fn total_rating(&self, ratings: &HashMap<ParticipantId, i64>) -> i64 {
        self.members
            .iter()
            .map(|m| ratings.get(m).copied().unwrap_or(0))
            .sum()
    }
}

/// Cache of resolved display names.
///
/// Names are resolved through the presenter once per match and reused for
/// every prompt label afterwards (the original kept a process-wide name
/// cache so buttons rendered without transport round-trips).
#[derive(Debug, Default)]
pub struct NameCache {
    names: HashMap<ParticipantId, String>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ParticipantId, name: String) {
        self.names.insert(id, name);
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Display label for a participant, falling back to the raw id when the
    /// name was never resolved.
    pub fn label_for(&self, id: &ParticipantId) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Resolve and cache names for every id not already cached. Lookup
    /// failures fall back to the raw id, matching the original behavior.
    pub async fn resolve_all<P: Presenter + ?Sized>(
        &mut self,
        presenter: &P,
        ids: &[ParticipantId],
    ) {
        for id in ids {
            if self.names.contains_key(id) {
                continue;
            }
            let name = match presenter.display_name(id).await {
                Ok(name) => name,
                Err(_) => id.to_string(),
            };
            self.names.insert(id.clone(), name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    #[test]
    fn test_team_seeds_captain_first() {
        let mut team = Team::new(TeamSide::A, pid("cap"));
        team.add(pid("p1"));
        team.add(pid("p2"));
        assert_eq!(team.members[0], pid("cap"));
        assert_eq!(team.len(), 3);
        assert!(team.contains(&pid("p1")));
        assert!(!team.contains(&pid("p9")));
    }

    #[test]
    fn test_team_total_rating_missing_counts_zero() {
        let mut team = Team::new(TeamSide::B, pid("cap"));
        team.add(pid("p1"));
        let mut ratings = HashMap::new();
        ratings.insert(pid("cap"), 120);
        assert_eq!(team.total_rating(&ratings), 120);
    }

    #[test]
    fn test_side_other() {
        assert_eq!(TeamSide::A.other(), TeamSide::B);
        assert_eq!(TeamSide::B.other(), TeamSide::A);
        assert_eq!(TeamSide::A.to_string(), "team_a");
        assert_eq!(TeamSide::B.to_string(), "team_b");
    }

    #[test]
    fn test_name_cache_label_fallback() {
        let mut cache = NameCache::new();
        cache.insert(pid("1001"), "Ava".to_string());
        assert_eq!(cache.label_for(&pid("1001")), "Ava");
        assert_eq!(cache.label_for(&pid("2002")), "2002");
        assert_eq!(cache.get(&pid("1001")), Some("Ava"));
        assert_eq!(cache.get(&pid("2002")), None);
    }

    #[test]
    fn test_participant_id_serde_transparent() {
        let id = pid("314159");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"314159\"");
        let back: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
