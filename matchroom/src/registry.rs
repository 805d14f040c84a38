//! Participant ownership table — at most one match may hold a participant.
//!
//! Replaces an ad hoc global "user is busy" set with an explicit lock table
//! keyed by participant id. Locks are taken when a pool forms a match and
//! released exactly once when the match settles or is force-terminated;
//! double-lock and double-unlock are hard errors rather than silent state
//! corruption.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::participant::ParticipantId;

/// Durable match sequence number.
pub type MatchId = u64;

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("participant {participant} already locked by match {held_by}")]
    AlreadyLocked {
        participant: ParticipantId,
        held_by: MatchId,
    },

    #[error("participant {participant} is not locked")]
    NotLocked { participant: ParticipantId },

    #[error("participant {participant} locked by match {held_by}, not match {requested}")]
    WrongMatch {
        participant: ParticipantId,
        held_by: MatchId,
        requested: MatchId,
    },
}

/// Shared lock table over all concurrently running matches.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    locks: Mutex<HashMap<ParticipantId, MatchId>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Lock one participant to a match.
    pub fn lock(&self, id: &ParticipantId, match_id: MatchId) -> Result<(), RegistryError> {
        let mut locks = self.guard();
        if let Some(&held_by) = locks.get(id) {
            return Err(RegistryError::AlreadyLocked {
                participant: id.clone(),
                held_by,
            });
        }
        locks.insert(id.clone(), match_id);
        debug!(participant = %id, match_id, "participant locked");
        Ok(())
    }

    /// Unlock one participant. Fails if the participant is not locked or is
    /// held by a different match.
    pub fn unlock(&self, id: &ParticipantId, match_id: MatchId) -> Result<(), RegistryError> {
        let mut locks = self.guard();
        match locks.get(id) {
            None => Err(RegistryError::NotLocked {
                participant: id.clone(),
            }),
            Some(&held_by) if held_by != match_id => Err(RegistryError::WrongMatch {
                participant: id.clone(),
                held_by,
                requested: match_id,
            }),
            Some(_) => {
                locks.remove(id);
                debug!(participant = %id, match_id, "participant unlocked");
                Ok(())
            }
        }
    }

    /// Lock a whole pool under one guard. On conflict nothing is locked.
    pub fn lock_all(
        &self,
        ids: &[ParticipantId],
        match_id: MatchId,
    ) -> Result<(), RegistryError> {
        let mut locks = self.guard();
        for id in ids {
            if let Some(&held_by) = locks.get(id) {
                return Err(RegistryError::AlreadyLocked {
                    participant: id.clone(),
                    held_by,
                });
            }
        }
        for id in ids {
            locks.insert(id.clone(), match_id);
        }
        debug!(count = ids.len(), match_id, "pool locked");
        Ok(())
    }

    /// Unlock a whole pool. Every id is attempted; the first error (if any)
    /// is returned after the sweep so a partial failure never strands locks.
    pub fn unlock_all(
        &self,
        ids: &[ParticipantId],
        match_id: MatchId,
    ) -> Result<(), RegistryError> {
        let mut first_err = None;
        for id in ids {
            if let Err(e) = self.unlock(id, match_id) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Which match currently holds a participant, if any.
    pub fn holder(&self, id: &ParticipantId) -> Option<MatchId> {
        self.guard().get(id).copied()
    }

    pub fn is_locked(&self, id: &ParticipantId) -> bool {
        self.guard().contains_key(id)
    }

    /// Number of currently locked participants.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<ParticipantId, MatchId>> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
