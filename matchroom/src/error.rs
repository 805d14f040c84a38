//! Top-level match error, composing the per-module error types.

use crate::draft::DraftError;
use crate::phase::TransitionError;
use crate::presenter::PresenterError;
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Anything that can abort a match run before settlement.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("invalid pool: {0}")]
    InvalidPool(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Presenter(#[from] PresenterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Draft(#[from] DraftError),
}

pub type MatchResult<T> = Result<T, MatchError>;
