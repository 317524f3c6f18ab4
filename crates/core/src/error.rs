//! Error types for the factiondraft domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them.

use crate::model::SessionId;
use thiserror::Error;

/// The top-level error type for all factiondraft operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Draft errors ---
    #[error("Draft error: {0}")]
    Draft(#[from] DraftError),

    // --- Lookups ---
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    // --- Caller input ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    /// Fewer factions exist than a single offer needs. Fatal: no session is created.
    #[error("faction pool too small: {available} available, at least {required} required")]
    PoolTooSmall { available: usize, required: usize },

    #[error("not enough players: got {got}, need at least {required}")]
    NotEnoughPlayers { got: usize, required: usize },

    #[error("session {0} is still in progress; finalize it first")]
    SessionInProgress(SessionId),

    #[error("no active session")]
    NoActiveSession,

    #[error("session {0} is already finalized")]
    SessionClosed(SessionId),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}
