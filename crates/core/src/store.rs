//! Storage trait: everything the draft reads from and writes to persistence.
//!
//! The draft core consumes the faction pool, per-player history and the most
//! recently finalized session, and hands back one [`NewDraft`] to persist.
//! The remaining methods are the session lifecycle around it.

use crate::error::StoreError;
use crate::model::{
    Faction, FactionId, Participant, ParticipantId, Player, PlayerId, SessionId, SessionRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a participant's history to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// The faction the player selected (zero or one id per session).
    Played,
    /// The factions the player was offered (empty for manual games).
    Drafted,
}

/// One session from a player's history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub finalized: bool,
    pub faction_ids: Vec<FactionId>,
}

/// A freshly allocated draft, persisted as one active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDraft {
    pub started_at: DateTime<Utc>,
    /// Offered factions per player, in draw order.
    pub entries: Vec<(PlayerId, Vec<FactionId>)>,
}

/// Result of closing the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// At least one participant picked; the rest were pruned.
    Finalized {
        session: SessionId,
        kept: usize,
        pruned: usize,
    },
    /// Nobody picked; the session was deleted.
    Discarded { session: SessionId, pruned: usize },
}

/// The core storage trait.
///
/// Implementations: SQLite (sqlx) and in-memory (for testing).
/// Multi-row writes ([`persist_draft`](Self::persist_draft),
/// [`create_manual_session`](Self::create_manual_session),
/// [`finalize_session`](Self::finalize_session),
/// [`delete_session`](Self::delete_session)) are all-or-nothing.
///
/// Sessions are ordered by `started_at` descending, then id descending.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Insert every name not yet present. Returns how many were added.
    async fn seed_factions(&self, names: &[&str]) -> Result<usize, StoreError>;

    /// The full faction pool, ordered by id.
    async fn factions(&self) -> Result<Vec<Faction>, StoreError>;

    async fn faction(&self, id: FactionId) -> Result<Option<Faction>, StoreError>;

    /// Register a player. Returns `None` if the name is taken.
    async fn add_player(&self, name: &str) -> Result<Option<Player>, StoreError>;

    async fn player(&self, id: PlayerId) -> Result<Option<Player>, StoreError>;

    /// Active players, ordered by name.
    async fn active_players(&self) -> Result<Vec<Player>, StoreError>;

    /// The player's `limit` most recent sessions, optionally finalized only.
    async fn recent_history(
        &self,
        player: PlayerId,
        kind: HistoryKind,
        limit: usize,
        finalized_only: bool,
    ) -> Result<Vec<HistoryEntry>, StoreError>;

    async fn last_finalized_session(&self) -> Result<Option<SessionRecord>, StoreError>;

    /// The session still being drafted, if any. At most one exists.
    async fn active_session(&self) -> Result<Option<SessionRecord>, StoreError>;

    async fn session(&self, id: SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// All sessions, newest first.
    async fn sessions(&self, finalized_only: bool) -> Result<Vec<SessionRecord>, StoreError>;

    /// Create an active session and its participants in one transaction.
    ///
    /// Fails with [`StoreError::Conflict`] if another session is active.
    async fn persist_draft(&self, draft: NewDraft) -> Result<SessionRecord, StoreError>;

    /// Create an already finalized session with no offers.
    async fn create_manual_session(
        &self,
        started_at: DateTime<Utc>,
        picks: &[(PlayerId, FactionId)],
    ) -> Result<SessionRecord, StoreError>;

    async fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError>;

    /// Returns `false` if the participant does not exist.
    async fn set_selection(
        &self,
        participant: ParticipantId,
        faction: FactionId,
    ) -> Result<bool, StoreError>;

    /// Returns `false` if the session does not exist.
    async fn set_winner(
        &self,
        session: SessionId,
        winner: Option<PlayerId>,
    ) -> Result<bool, StoreError>;

    /// Prune unpicked participants and close the session, or delete it when
    /// nobody picked. Clears a winner whose seat was pruned.
    /// Returns `None` if the session does not exist.
    async fn finalize_session(
        &self,
        session: SessionId,
    ) -> Result<Option<FinalizeOutcome>, StoreError>;

    /// Delete a session with its participants. Returns `false` if unknown.
    async fn delete_session(&self, session: SessionId) -> Result<bool, StoreError>;
}
