//! In-memory backend, useful for testing and throwaway tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use factiondraft_core::error::StoreError;
use factiondraft_core::model::{
    Faction, FactionId, Participant, ParticipantId, Player, PlayerId, Session, SessionId,
    SessionRecord,
};
use factiondraft_core::store::{DraftStore, FinalizeOutcome, HistoryEntry, HistoryKind, NewDraft};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    factions: Vec<Faction>,
    players: Vec<Player>,
    sessions: Vec<Session>,
    participants: Vec<Participant>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Sessions newest first, matching the SQL ordering.
    fn ordered_sessions(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.iter().collect();
        sessions.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        sessions
    }

    fn record(&self, session: &Session) -> SessionRecord {
        SessionRecord {
            session: session.clone(),
            participants: self
                .participants
                .iter()
                .filter(|p| p.session_id == session.id)
                .cloned()
                .collect(),
        }
    }

    fn record_by_id(&self, id: SessionId) -> Option<SessionRecord> {
        self.sessions
            .iter()
            .find(|s| s.id == id)
            .map(|s| self.record(s))
    }

    fn check_player(&self, player: PlayerId) -> Result<(), StoreError> {
        if self.players.iter().any(|p| p.id == player) {
            Ok(())
        } else {
            Err(StoreError::Storage(format!("unknown player {player}")))
        }
    }

    fn check_faction(&self, faction: FactionId) -> Result<(), StoreError> {
        if self.factions.iter().any(|f| f.id == faction) {
            Ok(())
        } else {
            Err(StoreError::Storage(format!("unknown faction {faction}")))
        }
    }
}

/// A store that keeps everything in process memory.
///
/// Every write takes the single write guard, so multi-row writes are atomic.
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DraftStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn seed_factions(&self, names: &[&str]) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let mut added = 0;
        for name in names {
            if state.factions.iter().any(|f| f.name == *name) {
                continue;
            }
            let id = FactionId(state.next_id());
            state.factions.push(Faction {
                id,
                name: name.to_string(),
            });
            added += 1;
        }
        Ok(added)
    }

    async fn factions(&self) -> Result<Vec<Faction>, StoreError> {
        let mut factions = self.state.read().await.factions.clone();
        factions.sort_by_key(|f| f.id);
        Ok(factions)
    }

    async fn faction(&self, id: FactionId) -> Result<Option<Faction>, StoreError> {
        let state = self.state.read().await;
        Ok(state.factions.iter().find(|f| f.id == id).cloned())
    }

    async fn add_player(&self, name: &str) -> Result<Option<Player>, StoreError> {
        let mut state = self.state.write().await;
        if state.players.iter().any(|p| p.name == name) {
            return Ok(None);
        }
        let player = Player {
            id: PlayerId(state.next_id()),
            name: name.to_string(),
            active: true,
        };
        state.players.push(player.clone());
        Ok(Some(player))
    }

    async fn player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        let state = self.state.read().await;
        Ok(state.players.iter().find(|p| p.id == id).cloned())
    }

    async fn active_players(&self) -> Result<Vec<Player>, StoreError> {
        let state = self.state.read().await;
        let mut players: Vec<Player> = state.players.iter().filter(|p| p.active).cloned().collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(players)
    }

    async fn recent_history(
        &self,
        player: PlayerId,
        kind: HistoryKind,
        limit: usize,
        finalized_only: bool,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.read().await;
        let entries = state
            .ordered_sessions()
            .into_iter()
            .filter(|s| !finalized_only || !s.active)
            .filter_map(|s| {
                let seat = state
                    .participants
                    .iter()
                    .find(|p| p.session_id == s.id && p.player_id == player)?;
                let faction_ids = match kind {
                    HistoryKind::Played => seat.selected.into_iter().collect(),
                    HistoryKind::Drafted => seat.offered.clone().unwrap_or_default(),
                };
                Some(HistoryEntry {
                    session_id: s.id,
                    started_at: s.started_at,
                    finalized: !s.active,
                    faction_ids,
                })
            })
            .take(limit)
            .collect();
        Ok(entries)
    }

    async fn last_finalized_session(&self) -> Result<Option<SessionRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .ordered_sessions()
            .into_iter()
            .find(|s| !s.active)
            .map(|s| state.record(s)))
    }

    async fn active_session(&self) -> Result<Option<SessionRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .ordered_sessions()
            .into_iter()
            .find(|s| s.active)
            .map(|s| state.record(s)))
    }

    async fn session(&self, id: SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.state.read().await.record_by_id(id))
    }

    async fn sessions(&self, finalized_only: bool) -> Result<Vec<SessionRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .ordered_sessions()
            .into_iter()
            .filter(|s| !finalized_only || !s.active)
            .map(|s| state.record(s))
            .collect())
    }

    async fn persist_draft(&self, draft: NewDraft) -> Result<SessionRecord, StoreError> {
        let mut state = self.state.write().await;

        if let Some(active) = state.sessions.iter().find(|s| s.active) {
            return Err(StoreError::Conflict(format!(
                "session {} is still active",
                active.id
            )));
        }
        // Validate everything before the first mutation.
        for (player, offers) in &draft.entries {
            state.check_player(*player)?;
            for faction in offers {
                state.check_faction(*faction)?;
            }
        }

        let session_id = SessionId(state.next_id());
        state.sessions.push(Session {
            id: session_id,
            started_at: draft.started_at,
            active: true,
            winner: None,
        });
        for (player, offers) in draft.entries {
            let id = ParticipantId(state.next_id());
            state.participants.push(Participant {
                id,
                session_id,
                player_id: player,
                offered: Some(offers),
                selected: None,
            });
        }

        state
            .record_by_id(session_id)
            .ok_or_else(|| StoreError::Storage(format!("session {session_id} vanished after write")))
    }

    async fn create_manual_session(
        &self,
        started_at: DateTime<Utc>,
        picks: &[(PlayerId, FactionId)],
    ) -> Result<SessionRecord, StoreError> {
        let mut state = self.state.write().await;
        for (player, faction) in picks {
            state.check_player(*player)?;
            state.check_faction(*faction)?;
        }

        let session_id = SessionId(state.next_id());
        state.sessions.push(Session {
            id: session_id,
            started_at,
            active: false,
            winner: None,
        });
        for (player, faction) in picks {
            let id = ParticipantId(state.next_id());
            state.participants.push(Participant {
                id,
                session_id,
                player_id: *player,
                offered: None,
                selected: Some(*faction),
            });
        }

        state
            .record_by_id(session_id)
            .ok_or_else(|| StoreError::Storage(format!("session {session_id} vanished after write")))
    }

    async fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        let state = self.state.read().await;
        Ok(state.participants.iter().find(|p| p.id == id).cloned())
    }

    async fn set_selection(
        &self,
        participant: ParticipantId,
        faction: FactionId,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        state.check_faction(faction)?;
        match state.participants.iter_mut().find(|p| p.id == participant) {
            Some(seat) => {
                seat.selected = Some(faction);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_winner(
        &self,
        session: SessionId,
        winner: Option<PlayerId>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.sessions.iter_mut().find(|s| s.id == session) {
            Some(s) => {
                s.winner = winner;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn finalize_session(
        &self,
        session: SessionId,
    ) -> Result<Option<FinalizeOutcome>, StoreError> {
        let mut state = self.state.write().await;
        if !state.sessions.iter().any(|s| s.id == session) {
            return Ok(None);
        }

        let before = state.participants.len();
        state
            .participants
            .retain(|p| p.session_id != session || p.selected.is_some());
        let pruned = before - state.participants.len();

        let kept: Vec<PlayerId> = state
            .participants
            .iter()
            .filter(|p| p.session_id == session)
            .map(|p| p.player_id)
            .collect();

        if kept.is_empty() {
            state.sessions.retain(|s| s.id != session);
            return Ok(Some(FinalizeOutcome::Discarded { session, pruned }));
        }

        if let Some(s) = state.sessions.iter_mut().find(|s| s.id == session) {
            s.active = false;
            if s.winner.is_some_and(|w| !kept.contains(&w)) {
                s.winner = None;
            }
        }

        Ok(Some(FinalizeOutcome::Finalized {
            session,
            kept: kept.len(),
            pruned,
        }))
    }

    async fn delete_session(&self, session: SessionId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != session);
        if state.sessions.len() == before {
            return Ok(false);
        }
        state.participants.retain(|p| p.session_id != session);
        Ok(true)
    }
}
