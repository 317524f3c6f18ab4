//! Session lifecycle over an injected [`DraftStore`].
//!
//! A draft is prepared (validation, stale cleanup, ban sets), allocated
//! synchronously, then committed in one store transaction. Picks, winner
//! toggling, finalization and manual games go through here too.

use crate::allocator::{AllocationReport, BanTier, PlayerBans, PlayerPick, allocate};
use crate::history::HistoryFilter;
use chrono::{DateTime, Utc};
use factiondraft_core::{
    DraftError, DraftStore, Error, FACTIONS, Faction, FactionId, FinalizeOutcome,
    MANUAL_MAX_ENTRIES, MIN_PLAYERS, NewDraft, OFFER_SIZE, ParticipantId, Player, PlayerId,
    Result, Session, SessionId, SessionRecord, StoreError,
};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One player's seat in a freshly started draft.
#[derive(Debug, Clone, Serialize)]
pub struct DraftedPlayer {
    pub player: Player,
    pub participant: ParticipantId,
    pub options: Vec<Faction>,
    pub tier: BanTier,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftOutcome {
    pub session: SessionId,
    /// Sorted by player name.
    pub players: Vec<DraftedPlayer>,
    pub report: AllocationReport,
}

/// A participant with ids resolved to names.
#[derive(Debug, Clone, Serialize)]
pub struct SeatView {
    pub participant: ParticipantId,
    pub player: Player,
    /// Empty for manually recorded games.
    pub options: Vec<Faction>,
    pub selected: Option<Faction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: Session,
    /// Sorted by player name.
    pub seats: Vec<SeatView>,
    pub winner: Option<String>,
}

struct PreparedDraft {
    pool: Vec<Faction>,
    global_bans: BTreeSet<FactionId>,
    players: Vec<PlayerBans>,
}

pub struct DraftManager {
    store: Arc<dyn DraftStore>,
}

impl DraftManager {
    pub fn new(store: Arc<dyn DraftStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DraftStore> {
        &self.store
    }

    /// Seed the faction catalog. Returns how many factions were added.
    pub async fn init(&self) -> Result<usize> {
        let before: BTreeSet<String> = self
            .store
            .factions()
            .await?
            .into_iter()
            .map(|f| f.name)
            .collect();

        let added = self.store.seed_factions(FACTIONS).await?;
        if added > 0 {
            for name in FACTIONS.iter().filter(|n| !before.contains(**n)) {
                info!(faction = %name, "Added faction");
            }
        }
        debug!(added, backend = self.store.name(), "Faction catalog ready");
        Ok(added)
    }

    /// Returns `None` if the name is already registered.
    pub async fn add_player(&self, name: &str) -> Result<Option<Player>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("player name must not be empty".into()));
        }

        let player = self.store.add_player(name).await?;
        match &player {
            Some(p) => info!(player = %p.name, id = %p.id, "Player added"),
            None => debug!(player = %name, "Player already exists"),
        }
        Ok(player)
    }

    pub async fn players(&self) -> Result<Vec<Player>> {
        Ok(self.store.active_players().await?)
    }

    /// The pool, ordered by name.
    pub async fn factions(&self) -> Result<Vec<Faction>> {
        let mut factions = self.store.factions().await?;
        factions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(factions)
    }

    /// Start a draft for `player_ids` using the thread-local RNG.
    pub async fn start_draft(&self, player_ids: &[PlayerId]) -> Result<DraftOutcome> {
        let prepared = self.prepare_draft(player_ids).await?;
        let allocation = {
            let mut rng = rand::rng();
            allocate(
                &prepared.pool,
                &prepared.global_bans,
                &prepared.players,
                &mut rng,
            )?
        };
        self.commit_draft(allocation.picks, allocation.report).await
    }

    pub async fn start_draft_with_rng<R: Rng + ?Sized>(
        &self,
        player_ids: &[PlayerId],
        rng: &mut R,
    ) -> Result<DraftOutcome> {
        let prepared = self.prepare_draft(player_ids).await?;
        let allocation = allocate(
            &prepared.pool,
            &prepared.global_bans,
            &prepared.players,
            rng,
        )?;
        self.commit_draft(allocation.picks, allocation.report).await
    }

    async fn prepare_draft(&self, player_ids: &[PlayerId]) -> Result<PreparedDraft> {
        let mut seen = BTreeSet::new();
        let unique: Vec<PlayerId> = player_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if unique.len() < MIN_PLAYERS {
            return Err(DraftError::NotEnoughPlayers {
                got: unique.len(),
                required: MIN_PLAYERS,
            }
            .into());
        }

        let mut players = Vec::with_capacity(unique.len());
        for id in unique {
            let player = self
                .store
                .player(id)
                .await?
                .ok_or_else(|| Error::not_found("player", id))?;
            players.push(player);
        }

        // Checked before cleanup so a fatal pool leaves the open draft alone.
        let pool = self.store.factions().await?;
        if pool.len() < OFFER_SIZE {
            return Err(DraftError::PoolTooSmall {
                available: pool.len(),
                required: OFFER_SIZE,
            }
            .into());
        }

        if let Some(active) = self.store.active_session().await? {
            if active.has_selection() {
                return Err(DraftError::SessionInProgress(active.id()).into());
            }
            info!(session = %active.id(), "Discarding abandoned draft with no picks");
            self.store.delete_session(active.id()).await?;
        }

        let (global_bans, bans) = {
            let filter = HistoryFilter::new(self.store.as_ref(), &pool);
            let global_bans = filter.global_ban_ids().await?;
            let mut bans = Vec::with_capacity(players.len());
            for player in players {
                bans.push(filter.player_bans(player).await?);
            }
            (global_bans, bans)
        };

        Ok(PreparedDraft {
            pool,
            global_bans,
            players: bans,
        })
    }

    async fn commit_draft(
        &self,
        picks: Vec<PlayerPick>,
        report: AllocationReport,
    ) -> Result<DraftOutcome> {
        let draft = NewDraft {
            started_at: Utc::now(),
            entries: picks
                .iter()
                .map(|p| (p.player.id, p.options.iter().map(|f| f.id).collect()))
                .collect(),
        };
        let record = self.store.persist_draft(draft).await?;

        let mut players = Vec::with_capacity(picks.len());
        for pick in picks {
            let seat = record.participant_for(pick.player.id).ok_or_else(|| {
                StoreError::Storage(format!(
                    "session {} has no seat for player {}",
                    record.id(),
                    pick.player.id
                ))
            })?;
            players.push(DraftedPlayer {
                participant: seat.id,
                player: pick.player,
                options: pick.options,
                tier: pick.tier,
            });
        }
        players.sort_by(|a, b| a.player.name.cmp(&b.player.name));

        info!(
            session = %record.id(),
            players = players.len(),
            degraded = report.degraded(),
            "Draft started"
        );

        Ok(DraftOutcome {
            session: record.id(),
            players,
            report,
        })
    }

    /// The session still being drafted, if any.
    pub async fn current_draft(&self) -> Result<Option<SessionView>> {
        let Some(active) = self.store.active_session().await? else {
            return Ok(None);
        };
        let pool = self.pool_index().await?;
        Ok(Some(self.view(active, &pool).await?))
    }

    /// Record a participant's choice. Returns the chosen faction.
    pub async fn select_faction(
        &self,
        participant: ParticipantId,
        faction: FactionId,
    ) -> Result<Faction> {
        let seat = self
            .store
            .participant(participant)
            .await?
            .ok_or_else(|| Error::not_found("participant", participant))?;
        let chosen = self
            .store
            .faction(faction)
            .await?
            .ok_or_else(|| Error::not_found("faction", faction))?;
        let record = self
            .store
            .session(seat.session_id)
            .await?
            .ok_or_else(|| Error::not_found("session", seat.session_id))?;
        if !record.session.active {
            return Err(DraftError::SessionClosed(record.id()).into());
        }

        let offered = seat
            .offered
            .as_ref()
            .is_some_and(|ids| ids.contains(&faction));
        if !offered {
            debug!(participant = %participant, faction = %chosen.name, "Selected a faction that was not offered");
        }

        if !self.store.set_selection(participant, faction).await? {
            return Err(Error::not_found("participant", participant));
        }
        info!(participant = %participant, faction = %chosen.name, "Faction selected");
        Ok(chosen)
    }

    /// Close the active session, pruning seats without a pick.
    pub async fn finalize(&self) -> Result<FinalizeOutcome> {
        let active = self
            .store
            .active_session()
            .await?
            .ok_or(DraftError::NoActiveSession)?;

        let outcome = self
            .store
            .finalize_session(active.id())
            .await?
            .ok_or_else(|| Error::not_found("session", active.id()))?;

        match &outcome {
            FinalizeOutcome::Finalized {
                session,
                kept,
                pruned,
            } => info!(session = %session, kept, pruned, "Session finalized"),
            FinalizeOutcome::Discarded { session, pruned } => {
                warn!(session = %session, pruned, "Nobody picked a faction, session discarded")
            }
        }
        Ok(outcome)
    }

    /// Toggle the winner. Returns the winner after the change.
    pub async fn set_winner(
        &self,
        session: SessionId,
        player: PlayerId,
    ) -> Result<Option<PlayerId>> {
        let record = self
            .store
            .session(session)
            .await?
            .ok_or_else(|| Error::not_found("session", session))?;
        if record.participant_for(player).is_none() {
            return Err(Error::InvalidInput(format!(
                "player {player} did not take part in session {session}"
            )));
        }

        let winner = if record.session.winner == Some(player) {
            None
        } else {
            Some(player)
        };
        if !self.store.set_winner(session, winner).await? {
            return Err(Error::not_found("session", session));
        }

        match winner {
            Some(w) => info!(session = %session, winner = %w, "Winner set"),
            None => info!(session = %session, "Winner cleared"),
        }
        Ok(winner)
    }

    /// Returns `false` if the session does not exist.
    pub async fn delete_session(&self, session: SessionId) -> Result<bool> {
        let deleted = self.store.delete_session(session).await?;
        if deleted {
            info!(session = %session, "Session deleted");
        }
        Ok(deleted)
    }

    /// Record a game played without a draft. `date` defaults to now.
    ///
    /// Refused while a draft is open; finalize or delete it first.
    pub async fn record_manual_session(
        &self,
        date: Option<DateTime<Utc>>,
        pairs: &[(PlayerId, FactionId)],
    ) -> Result<SessionRecord> {
        if !(MIN_PLAYERS..=MANUAL_MAX_ENTRIES).contains(&pairs.len()) {
            return Err(Error::InvalidInput(format!(
                "a manual game needs {MIN_PLAYERS} to {MANUAL_MAX_ENTRIES} players, got {}",
                pairs.len()
            )));
        }

        if let Some(active) = self.store.active_session().await? {
            return Err(DraftError::SessionInProgress(active.id()).into());
        }

        let mut seen = BTreeSet::new();
        for (player, faction) in pairs {
            if !seen.insert(*player) {
                return Err(Error::InvalidInput(format!(
                    "player {player} appears more than once"
                )));
            }
            if self.store.player(*player).await?.is_none() {
                return Err(Error::not_found("player", *player));
            }
            if self.store.faction(*faction).await?.is_none() {
                return Err(Error::not_found("faction", *faction));
            }
        }

        let record = self
            .store
            .create_manual_session(date.unwrap_or_else(Utc::now), pairs)
            .await?;
        info!(session = %record.id(), players = pairs.len(), "Manual game recorded");
        Ok(record)
    }

    /// Finalized sessions, newest first.
    pub async fn history(&self) -> Result<Vec<SessionView>> {
        let pool = self.pool_index().await?;
        let mut views = Vec::new();
        for record in self.store.sessions(true).await? {
            views.push(self.view(record, &pool).await?);
        }
        Ok(views)
    }

    async fn pool_index(&self) -> Result<HashMap<FactionId, Faction>> {
        Ok(self
            .store
            .factions()
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect())
    }

    async fn view(
        &self,
        record: SessionRecord,
        pool: &HashMap<FactionId, Faction>,
    ) -> Result<SessionView> {
        let session_id = record.id();
        let resolve = |id: &FactionId| match pool.get(id) {
            Some(f) => Some(f.clone()),
            None => {
                warn!(session = %session_id, faction = %id, "Skipping unknown faction");
                None
            }
        };

        let mut seats = Vec::with_capacity(record.participants.len());
        for seat in &record.participants {
            let Some(player) = self.store.player(seat.player_id).await? else {
                warn!(session = %session_id, player = %seat.player_id, "Skipping unknown player");
                continue;
            };
            seats.push(SeatView {
                participant: seat.id,
                player,
                options: seat
                    .offered
                    .iter()
                    .flatten()
                    .filter_map(&resolve)
                    .collect(),
                selected: seat.selected.as_ref().and_then(&resolve),
            });
        }
        seats.sort_by(|a, b| a.player.name.cmp(&b.player.name));

        let winner = record.session.winner.and_then(|w| {
            seats
                .iter()
                .find(|s| s.player.id == w)
                .map(|s| s.player.name.clone())
        });

        Ok(SessionView {
            session: record.session,
            seats,
            winner,
        })
    }
}
