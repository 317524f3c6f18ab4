//! Ban sets derived from stored history.
//!
//! Read-only: every method is a query against the [`DraftStore`]. Empty
//! history yields empty sets.

use crate::allocator::PlayerBans;
use factiondraft_core::{
    DRAFTED_LOOKBACK, DraftStore, Faction, FactionId, HistoryKind, PLAYED_LOOKBACK, Player,
    PlayerId, StoreError,
};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

pub struct HistoryFilter<'a> {
    store: &'a dyn DraftStore,
    names: HashMap<FactionId, &'a str>,
}

impl<'a> HistoryFilter<'a> {
    /// `pool` only labels log lines; bans are computed from ids.
    pub fn new(store: &'a dyn DraftStore, pool: &'a [Faction]) -> Self {
        Self {
            store,
            names: pool.iter().map(|f| (f.id, f.name.as_str())).collect(),
        }
    }

    fn describe(&self, ids: &BTreeSet<FactionId>) -> String {
        ids.iter()
            .map(|id| {
                self.names
                    .get(id)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Factions the player selected in their last finalized sessions.
    pub async fn played_ids(&self, player: PlayerId) -> Result<BTreeSet<FactionId>, StoreError> {
        let history = self
            .store
            .recent_history(player, HistoryKind::Played, PLAYED_LOOKBACK, true)
            .await?;
        Ok(history.into_iter().flat_map(|h| h.faction_ids).collect())
    }

    /// Factions offered to the player in their last sessions, finalized or not.
    pub async fn recent_drafted_ids(
        &self,
        player: PlayerId,
    ) -> Result<BTreeSet<FactionId>, StoreError> {
        let history = self
            .store
            .recent_history(player, HistoryKind::Drafted, DRAFTED_LOOKBACK, false)
            .await?;
        Ok(history.into_iter().flat_map(|h| h.faction_ids).collect())
    }

    /// Everything selected in the most recently finalized session.
    pub async fn global_ban_ids(&self) -> Result<BTreeSet<FactionId>, StoreError> {
        let bans: BTreeSet<FactionId> = match self.store.last_finalized_session().await? {
            Some(record) => record.selected_factions().collect(),
            None => BTreeSet::new(),
        };
        if !bans.is_empty() {
            info!(banned = %self.describe(&bans), "Previous session's factions banned");
        }
        Ok(bans)
    }

    pub async fn player_bans(&self, player: Player) -> Result<PlayerBans, StoreError> {
        let played = self.played_ids(player.id).await?;
        let recent_drafted = self.recent_drafted_ids(player.id).await?;

        if !played.is_empty() {
            info!(player = %player.name, banned = %self.describe(&played), "Recently played");
        }
        if !recent_drafted.is_empty() {
            info!(player = %player.name, banned = %self.describe(&recent_drafted), "Recently offered");
        }

        Ok(PlayerBans {
            player,
            played,
            recent_drafted,
        })
    }
}
