//! End-to-end tests for the draft lifecycle.
//!
//! These drive `DraftManager` over both storage backends: drafting, picks,
//! finalization, winners and the history-driven bans across many rounds.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{Duration, Utc};

use factiondraft_core::{
    DraftError, DraftStore, Error, FACTIONS, FactionId, FinalizeOutcome, PlayerId,
};
use factiondraft_draft::{BanTier, DraftManager};
use factiondraft_store::{InMemoryStore, SqliteStore};
use rand::SeedableRng;
use rand::rngs::StdRng;

const PLAYERS: [&str; 5] = ["Anna", "Bela", "Csaba", "Dora", "Emil"];

async fn sqlite_manager() -> DraftManager {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    DraftManager::new(Arc::new(store))
}

fn memory_manager() -> DraftManager {
    DraftManager::new(Arc::new(InMemoryStore::new()))
}

async fn register(manager: &DraftManager) -> Vec<PlayerId> {
    manager.init().await.unwrap();
    let mut ids = Vec::new();
    for name in PLAYERS {
        ids.push(manager.add_player(name).await.unwrap().unwrap().id);
    }
    ids
}

/// Past rounds as seen by the ban rules.
#[derive(Default)]
struct Ledger {
    played: HashMap<PlayerId, Vec<FactionId>>,
    offered: HashMap<PlayerId, Vec<Vec<FactionId>>>,
    last_round: BTreeSet<FactionId>,
}

impl Ledger {
    fn banned_for(&self, player: PlayerId) -> BTreeSet<FactionId> {
        let mut banned = self.last_round.clone();
        if let Some(played) = self.played.get(&player) {
            banned.extend(played.iter().rev().take(2));
        }
        if let Some(offered) = self.offered.get(&player) {
            banned.extend(offered.iter().rev().take(2).flatten());
        }
        banned
    }
}

async fn play_rounds(manager: &DraftManager, ids: &[PlayerId], rounds: u64) {
    let mut ledger = Ledger::default();

    for round in 0..rounds {
        let mut rng = StdRng::seed_from_u64(round);
        let outcome = manager.start_draft_with_rng(ids, &mut rng).await.unwrap();
        assert_eq!(outcome.report.critical(), 0);

        let mut seen = BTreeSet::new();
        for seat in &outcome.players {
            assert_eq!(seat.options.len(), 3);
            for faction in &seat.options {
                assert!(seen.insert(faction.id), "round {round}: {} offered twice", faction.name);
            }
            if seat.tier == BanTier::Strict {
                let banned = ledger.banned_for(seat.player.id);
                assert!(
                    seat.options.iter().all(|f| !banned.contains(&f.id)),
                    "round {round}: {} was offered a banned faction",
                    seat.player.name
                );
            }
        }

        let mut round_picks = BTreeSet::new();
        for seat in &outcome.players {
            let choice = seat.options[round as usize % 3].id;
            manager.select_faction(seat.participant, choice).await.unwrap();
            ledger.played.entry(seat.player.id).or_default().push(choice);
            ledger
                .offered
                .entry(seat.player.id)
                .or_default()
                .push(seat.options.iter().map(|f| f.id).collect());
            round_picks.insert(choice);
        }
        ledger.last_round = round_picks;

        let finalized = manager.finalize().await.unwrap();
        assert!(matches!(
            finalized,
            FinalizeOutcome::Finalized { kept: 5, pruned: 0, .. }
        ));
    }

    assert_eq!(manager.history().await.unwrap().len() as u64, rounds);
}

async fn full_lifecycle(manager: DraftManager) {
    let ids = register(&manager).await;
    assert_eq!(manager.factions().await.unwrap().len(), FACTIONS.len());
    assert_eq!(manager.init().await.unwrap(), 0);

    let outcome = manager.start_draft(&ids[..4]).await.unwrap();
    let draft = manager.current_draft().await.unwrap().unwrap();
    assert_eq!(draft.session.id, outcome.session);
    assert_eq!(draft.seats.len(), 4);

    for seat in &outcome.players[..3] {
        manager
            .select_faction(seat.participant, seat.options[0].id)
            .await
            .unwrap();
    }
    let err = manager.start_draft(&ids[..4]).await.unwrap_err();
    assert!(matches!(err, Error::Draft(DraftError::SessionInProgress(_))));

    let finalized = manager.finalize().await.unwrap();
    assert_eq!(
        finalized,
        FinalizeOutcome::Finalized {
            session: outcome.session,
            kept: 3,
            pruned: 1
        }
    );

    let winner = outcome.players[0].player.id;
    assert_eq!(
        manager.set_winner(outcome.session, winner).await.unwrap(),
        Some(winner)
    );
    let history = manager.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].winner.as_ref(), Some(&outcome.players[0].player.name));
    assert_eq!(manager.set_winner(outcome.session, winner).await.unwrap(), None);

    // The next draft bans the factions just played.
    let played: BTreeSet<FactionId> = history[0]
        .seats
        .iter()
        .filter_map(|s| s.selected.as_ref().map(|f| f.id))
        .collect();
    let next = manager.start_draft(&ids).await.unwrap();
    for seat in next.players.iter().filter(|s| s.tier == BanTier::Strict) {
        assert!(seat.options.iter().all(|f| !played.contains(&f.id)));
    }
}

#[tokio::test]
async fn lifecycle_over_sqlite() {
    full_lifecycle(sqlite_manager().await).await;
}

#[tokio::test]
async fn lifecycle_over_memory() {
    full_lifecycle(memory_manager()).await;
}

#[tokio::test]
async fn many_rounds_over_sqlite() {
    let manager = sqlite_manager().await;
    let ids = register(&manager).await;
    play_rounds(&manager, &ids, 8).await;
}

#[tokio::test]
async fn many_rounds_over_memory() {
    let manager = memory_manager();
    let ids = register(&manager).await;
    play_rounds(&manager, &ids, 8).await;
}

async fn open_draft_survives_manual_games(manager: DraftManager) {
    let ids = register(&manager).await;
    let pool = manager.factions().await.unwrap();
    let pairs: Vec<_> = ids[..3]
        .iter()
        .zip(&pool)
        .map(|(player, faction)| (*player, faction.id))
        .collect();

    let outcome = manager.start_draft(&ids).await.unwrap();
    let seat = &outcome.players[0];
    manager
        .select_faction(seat.participant, seat.options[0].id)
        .await
        .unwrap();

    let err = manager.record_manual_session(None, &pairs).await.unwrap_err();
    assert!(matches!(err, Error::Draft(DraftError::SessionInProgress(_))));

    // A newer finalized game written behind the manager's back.
    manager
        .store()
        .create_manual_session(Utc::now() + Duration::days(2), &pairs)
        .await
        .unwrap();

    let current = manager.current_draft().await.unwrap().unwrap();
    assert_eq!(current.session.id, outcome.session);
    let finalized = manager.finalize().await.unwrap();
    assert!(matches!(
        finalized,
        FinalizeOutcome::Finalized { kept: 1, pruned: 4, .. }
    ));
    manager.start_draft(&ids).await.unwrap();
}

#[tokio::test]
async fn open_draft_survives_manual_games_over_sqlite() {
    open_draft_survives_manual_games(sqlite_manager().await).await;
}

#[tokio::test]
async fn open_draft_survives_manual_games_over_memory() {
    open_draft_survives_manual_games(memory_manager()).await;
}

#[tokio::test]
async fn manual_games_feed_the_bans() {
    let manager = sqlite_manager().await;
    let ids = register(&manager).await;
    let pool = manager.factions().await.unwrap();

    let pairs: Vec<_> = ids[..3]
        .iter()
        .zip(&pool)
        .map(|(player, faction)| (*player, faction.id))
        .collect();
    let record = manager.record_manual_session(None, &pairs).await.unwrap();
    assert!(!record.session.active);

    let banned: BTreeSet<FactionId> = pairs.iter().map(|(_, f)| *f).collect();
    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let outcome = manager.start_draft_with_rng(&ids, &mut rng).await.unwrap();
        for seat in &outcome.players {
            assert_eq!(seat.tier, BanTier::Strict);
            assert!(seat.options.iter().all(|f| !banned.contains(&f.id)));
        }
    }
}

#[tokio::test]
async fn sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("draft.sqlite");
    let path = path.to_str().unwrap();

    let session = {
        let manager = DraftManager::new(Arc::new(SqliteStore::new(path).await.unwrap()));
        let ids = register(&manager).await;
        let outcome = manager.start_draft(&ids[..3]).await.unwrap();
        for seat in &outcome.players {
            manager
                .select_faction(seat.participant, seat.options[2].id)
                .await
                .unwrap();
        }
        manager.finalize().await.unwrap();
        outcome.session
    };

    let store = SqliteStore::new(path).await.unwrap();
    assert_eq!(store.name(), "sqlite");
    let manager = DraftManager::new(Arc::new(store));
    assert_eq!(manager.init().await.unwrap(), 0);
    let history = manager.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].session.id, session);
    assert!(history[0].seats.iter().all(|s| s.options.len() == 3));
}
