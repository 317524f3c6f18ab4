//! Draft allocation: three session-unique offers per player.
//!
//! Each player's candidate pool is the catalog minus four exclusion sets.
//! When fewer than [`OFFER_SIZE`] candidates remain, exclusions are dropped
//! one [`BanTier`] at a time in a fixed order until the pool is big enough.
//! Only the player order and the final draw are random.

use factiondraft_core::{DraftError, Faction, FactionId, Player, OFFER_SIZE};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// One level of the relaxation cascade.
///
/// Each tier keeps every exclusion of the next one plus one more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BanTier {
    /// Own plays, own recent offers, claimed and previous-session factions excluded.
    Strict,
    /// Recent offers allowed again.
    RecentOffersRelaxed,
    /// Previous session's factions allowed again.
    PreviousSessionRelaxed,
    /// Own recent plays allowed again; only session uniqueness remains.
    OwnPlaysRelaxed,
    /// Everything allowed, including factions already offered this session.
    Exhausted,
}

const TIER_COUNT: usize = 5;

impl BanTier {
    pub const ALL: [BanTier; TIER_COUNT] = [
        BanTier::Strict,
        BanTier::RecentOffersRelaxed,
        BanTier::PreviousSessionRelaxed,
        BanTier::OwnPlaysRelaxed,
        BanTier::Exhausted,
    ];

    pub fn level(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<BanTier> {
        Self::ALL.get(self.level() + 1).copied()
    }

    pub fn is_degraded(self) -> bool {
        self != BanTier::Strict
    }

    fn excludes_recent_offers(self) -> bool {
        self == BanTier::Strict
    }

    fn excludes_previous_session(self) -> bool {
        self <= BanTier::RecentOffersRelaxed
    }

    fn excludes_own_plays(self) -> bool {
        self <= BanTier::PreviousSessionRelaxed
    }

    fn excludes_claimed(self) -> bool {
        self <= BanTier::OwnPlaysRelaxed
    }
}

impl std::fmt::Display for BanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BanTier::Strict => "strict",
            BanTier::RecentOffersRelaxed => "recent offers relaxed",
            BanTier::PreviousSessionRelaxed => "previous session relaxed",
            BanTier::OwnPlaysRelaxed => "own plays relaxed",
            BanTier::Exhausted => "exhausted",
        };
        write!(f, "tier {} ({name})", self.level())
    }
}

/// A player's personal exclusions, as computed by the history filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerBans {
    pub player: Player,
    /// Selected in the player's last finalized sessions.
    pub played: BTreeSet<FactionId>,
    /// Offered to the player in their last sessions.
    pub recent_drafted: BTreeSet<FactionId>,
}

impl PlayerBans {
    pub fn unrestricted(player: Player) -> Self {
        Self {
            player,
            played: BTreeSet::new(),
            recent_drafted: BTreeSet::new(),
        }
    }
}

/// The offers drawn for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerPick {
    pub player: Player,
    /// In draw order.
    pub options: Vec<Faction>,
    pub tier: BanTier,
}

/// How many players were served by each tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocationReport {
    tier_counts: [usize; TIER_COUNT],
}

impl AllocationReport {
    fn record(&mut self, tier: BanTier) {
        self.tier_counts[tier.level()] += 1;
    }

    pub fn count(&self, tier: BanTier) -> usize {
        self.tier_counts[tier.level()]
    }

    /// Players that needed any relaxation.
    pub fn degraded(&self) -> usize {
        self.tier_counts[1..].iter().sum()
    }

    /// Players that were offered factions someone else already holds.
    pub fn critical(&self) -> usize {
        self.count(BanTier::Exhausted)
    }
}

/// Picks in processing order plus the tier statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub picks: Vec<PlayerPick>,
    pub report: AllocationReport,
}

/// The candidate pool for one player at `tier`, in catalog order.
pub fn candidates<'a>(
    pool: &'a [Faction],
    bans: &PlayerBans,
    claimed: &BTreeSet<FactionId>,
    global_bans: &BTreeSet<FactionId>,
    tier: BanTier,
) -> Vec<&'a Faction> {
    pool.iter()
        .filter(|f| !(tier.excludes_own_plays() && bans.played.contains(&f.id)))
        .filter(|f| !(tier.excludes_recent_offers() && bans.recent_drafted.contains(&f.id)))
        .filter(|f| !(tier.excludes_claimed() && claimed.contains(&f.id)))
        .filter(|f| !(tier.excludes_previous_session() && global_bans.contains(&f.id)))
        .collect()
}

/// Walk the cascade until a tier leaves at least [`OFFER_SIZE`] candidates.
fn resolve<'a>(
    pool: &'a [Faction],
    bans: &PlayerBans,
    claimed: &BTreeSet<FactionId>,
    global_bans: &BTreeSet<FactionId>,
) -> (BanTier, Vec<&'a Faction>) {
    let mut tier = BanTier::Strict;
    let mut available = candidates(pool, bans, claimed, global_bans, tier);
    debug!(player = %bans.player.name, pool_size = available.len(), "Strict candidate pool");

    while available.len() < OFFER_SIZE {
        let Some(next) = tier.next() else {
            break;
        };
        tier = next;
        available = candidates(pool, bans, claimed, global_bans, tier);

        if tier == BanTier::Exhausted {
            error!(
                player = %bans.player.name,
                pool_size = available.len(),
                "CRITICAL: faction pool too small for this table, offering factions already claimed"
            );
        } else {
            warn!(
                player = %bans.player.name,
                tier = %tier,
                pool_size = available.len(),
                "Too few factions, relaxing bans"
            );
        }
    }

    (tier, available)
}

/// Allocate [`OFFER_SIZE`] factions to every player.
///
/// Players are served in a uniformly shuffled order. Factions drawn for one
/// player are excluded for everyone after them unless the cascade reaches
/// [`BanTier::Exhausted`].
pub fn allocate<R: Rng + ?Sized>(
    pool: &[Faction],
    global_bans: &BTreeSet<FactionId>,
    players: &[PlayerBans],
    rng: &mut R,
) -> Result<Allocation, DraftError> {
    if pool.len() < OFFER_SIZE {
        error!(
            available = pool.len(),
            required = OFFER_SIZE,
            "FATAL: not enough factions in the pool"
        );
        return Err(DraftError::PoolTooSmall {
            available: pool.len(),
            required: OFFER_SIZE,
        });
    }

    let mut order: Vec<&PlayerBans> = players.iter().collect();
    order.shuffle(&mut *rng);

    let mut claimed: BTreeSet<FactionId> = BTreeSet::new();
    let mut report = AllocationReport::default();
    let mut picks = Vec::with_capacity(order.len());

    for bans in order {
        let (tier, available) = resolve(pool, bans, &claimed, global_bans);
        let options: Vec<Faction> = available
            .choose_multiple(&mut *rng, OFFER_SIZE)
            .map(|f| (*f).clone())
            .collect();

        let names: Vec<&str> = options.iter().map(|f| f.name.as_str()).collect();
        info!(
            player = %bans.player.name,
            tier = tier.level(),
            options = %names.join(", "),
            "Drew offers"
        );

        claimed.extend(options.iter().map(|f| f.id));
        report.record(tier);
        picks.push(PlayerPick {
            player: bans.player.clone(),
            options,
            tier,
        });
    }

    if report.degraded() > 0 {
        warn!(
            degraded = report.degraded(),
            critical = report.critical(),
            "Draft needed relaxed bans"
        );
    }

    Ok(Allocation { picks, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use factiondraft_core::PlayerId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn pool(n: i64) -> Vec<Faction> {
        (1..=n)
            .map(|i| Faction {
                id: FactionId(i),
                name: format!("Faction {i:02}"),
            })
            .collect()
    }

    fn player(id: i64) -> Player {
        Player {
            id: PlayerId(id),
            name: format!("Player {id}"),
            active: true,
        }
    }

    fn ids(values: &[i64]) -> BTreeSet<FactionId> {
        values.iter().copied().map(FactionId).collect()
    }

    fn unrestricted(n: i64) -> Vec<PlayerBans> {
        (1..=n).map(|i| PlayerBans::unrestricted(player(i))).collect()
    }

    fn offered(pick: &PlayerPick) -> BTreeSet<FactionId> {
        pick.options.iter().map(|f| f.id).collect()
    }

    #[test]
    fn large_pool_serves_everyone_strictly() {
        let pool = pool(25);
        let mut rng = StdRng::seed_from_u64(7);
        let allocation = allocate(&pool, &BTreeSet::new(), &unrestricted(6), &mut rng).unwrap();

        assert_eq!(allocation.picks.len(), 6);
        let mut seen = HashSet::new();
        for pick in &allocation.picks {
            assert_eq!(pick.options.len(), OFFER_SIZE);
            assert_eq!(offered(pick).len(), OFFER_SIZE, "options must be distinct");
            assert_eq!(pick.tier, BanTier::Strict);
            for faction in &pick.options {
                assert!(seen.insert(faction.id), "faction offered twice");
            }
        }
        assert_eq!(allocation.report.count(BanTier::Strict), 6);
        assert_eq!(allocation.report.degraded(), 0);
    }

    #[test]
    fn every_player_appears_once() {
        let pool = pool(25);
        let mut rng = StdRng::seed_from_u64(1);
        let allocation = allocate(&pool, &BTreeSet::new(), &unrestricted(8), &mut rng).unwrap();
        let served: BTreeSet<PlayerId> = allocation.picks.iter().map(|p| p.player.id).collect();
        assert_eq!(served.len(), 8);
    }

    #[test]
    fn tiny_pool_relaxes_but_still_offers_three() {
        let pool = pool(4);
        let mut rng = StdRng::seed_from_u64(42);
        let allocation = allocate(&pool, &BTreeSet::new(), &unrestricted(4), &mut rng).unwrap();

        assert_eq!(allocation.picks[0].tier, BanTier::Strict);
        for pick in &allocation.picks[1..] {
            assert_eq!(pick.tier, BanTier::Exhausted);
        }
        for pick in &allocation.picks {
            assert_eq!(offered(pick).len(), OFFER_SIZE);
        }
        assert_eq!(allocation.report.degraded(), 3);
        assert_eq!(allocation.report.critical(), 3);
    }

    #[test]
    fn pool_smaller_than_offer_is_fatal() {
        let pool = pool(2);
        let mut rng = StdRng::seed_from_u64(0);
        let err = allocate(&pool, &BTreeSet::new(), &unrestricted(3), &mut rng).unwrap_err();
        assert_eq!(
            err,
            DraftError::PoolTooSmall {
                available: 2,
                required: OFFER_SIZE
            }
        );
    }

    #[test]
    fn strict_tier_excludes_all_four_categories() {
        let pool = pool(25);
        let bans = PlayerBans {
            player: player(1),
            played: ids(&[1, 2]),
            recent_drafted: ids(&[3, 4, 5, 6, 7, 8]),
        };
        let global = ids(&[9, 10, 11]);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let allocation = allocate(&pool, &global, std::slice::from_ref(&bans), &mut rng).unwrap();
            let pick = &allocation.picks[0];
            assert_eq!(pick.tier, BanTier::Strict);
            for faction in &pick.options {
                assert!(faction.id.0 > 11, "banned faction {} offered", faction.id);
            }
        }
    }

    #[test]
    fn recent_offers_drop_first() {
        // 6 factions: 1 played, 3 recently offered, 0 global -> strict leaves 2.
        let pool = pool(6);
        let bans = PlayerBans {
            player: player(1),
            played: ids(&[1]),
            recent_drafted: ids(&[2, 3, 4]),
        };
        let mut rng = StdRng::seed_from_u64(3);
        let allocation = allocate(&pool, &BTreeSet::new(), std::slice::from_ref(&bans), &mut rng).unwrap();
        let pick = &allocation.picks[0];

        assert_eq!(pick.tier, BanTier::RecentOffersRelaxed);
        assert!(!offered(pick).contains(&FactionId(1)), "own play must stay banned");
    }

    #[test]
    fn previous_session_drops_before_own_plays() {
        let pool = pool(6);
        let bans = PlayerBans {
            player: player(1),
            played: ids(&[1, 2]),
            recent_drafted: BTreeSet::new(),
        };
        let global = ids(&[3, 4]);
        let mut rng = StdRng::seed_from_u64(5);
        let allocation = allocate(&pool, &global, std::slice::from_ref(&bans), &mut rng).unwrap();
        let pick = &allocation.picks[0];

        assert_eq!(pick.tier, BanTier::PreviousSessionRelaxed);
        let offered = offered(pick);
        assert!(!offered.contains(&FactionId(1)));
        assert!(!offered.contains(&FactionId(2)));
    }

    #[test]
    fn own_plays_drop_before_session_uniqueness() {
        let pool = pool(7);
        let bans = PlayerBans {
            player: player(1),
            played: ids(&[1, 2, 3, 4, 5]),
            recent_drafted: BTreeSet::new(),
        };
        let mut rng = StdRng::seed_from_u64(9);
        let allocation = allocate(&pool, &BTreeSet::new(), std::slice::from_ref(&bans), &mut rng).unwrap();
        assert_eq!(allocation.picks[0].tier, BanTier::OwnPlaysRelaxed);
    }

    #[test]
    fn relaxation_is_monotonic() {
        let pool = pool(12);
        let bans = PlayerBans {
            player: player(1),
            played: ids(&[1, 2]),
            recent_drafted: ids(&[3, 4, 5]),
        };
        let claimed = ids(&[6, 7, 8]);
        let global = ids(&[2, 9, 10]);

        let mut previous: Option<HashSet<FactionId>> = None;
        for tier in BanTier::ALL {
            let current: HashSet<FactionId> = candidates(&pool, &bans, &claimed, &global, tier)
                .into_iter()
                .map(|f| f.id)
                .collect();
            if let Some(previous) = &previous {
                assert!(current.is_superset(previous), "{tier} shrank the pool");
            }
            previous = Some(current);
        }
        assert_eq!(previous.map(|p| p.len()), Some(pool.len()));
    }

    #[test]
    fn same_seed_same_draft() {
        let pool = pool(25);
        let players = unrestricted(5);
        let a = allocate(&pool, &BTreeSet::new(), &players, &mut StdRng::seed_from_u64(11)).unwrap();
        let b = allocate(&pool, &BTreeSet::new(), &players, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tier_order_and_display() {
        assert_eq!(BanTier::Strict.next(), Some(BanTier::RecentOffersRelaxed));
        assert_eq!(BanTier::Exhausted.next(), None);
        assert!(!BanTier::Strict.is_degraded());
        assert!(BanTier::OwnPlaysRelaxed.is_degraded());
        assert_eq!(BanTier::Exhausted.to_string(), "tier 4 (exhausted)");
    }
}
