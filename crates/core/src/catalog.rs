//! The seeded faction catalog and the fixed draft constants.

/// Factions offered to each drafted player.
pub const OFFER_SIZE: usize = 3;

/// Smallest table a draft or a manual game may seat.
pub const MIN_PLAYERS: usize = 3;

/// Rows accepted for one manually recorded game.
pub const MANUAL_MAX_ENTRIES: usize = 8;

/// Finalized sessions whose selections a player may not repeat.
pub const PLAYED_LOOKBACK: usize = 2;

/// Sessions whose offers a player should not see again.
pub const DRAFTED_LOOKBACK: usize = 2;

/// Seed list, upserted by name on every startup. Append new factions here.
pub const FACTIONS: &[&str] = &[
    "The Arborec",
    "The Barony of Letnev",
    "The Clan of Saar",
    "The Embers of Muaat",
    "The Emirates of Hacan",
    "The Federation of Sol",
    "The Ghosts of Creuss",
    "The L1Z1X Mindnet",
    "The Mentak Coalition",
    "The Naalu Collective",
    "The Nekro Virus",
    "The Sardakk N'orr",
    "The Universities of Jol-Nar",
    "The Winnu",
    "The Xxcha Kingdom",
    "The Yin Brotherhood",
    "The Yssaril Tribes",
    // Prophecy of Kings
    "The Argent Flight",
    "The Empyrean",
    "The Mahact Gene-Sorcerers",
    "The Naaz-Rokha Alliance",
    "The Nomad",
    "The Titans of Ul",
    "The Vuil'raith Cabal",
    "The Council Keleres",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_names_are_unique() {
        let unique: HashSet<_> = FACTIONS.iter().collect();
        assert_eq!(unique.len(), FACTIONS.len());
        assert_eq!(FACTIONS.len(), 25);
    }

    #[test]
    fn catalog_covers_a_full_table() {
        assert!(FACTIONS.len() >= OFFER_SIZE * MANUAL_MAX_ENTRIES);
    }
}
