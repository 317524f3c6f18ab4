//! Draft domain types.
//!
//! Factions are catalog entries, players register once, and every draft or
//! manually recorded game produces a [`Session`] with one [`Participant`] per
//! seated player.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

id_type!(
    /// Identifier of a catalog faction.
    FactionId
);
id_type!(
    /// Identifier of a registered player.
    PlayerId
);
id_type!(
    /// Identifier of a session (one game).
    SessionId
);
id_type!(
    /// Identifier of a player's seat within one session.
    ParticipantId
);

/// A selectable faction from the fixed catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Faction {
    pub id: FactionId,
    pub name: String,
}

impl Faction {
    /// Asset-friendly name: lowercase, ASCII alphanumerics, spaces become `_`.
    ///
    /// `"The Federation of Sol"` becomes `"the_federation_of_sol"`.
    pub fn slug(&self) -> String {
        self.name
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
            .map(|c| if c == ' ' { '_' } else { c })
            .collect()
    }
}

/// A registered player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub active: bool,
}

/// One draft-and-play cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    /// True while drafting or awaiting choices, false once finalized.
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}

/// A player's seat within one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub session_id: SessionId,
    pub player_id: PlayerId,
    /// Offered factions in draw order. `None` for manually recorded games.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offered: Option<Vec<FactionId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<FactionId>,
}

/// A session together with all of its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: Session,
    pub participants: Vec<Participant>,
}

impl SessionRecord {
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    /// Whether any participant has picked a faction yet.
    pub fn has_selection(&self) -> bool {
        self.participants.iter().any(|p| p.selected.is_some())
    }

    /// Selected factions across all participants, ignoring unset ones.
    pub fn selected_factions(&self) -> impl Iterator<Item = FactionId> + '_ {
        self.participants.iter().filter_map(|p| p.selected)
    }

    pub fn participant_for(&self, player: PlayerId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.player_id == player)
    }
}
