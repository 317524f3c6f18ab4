//! # factiondraft core
//!
//! Domain types, the fixed faction catalog, the storage trait and the error
//! taxonomy for the faction draft. This crate has **no storage or runtime
//! dependencies**: it defines the model that the store, draft and CLI
//! crates implement against.
//!
//! ## Layout
//!
//! - [`model`]: factions, players, sessions and participants
//! - [`catalog`]: the seeded faction list and the fixed draft constants
//! - [`store`]: the [`DraftStore`] trait every backend implements
//! - [`error`]: bounded-context errors built on `thiserror`

pub mod catalog;
pub mod error;
pub mod model;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use catalog::{DRAFTED_LOOKBACK, FACTIONS, MANUAL_MAX_ENTRIES, MIN_PLAYERS, OFFER_SIZE, PLAYED_LOOKBACK};
pub use error::{DraftError, Error, Result, StoreError};
pub use model::{
    Faction, FactionId, Participant, ParticipantId, Player, PlayerId, Session, SessionId,
    SessionRecord,
};
pub use store::{DraftStore, FinalizeOutcome, HistoryEntry, HistoryKind, NewDraft};
