//! The faction draft: who may be offered what, and the session lifecycle
//! around it.
//!
//! - [`history`] turns stored sessions into per-player ban sets
//! - [`allocator`] draws the offers, relaxing bans tier by tier when the
//!   pool runs dry
//! - [`manager`] wires both to a [`DraftStore`](factiondraft_core::DraftStore)
//!   and owns cleanup, picks, finalization and manual games

pub mod allocator;
pub mod history;
pub mod manager;

pub use allocator::{Allocation, AllocationReport, BanTier, PlayerBans, PlayerPick, allocate, candidates};
pub use history::HistoryFilter;
pub use manager::{DraftManager, DraftOutcome, DraftedPlayer, SeatView, SessionView};
