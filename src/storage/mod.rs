//! Persistence layer.
//!
//! Defines the two collaborator seams the round controller talks to:
//! `RoundSource` (upstream state: rounds, seated players, bets) and
//! `SettlementStore` (per-record writes of settled state). `SqliteStore`
//! implements both; `Journal` keeps computed settlements on disk until
//! they are fully persisted.

pub mod journal;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Bet, BetUpdate, Player, PlayerUpdate, Round};

pub use journal::Journal;
pub use sqlite::SqliteStore;

/// Read-only view of the rounds awaiting settlement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoundSource: Send + Sync {
    /// Fetch a round by id. `None` if it does not exist.
    async fn fetch_round(&self, round_id: &str) -> Result<Option<Round>>;

    /// Players seated in the round, in seating order.
    async fn fetch_players(&self, round_id: &str) -> Result<Vec<Player>>;

    /// Bets placed on the round, in placement order.
    async fn fetch_bets(&self, round_id: &str) -> Result<Vec<Bet>>;

    /// Ids of rounds with a winning number but no completion record.
    async fn rounds_awaiting_settlement(&self) -> Result<Vec<String>>;
}

/// Durable per-record writes of settled state.
///
/// Each call must be all-or-nothing for its record and must touch only
/// the fields in the update payload. Calls are idempotent: writing the
/// same update twice leaves the record in the same state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn update_bet(&self, bet_id: &str, update: &BetUpdate) -> Result<()>;

    async fn update_player(&self, player_id: &str, update: &PlayerUpdate) -> Result<()>;

    /// Write the round's completion record.
    async fn mark_round_settled(&self, round_id: &str, settled_at: DateTime<Utc>) -> Result<()>;
}
