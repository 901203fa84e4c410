//! Shared types for the CROUPIER settlement engine.
//!
//! These types form the data model used across all modules.
//! Rounds, players and bets mirror the records held by the upstream
//! state provider; the update payloads carry only the fields that
//! settlement is allowed to change.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Outcome & bet type
// ---------------------------------------------------------------------------

/// A pocket on the wheel (0–36 on a single-zero wheel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outcome(pub u8);

impl Outcome {
    /// Highest pocket on a single-zero wheel.
    pub const MAX: u8 = 36;

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for Outcome {
    fn from(n: u8) -> Self {
        Outcome(n)
    }
}

/// Label of a wager category, e.g. `"straight-17"`, `"red"`, `"dozen-2"`.
///
/// Labels are opaque to the calculator; their meaning lives entirely in
/// the rule tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BetType(pub String);

impl BetType {
    pub fn new(label: impl Into<String>) -> Self {
        BetType(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BetType {
    fn from(s: &str) -> Self {
        BetType(s.to_string())
    }
}

/// Settlement state of a bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetState {
    #[default]
    Pending,
    Won,
    Lost,
}

impl BetState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, BetState::Pending)
    }

    /// Column representation used by the durable store.
    pub fn as_str(&self) -> &'static str {
        match self {
            BetState::Pending => "PENDING",
            BetState::Won => "WON",
            BetState::Lost => "LOST",
        }
    }
}

impl fmt::Display for BetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BetState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(BetState::Pending),
            "WON" => Ok(BetState::Won),
            "LOST" => Ok(BetState::Lost),
            _ => Err(anyhow::anyhow!("Unknown bet state: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Round, Player, Bet
// ---------------------------------------------------------------------------

/// One spin of the wheel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: String,
    /// Winning pocket, absent until the round is resolved.
    pub winning_number: Option<Outcome>,
    /// Completion record: set once every settled bet and player is persisted.
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            winning_number: None,
            settled_at: None,
        }
    }

    pub fn resolved(id: impl Into<String>, winning_number: u8) -> Self {
        Self {
            id: id.into(),
            winning_number: Some(Outcome(winning_number)),
            settled_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.winning_number.is_some()
    }

    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.winning_number, self.settled_at) {
            (None, _) => write!(f, "Round {} (unresolved)", self.id),
            (Some(n), None) => write!(f, "Round {} → {n}", self.id),
            (Some(n), Some(at)) => write!(f, "Round {} → {n} (settled {})", self.id, at.to_rfc3339()),
        }
    }
}

/// A player seated at the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    /// Available funds.
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    /// Net result of the round most recently settled. Not persisted.
    #[serde(with = "rust_decimal::serde::str", default)]
    pub position_change: Decimal,
}

impl Player {
    pub fn new(id: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id: id.into(),
            balance,
            position_change: Decimal::ZERO,
        }
    }

    /// The subset of fields the durable store receives after settlement.
    pub fn to_update(&self) -> PlayerUpdate {
        PlayerUpdate {
            balance: self.balance,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Player {}: ${:.2} ({:+.2})",
            self.id, self.balance, self.position_change
        )
    }
}

/// A wager placed by one player on one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub player_id: String,
    pub round_id: String,
    pub bet_type: BetType,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Winning pocket copied from the round at settlement.
    #[serde(default)]
    pub result: Option<Outcome>,
    #[serde(default)]
    pub state: BetState,
}

impl Bet {
    /// A freshly placed, unsettled bet.
    pub fn new(
        id: impl Into<String>,
        player_id: impl Into<String>,
        round_id: impl Into<String>,
        bet_type: impl Into<BetType>,
        amount: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            player_id: player_id.into(),
            round_id: round_id.into(),
            bet_type: bet_type.into(),
            amount,
            result: None,
            state: BetState::Pending,
        }
    }

    /// The subset of fields the durable store receives after settlement.
    pub fn to_update(&self) -> BetUpdate {
        BetUpdate {
            state: self.state,
            result: self.result,
        }
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bet {} [{}] ${:.2} on {} ({})",
            self.id, self.player_id, self.amount, self.bet_type, self.state
        )
    }
}

/// Fields of a bet written by settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetUpdate {
    pub state: BetState,
    pub result: Option<Outcome>,
}

/// Fields of a player written by settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Reasons a settlement computation is rejected.
///
/// Every variant aborts the whole invocation: no partial set of updated
/// records is ever returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettlementError {
    #[error("No rule for bet type '{bet_type}' (bet {bet_id})")]
    UnknownBetType { bet_id: String, bet_type: BetType },

    #[error("Bet {bet_id} references player {player_id}, who is not seated in the round")]
    UnknownPlayer { bet_id: String, player_id: String },

    #[error("Player {0} appears more than once in the round")]
    DuplicatePlayer(String),

    #[error("Bet {bet_id} belongs to round {found}, not {expected}")]
    RoundMismatch {
        bet_id: String,
        expected: String,
        found: String,
    },

    #[error("Bet {bet_id} is already settled ({state})")]
    AlreadySettled { bet_id: String, state: BetState },

    #[error("Bet {bet_id} has a non-positive wager: {amount}")]
    InvalidAmount { bet_id: String, amount: Decimal },

    #[error("Arithmetic overflow while settling player {0}")]
    Overflow(String),
}

/// Errors surfaced by the round controller.
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("Round not found: {0}")]
    RoundNotFound(String),

    #[error("Settlement already in flight for round {0}")]
    InFlight(String),

    #[error("Round {round_id} shares players with round {pending_round}, whose settlement is not yet persisted")]
    Blocked {
        round_id: String,
        pending_round: String,
    },

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("Upstream state error: {0:#}")]
    Upstream(anyhow::Error),

    #[error("Persistence failed for {record}: {source:#}")]
    Persistence {
        record: String,
        #[source]
        source: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
