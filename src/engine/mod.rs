//! Core engine: settle a finished round, then publish and persist it.

pub mod settlement;
pub mod controller;

pub use controller::{RetryPolicy, RoundController, RoundOutcome, RoundReport};
pub use settlement::{settle, Settlement, SettlementSummary};
