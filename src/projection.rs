//! Live table projection.
//!
//! The in-memory view of bets and players that front-ends read from.
//! Settlement publishes its results here before persisting them; every
//! publish is an upsert keyed by record id, so re-publishing the same
//! records is harmless.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{Bet, Player};

/// Sink for settled records.
#[async_trait]
pub trait Projection: Send + Sync {
    async fn publish_bets(&self, bets: &[Bet]);

    async fn publish_players(&self, players: &[Player]);
}

/// Shared live state of the table.
#[derive(Debug, Default)]
pub struct LiveTable {
    bets: RwLock<HashMap<String, Bet>>,
    players: RwLock<HashMap<String, Player>>,
}

impl LiveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bet(&self, bet_id: &str) -> Option<Bet> {
        self.bets.read().await.get(bet_id).cloned()
    }

    pub async fn player(&self, player_id: &str) -> Option<Player> {
        self.players.read().await.get(player_id).cloned()
    }

    /// Bets of a round, ordered by id.
    pub async fn round_bets(&self, round_id: &str) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self
            .bets
            .read()
            .await
            .values()
            .filter(|b| b.round_id == round_id)
            .cloned()
            .collect();
        bets.sort_by(|a, b| a.id.cmp(&b.id));
        bets
    }

    /// All players, ordered by id.
    pub async fn players(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.read().await.values().cloned().collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
    }

    /// Sum of every player's latest position change (the table's net).
    pub async fn net_position_change(&self) -> Decimal {
        self.players
            .read()
            .await
            .values()
            .map(|p| p.position_change)
            .sum()
    }
}

#[async_trait]
impl Projection for LiveTable {
    async fn publish_bets(&self, bets: &[Bet]) {
        let mut view = self.bets.write().await;
        for bet in bets {
            view.insert(bet.id.clone(), bet.clone());
        }
        debug!(count = bets.len(), "Bets published");
    }

    async fn publish_players(&self, players: &[Player]) {
        let mut view = self.players.write().await;
        for player in players {
            view.insert(player.id.clone(), player.clone());
        }
        debug!(count = players.len(), "Players published");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
