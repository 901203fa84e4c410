//! Mock store for integration testing.
//!
//! Provides a deterministic `RoundSource` + `SettlementStore`
//! implementation that holds rounds, players and bets in memory, records
//! every write in order, and can be told to fail writes.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use croupier::storage::{RoundSource, SettlementStore};
use croupier::types::*;

/// One write received by the store, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Bet(String),
    Player(String),
    Round(String),
}

/// An in-memory table for deterministic testing.
///
/// All state is in-memory and fully controllable from test code.
#[derive(Default)]
pub struct MockStore {
    rounds: Mutex<Vec<Round>>,
    players: Mutex<HashMap<String, Player>>,
    seats: Mutex<Vec<(String, String)>>,
    bets: Mutex<Vec<Bet>>,
    writes: Mutex<Vec<Write>>,
    /// Remaining writes that will fail before writes succeed again.
    fail_writes: Mutex<u32>,
    /// If set, writes to this record id always fail.
    fail_record: Mutex<Option<String>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_round(&self, round: Round) {
        self.rounds.lock().unwrap().push(round);
    }

    pub fn resolve(&self, round_id: &str, winning_number: u8) {
        let mut rounds = self.rounds.lock().unwrap();
        let round = rounds.iter_mut().find(|r| r.id == round_id).unwrap();
        round.winning_number = Some(Outcome(winning_number));
    }

    pub fn add_player(&self, id: &str, balance: Decimal) {
        self.players
            .lock()
            .unwrap()
            .insert(id.to_string(), Player::new(id, balance));
    }

    pub fn seat(&self, round_id: &str, player_id: &str) {
        self.seats
            .lock()
            .unwrap()
            .push((round_id.to_string(), player_id.to_string()));
    }

    pub fn place(&self, bet: Bet) {
        self.bets.lock().unwrap().push(bet);
    }

    /// Fail the next `n` writes, whatever they are.
    pub fn fail_next_writes(&self, n: u32) {
        *self.fail_writes.lock().unwrap() = n;
    }

    /// Fail every write to the record with this id until cleared.
    pub fn fail_record(&self, id: &str) {
        *self.fail_record.lock().unwrap() = Some(id.to_string());
    }

    pub fn clear_failures(&self) {
        *self.fail_writes.lock().unwrap() = 0;
        *self.fail_record.lock().unwrap() = None;
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn balance(&self, player_id: &str) -> Decimal {
        self.players.lock().unwrap()[player_id].balance
    }

    pub fn bet(&self, bet_id: &str) -> Bet {
        self.bets
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == bet_id)
            .cloned()
            .unwrap()
    }

    pub fn round(&self, round_id: &str) -> Round {
        self.rounds
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == round_id)
            .cloned()
            .unwrap()
    }

    fn check_write(&self, id: &str) -> Result<()> {
        if self.fail_record.lock().unwrap().as_deref() == Some(id) {
            return Err(anyhow!("write to {id} rejected"));
        }
        let mut remaining = self.fail_writes.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(anyhow!("store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RoundSource for MockStore {
    async fn fetch_round(&self, round_id: &str) -> Result<Option<Round>> {
        Ok(self
            .rounds
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == round_id)
            .cloned())
    }

    async fn fetch_players(&self, round_id: &str) -> Result<Vec<Player>> {
        let players = self.players.lock().unwrap();
        Ok(self
            .seats
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == round_id)
            .map(|(_, p)| players[p].clone())
            .collect())
    }

    async fn fetch_bets(&self, round_id: &str) -> Result<Vec<Bet>> {
        Ok(self
            .bets
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.round_id == round_id)
            .cloned()
            .collect())
    }

    async fn rounds_awaiting_settlement(&self) -> Result<Vec<String>> {
        Ok(self
            .rounds
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_resolved() && !r.is_settled())
            .map(|r| r.id.clone())
            .collect())
    }
}

#[async_trait]
impl SettlementStore for MockStore {
    async fn update_bet(&self, bet_id: &str, update: &BetUpdate) -> Result<()> {
        self.check_write(bet_id)?;
        let mut bets = self.bets.lock().unwrap();
        let bet = bets
            .iter_mut()
            .find(|b| b.id == bet_id)
            .ok_or_else(|| anyhow!("Bet not found: {bet_id}"))?;
        bet.state = update.state;
        bet.result = update.result;
        self.writes.lock().unwrap().push(Write::Bet(bet_id.to_string()));
        Ok(())
    }

    async fn update_player(&self, player_id: &str, update: &PlayerUpdate) -> Result<()> {
        self.check_write(player_id)?;
        let mut players = self.players.lock().unwrap();
        let player = players
            .get_mut(player_id)
            .ok_or_else(|| anyhow!("Player not found: {player_id}"))?;
        player.balance = update.balance;
        self.writes
            .lock()
            .unwrap()
            .push(Write::Player(player_id.to_string()));
        Ok(())
    }

    async fn mark_round_settled(&self, round_id: &str, settled_at: DateTime<Utc>) -> Result<()> {
        self.check_write(round_id)?;
        let mut rounds = self.rounds.lock().unwrap();
        let round = rounds
            .iter_mut()
            .find(|r| r.id == round_id)
            .ok_or_else(|| anyhow!("Round not found: {round_id}"))?;
        round.settled_at = Some(settled_at);
        self.writes
            .lock()
            .unwrap()
            .push(Write::Round(round_id.to_string()));
        Ok(())
    }
}
