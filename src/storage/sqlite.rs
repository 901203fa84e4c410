//! SQLite-backed round source and settlement store.
//!
//! Money is stored as decimal text so balances round-trip exactly.
//! Every settlement write is a single `UPDATE … WHERE id = ?` statement,
//! which SQLite applies atomically.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use super::{RoundSource, SettlementStore};
use crate::types::{Bet, BetType, BetUpdate, Outcome, Player, PlayerUpdate, Round};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS rounds (
        id TEXT PRIMARY KEY,
        winning_number INTEGER,
        settled_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS players (
        id TEXT PRIMARY KEY,
        available_funds TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS round_players (
        round_id TEXT NOT NULL REFERENCES rounds(id),
        player_id TEXT NOT NULL REFERENCES players(id),
        PRIMARY KEY (round_id, player_id)
    )",
    "CREATE TABLE IF NOT EXISTS bets (
        id TEXT PRIMARY KEY,
        round_id TEXT NOT NULL REFERENCES rounds(id),
        player_id TEXT NOT NULL REFERENCES players(id),
        bet TEXT NOT NULL,
        amount TEXT NOT NULL,
        result INTEGER,
        state TEXT NOT NULL DEFAULT 'PENDING'
    )",
    "CREATE INDEX IF NOT EXISTS bets_round ON bets (round_id)",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a database URL (e.g. `sqlite://croupier.db`), creating
    /// the file if it does not exist.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;
        info!(url, "Connected to settlement database");
        Ok(Self { pool })
    }

    /// A private in-memory database. One connection, never recycled, so
    /// the data lives as long as the store.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        debug!("Schema up to date");
        Ok(())
    }

    // -- Seeding (round lifecycle side) ---------------------------------

    pub async fn insert_round(&self, round: &Round) -> Result<()> {
        sqlx::query("INSERT INTO rounds (id, winning_number, settled_at) VALUES (?, ?, ?)")
            .bind(&round.id)
            .bind(round.winning_number.map(|n| i64::from(n.value())))
            .bind(round.settled_at)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert round {}", round.id))?;
        Ok(())
    }

    /// Record the winning number of an open round.
    pub async fn resolve_round(&self, round_id: &str, winning_number: Outcome) -> Result<()> {
        let done = sqlx::query(
            "UPDATE rounds SET winning_number = ? WHERE id = ? AND winning_number IS NULL",
        )
        .bind(i64::from(winning_number.value()))
        .bind(round_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to resolve round {round_id}"))?;

        if done.rows_affected() == 0 {
            bail!("Round {round_id} not found or already resolved");
        }
        Ok(())
    }

    pub async fn insert_player(&self, player: &Player) -> Result<()> {
        sqlx::query("INSERT INTO players (id, available_funds) VALUES (?, ?)")
            .bind(&player.id)
            .bind(player.balance.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert player {}", player.id))?;
        Ok(())
    }

    /// Seat a player in a round.
    pub async fn join_round(&self, round_id: &str, player_id: &str) -> Result<()> {
        sqlx::query("INSERT INTO round_players (round_id, player_id) VALUES (?, ?)")
            .bind(round_id)
            .bind(player_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to seat player {player_id} in round {round_id}"))?;
        Ok(())
    }

    pub async fn insert_bet(&self, bet: &Bet) -> Result<()> {
        sqlx::query(
            "INSERT INTO bets (id, round_id, player_id, bet, amount, result, state)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&bet.id)
        .bind(&bet.round_id)
        .bind(&bet.player_id)
        .bind(bet.bet_type.as_str())
        .bind(bet.amount.to_string())
        .bind(bet.result.map(|n| i64::from(n.value())))
        .bind(bet.state.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert bet {}", bet.id))?;
        Ok(())
    }

    pub async fn fetch_player(&self, player_id: &str) -> Result<Option<Player>> {
        let row = sqlx::query("SELECT id, available_funds FROM players WHERE id = ?")
            .bind(player_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch player {player_id}"))?;
        row.as_ref().map(player_from_row).transpose()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn outcome_from_column(value: Option<i64>) -> Result<Option<Outcome>> {
    value
        .map(|n| {
            u8::try_from(n)
                .map(Outcome)
                .with_context(|| format!("Winning number out of range: {n}"))
        })
        .transpose()
}

fn decimal_from_column(value: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Invalid decimal in {column}: {value}"))
}

fn round_from_row(row: &SqliteRow) -> Result<Round> {
    Ok(Round {
        id: row.try_get("id")?,
        winning_number: outcome_from_column(row.try_get("winning_number")?)?,
        settled_at: row.try_get::<Option<DateTime<Utc>>, _>("settled_at")?,
    })
}

fn player_from_row(row: &SqliteRow) -> Result<Player> {
    let funds: String = row.try_get("available_funds")?;
    Ok(Player::new(
        row.try_get::<String, _>("id")?,
        decimal_from_column(&funds, "available_funds")?,
    ))
}

fn bet_from_row(row: &SqliteRow) -> Result<Bet> {
    let amount: String = row.try_get("amount")?;
    let state: String = row.try_get("state")?;
    Ok(Bet {
        id: row.try_get("id")?,
        player_id: row.try_get("player_id")?,
        round_id: row.try_get("round_id")?,
        bet_type: BetType(row.try_get("bet")?),
        amount: decimal_from_column(&amount, "amount")?,
        result: outcome_from_column(row.try_get("result")?)?,
        state: state.parse()?,
    })
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl RoundSource for SqliteStore {
    async fn fetch_round(&self, round_id: &str) -> Result<Option<Round>> {
        let row = sqlx::query("SELECT id, winning_number, settled_at FROM rounds WHERE id = ?")
            .bind(round_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch round {round_id}"))?;
        row.as_ref().map(round_from_row).transpose()
    }

    async fn fetch_players(&self, round_id: &str) -> Result<Vec<Player>> {
        let rows = sqlx::query(
            "SELECT p.id, p.available_funds
             FROM round_players rp JOIN players p ON p.id = rp.player_id
             WHERE rp.round_id = ?
             ORDER BY rp.rowid",
        )
        .bind(round_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch players for round {round_id}"))?;
        rows.iter().map(player_from_row).collect()
    }

    async fn fetch_bets(&self, round_id: &str) -> Result<Vec<Bet>> {
        let rows = sqlx::query(
            "SELECT id, round_id, player_id, bet, amount, result, state
             FROM bets WHERE round_id = ? ORDER BY rowid",
        )
        .bind(round_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch bets for round {round_id}"))?;
        rows.iter().map(bet_from_row).collect()
    }

    async fn rounds_awaiting_settlement(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM rounds
             WHERE winning_number IS NOT NULL AND settled_at IS NULL
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list rounds awaiting settlement")?;
        Ok(ids)
    }
}

#[async_trait]
impl SettlementStore for SqliteStore {
    async fn update_bet(&self, bet_id: &str, update: &BetUpdate) -> Result<()> {
        let done = sqlx::query("UPDATE bets SET state = ?, result = ? WHERE id = ?")
            .bind(update.state.as_str())
            .bind(update.result.map(|n| i64::from(n.value())))
            .bind(bet_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update bet {bet_id}"))?;

        if done.rows_affected() == 0 {
            bail!("Bet not found: {bet_id}");
        }
        Ok(())
    }

    async fn update_player(&self, player_id: &str, update: &PlayerUpdate) -> Result<()> {
        let done = sqlx::query("UPDATE players SET available_funds = ? WHERE id = ?")
            .bind(update.balance.to_string())
            .bind(player_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update player {player_id}"))?;

        if done.rows_affected() == 0 {
            bail!("Player not found: {player_id}");
        }
        Ok(())
    }

    async fn mark_round_settled(&self, round_id: &str, settled_at: DateTime<Utc>) -> Result<()> {
        let done = sqlx::query(
            "UPDATE rounds SET settled_at = ? WHERE id = ? AND winning_number IS NOT NULL",
        )
        .bind(settled_at)
        .bind(round_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to mark round {round_id} settled"))?;

        if done.rows_affected() == 0 {
            bail!("Round not found or unresolved: {round_id}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
