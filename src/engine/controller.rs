//! Round controller: fetch → settle → publish → persist for one round.
//!
//! The controller owns the collaborators around the pure calculator:
//! it snapshots upstream state, runs `settle`, publishes the result to the
//! live projection and writes it to the durable store bets-first, then
//! players, then the round's completion record.
//!
//! At most one settlement per round is in flight at a time. When
//! persistence fails, the computed settlement is kept (in memory and in
//! the journal) and the next attempt re-persists it rather than
//! recomputing from partially updated balances.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::engine::settlement::{settle, Settlement, SettlementSummary};
use crate::projection::Projection;
use crate::rules::RuleTables;
use crate::storage::{Journal, RoundSource, SettlementStore};
use crate::types::{Outcome, Player, RoundError};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Per-record retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per record, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to a round after a settlement attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    /// Every record persisted and the completion record written.
    Settled(RoundReport),
    /// The round has no winning number yet; nothing was done.
    Unresolved,
    /// The completion record already exists; nothing was done.
    AlreadySettled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub round_id: String,
    pub winning_number: Outcome,
    pub players: usize,
    pub bets: usize,
    pub summary: SettlementSummary,
    pub settled_at: chrono::DateTime<Utc>,
    /// True when this attempt re-persisted an earlier computation.
    pub resumed: bool,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct RoundController {
    source: Arc<dyn RoundSource>,
    store: Arc<dyn SettlementStore>,
    projection: Arc<dyn Projection>,
    rules: Arc<RuleTables>,
    retry: RetryPolicy,
    journal: Option<Journal>,
    in_flight: Mutex<HashSet<String>>,
    pending: AsyncMutex<HashMap<String, Settlement>>,
}

/// Releases a round's in-flight claim on drop.
struct RoundClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    round_id: String,
}

impl Drop for RoundClaim<'_> {
    fn drop(&mut self) {
        let mut rounds = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        rounds.remove(&self.round_id);
    }
}

impl RoundController {
    pub fn new(
        source: Arc<dyn RoundSource>,
        store: Arc<dyn SettlementStore>,
        projection: Arc<dyn Projection>,
        rules: Arc<RuleTables>,
    ) -> Self {
        Self {
            source,
            store,
            projection,
            rules,
            retry: RetryPolicy::default(),
            journal: None,
            in_flight: Mutex::new(HashSet::new()),
            pending: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Rounds whose settlement is computed but not fully persisted.
    pub async fn pending_rounds(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Reload journaled settlements so their persistence can be resumed.
    ///
    /// Entries whose round already carries a completion record are stale
    /// and are dropped. Returns the number of settlements awaiting
    /// persistence afterwards.
    pub async fn recover(&self) -> anyhow::Result<usize> {
        let Some(journal) = &self.journal else {
            return Ok(0);
        };

        let mut recovered = Vec::new();
        for settlement in journal.load_all()? {
            let round = self.source.fetch_round(&settlement.round_id).await?;
            if round.as_ref().map_or(true, |r| r.is_settled()) {
                info!(round_id = %settlement.round_id, "Discarding stale journal entry");
                journal.remove(&settlement.round_id)?;
                continue;
            }
            info!(round_id = %settlement.round_id, "Recovered settlement from journal");
            recovered.push(settlement);
        }

        let mut pending = self.pending.lock().await;
        for settlement in recovered {
            pending
                .entry(settlement.round_id.clone())
                .or_insert(settlement);
        }
        Ok(pending.len())
    }

    /// Settle every round that has a winning number but no completion
    /// record, resuming parked settlements first. Each round is attempted
    /// independently; one failure does not stop the others.
    pub async fn settle_ready(&self) -> Result<Vec<(String, Result<RoundOutcome, RoundError>)>, RoundError> {
        let awaiting = self
            .source
            .rounds_awaiting_settlement()
            .await
            .map_err(RoundError::Upstream)?;

        // Parked settlements go first so the rounds they block can follow.
        let mut round_ids = self.pending_rounds().await;
        for id in awaiting {
            if !round_ids.contains(&id) {
                round_ids.push(id);
            }
        }

        let mut results = Vec::with_capacity(round_ids.len());
        for round_id in round_ids {
            let result = self.settle_round(&round_id).await;
            if let Err(e) = &result {
                error!(round_id = %round_id, error = %e, "Round settlement failed");
            }
            results.push((round_id, result));
        }
        Ok(results)
    }

    /// Settle a single round.
    pub async fn settle_round(&self, round_id: &str) -> Result<RoundOutcome, RoundError> {
        let _claim = self.claim(round_id)?;

        let parked = self.pending.lock().await.remove(round_id);
        if let Some(settlement) = parked {
            info!(round_id, "Resuming persistence of computed settlement");
            return self.commit(settlement, true).await;
        }

        let round = self
            .source
            .fetch_round(round_id)
            .await
            .map_err(RoundError::Upstream)?
            .ok_or_else(|| RoundError::RoundNotFound(round_id.to_string()))?;

        if round.is_settled() {
            info!(round_id, "Round already settled");
            return Ok(RoundOutcome::AlreadySettled);
        }
        if !round.is_resolved() {
            info!(round_id, "Round has no winning number yet");
            return Ok(RoundOutcome::Unresolved);
        }

        let players = self
            .source
            .fetch_players(round_id)
            .await
            .map_err(RoundError::Upstream)?;
        self.check_not_blocked(round_id, &players).await?;
        let bets = self
            .source
            .fetch_bets(round_id)
            .await
            .map_err(RoundError::Upstream)?;

        info!(
            round_id,
            players = players.len(),
            bets = bets.len(),
            "Starting round settlement"
        );

        match settle(&round, players, bets, &self.rules)? {
            Some(settlement) => self.commit(settlement, false).await,
            None => Ok(RoundOutcome::Unresolved),
        }
    }

    /// A parked settlement carries absolute balances for its players.
    /// Settling another round for any of them before it lands would be
    /// overwritten when it does.
    async fn check_not_blocked(&self, round_id: &str, players: &[Player]) -> Result<(), RoundError> {
        let pending = self.pending.lock().await;
        for parked in pending.values() {
            if let Some(player) = players.iter().find(|p| parked.player(&p.id).is_some()) {
                warn!(
                    round_id,
                    blocked_by = %parked.round_id,
                    player_id = %player.id,
                    "Round blocked by unpersisted settlement"
                );
                return Err(RoundError::Blocked {
                    round_id: round_id.to_string(),
                    pending_round: parked.round_id.clone(),
                });
            }
        }
        Ok(())
    }

    fn claim(&self, round_id: &str) -> Result<RoundClaim<'_>, RoundError> {
        let mut rounds = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !rounds.insert(round_id.to_string()) {
            return Err(RoundError::InFlight(round_id.to_string()));
        }
        Ok(RoundClaim {
            in_flight: &self.in_flight,
            round_id: round_id.to_string(),
        })
    }

    /// Journal, publish, then persist. Nothing is written unless the
    /// journal entry (when configured) is in place. On persistence failure
    /// the settlement is parked for the next attempt.
    async fn commit(&self, settlement: Settlement, resumed: bool) -> Result<RoundOutcome, RoundError> {
        if let Some(journal) = &self.journal {
            if let Err(source) = journal.record(&settlement) {
                error!(round_id = %settlement.round_id, error = %source, "Failed to journal settlement");
                let record = format!("journal {}", settlement.round_id);
                if resumed {
                    self.pending
                        .lock()
                        .await
                        .insert(settlement.round_id.clone(), settlement);
                }
                return Err(RoundError::Persistence { record, source });
            }
        }

        self.projection.publish_bets(&settlement.bets).await;
        self.projection.publish_players(&settlement.players).await;

        let settled_at = match self.persist(&settlement).await {
            Ok(at) => at,
            Err(e) => {
                warn!(
                    round_id = %settlement.round_id,
                    error = %e,
                    "Persistence incomplete, settlement kept for retry"
                );
                self.pending
                    .lock()
                    .await
                    .insert(settlement.round_id.clone(), settlement);
                return Err(e);
            }
        };

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.remove(&settlement.round_id) {
                warn!(round_id = %settlement.round_id, error = %e, "Failed to clear journal entry");
            }
        }

        let report = RoundReport {
            round_id: settlement.round_id,
            winning_number: settlement.winning_number,
            players: settlement.players.len(),
            bets: settlement.bets.len(),
            summary: settlement.summary,
            settled_at,
            resumed,
        };

        info!(
            round_id = %report.round_id,
            winning_number = report.winning_number.value(),
            players = report.players,
            bets = report.bets,
            house_net = format!("${:.2}", report.summary.house_net()),
            resumed,
            "Round results calculated and saved"
        );

        Ok(RoundOutcome::Settled(report))
    }

    /// Bets first, then players, then the completion record.
    async fn persist(&self, settlement: &Settlement) -> Result<chrono::DateTime<Utc>, RoundError> {
        for bet in &settlement.bets {
            let update = bet.to_update();
            self.retrying(format!("bet {}", bet.id), || {
                self.store.update_bet(&bet.id, &update)
            })
            .await?;
        }

        for player in &settlement.players {
            let update = player.to_update();
            self.retrying(format!("player {}", player.id), || {
                self.store.update_player(&player.id, &update)
            })
            .await?;
        }

        let settled_at = Utc::now();
        self.retrying(format!("round {}", settlement.round_id), || {
            self.store.mark_round_settled(&settlement.round_id, settled_at)
        })
        .await?;

        Ok(settled_at)
    }

    async fn retrying<F, Fut>(&self, record: String, mut write: F) -> Result<(), RoundError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match write().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        record = %record,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => return Err(RoundError::Persistence { record, source }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
