//! Settlement calculator: resolves every bet of a finished round.
//!
//! Pure and synchronous: given the round, owned snapshots of its players
//! and bets, and the rule tables, it returns the fully settled records or
//! an error. Nothing is written anywhere; publishing and persistence are
//! the caller's job (see `engine::controller`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::rules::RuleTables;
use crate::types::{Bet, BetState, Outcome, Player, Round, SettlementError};

// ---------------------------------------------------------------------------
// Settlement result
// ---------------------------------------------------------------------------

/// Aggregate figures for one settled round, from the house's side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub bets_won: usize,
    pub bets_lost: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_wagered: Decimal,
    /// Winnings credited to players (stakes excluded).
    #[serde(with = "rust_decimal::serde::str")]
    pub total_paid_out: Decimal,
    /// Stakes forfeited on losing bets.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_forfeited: Decimal,
}

impl SettlementSummary {
    /// Net result for the house: forfeited stakes minus winnings paid.
    pub fn house_net(&self) -> Decimal {
        self.total_forfeited - self.total_paid_out
    }
}

/// The settled state every bet and player of a round should reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub round_id: String,
    pub winning_number: Outcome,
    /// Settled bets, grouped by player in player order.
    pub bets: Vec<Bet>,
    /// Every input player, in input order, with the round's delta applied.
    pub players: Vec<Player>,
    pub summary: SettlementSummary,
}

impl Settlement {
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn bet(&self, bet_id: &str) -> Option<&Bet> {
        self.bets.iter().find(|b| b.id == bet_id)
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Settle a round.
///
/// Returns `Ok(None)` when the round has no winning number yet; no work
/// is done in that case. Otherwise every bet is marked `WON` or `LOST`
/// with the winning number recorded on it, and every player's balance
/// moves by the signed sum of their own bets:
/// `+amount * payout` for a win, `-amount` for a loss.
///
/// Any inconsistency aborts the whole call: an unknown bet type, a bet
/// owned by a player outside `players`, a player listed twice, a bet from
/// another round, a bet that is already settled or has a non-positive
/// wager, or decimal overflow.
pub fn settle(
    round: &Round,
    mut players: Vec<Player>,
    bets: Vec<Bet>,
    rules: &RuleTables,
) -> Result<Option<Settlement>, SettlementError> {
    let Some(winning_number) = round.winning_number else {
        debug!(round_id = %round.id, "Round has no winning number, skipping settlement");
        return Ok(None);
    };

    info!(
        round_id = %round.id,
        winning_number = winning_number.value(),
        players = players.len(),
        bets = bets.len(),
        "Calculating round results"
    );

    let mut seats: HashMap<String, usize> = HashMap::with_capacity(players.len());
    for (i, player) in players.iter().enumerate() {
        if seats.insert(player.id.clone(), i).is_some() {
            return Err(SettlementError::DuplicatePlayer(player.id.clone()));
        }
    }

    let bet_count = bets.len();
    let mut by_player: Vec<Vec<Bet>> = vec![Vec::new(); players.len()];
    for bet in bets {
        if bet.round_id != round.id {
            return Err(SettlementError::RoundMismatch {
                bet_id: bet.id,
                expected: round.id.clone(),
                found: bet.round_id,
            });
        }
        if bet.state.is_settled() {
            return Err(SettlementError::AlreadySettled {
                bet_id: bet.id,
                state: bet.state,
            });
        }
        if bet.amount <= Decimal::ZERO {
            return Err(SettlementError::InvalidAmount {
                bet_id: bet.id,
                amount: bet.amount,
            });
        }
        let Some(&seat) = seats.get(&bet.player_id) else {
            return Err(SettlementError::UnknownPlayer {
                bet_id: bet.id,
                player_id: bet.player_id,
            });
        };
        by_player[seat].push(bet);
    }

    let mut summary = SettlementSummary::default();
    let mut settled = Vec::with_capacity(bet_count);

    for (player, player_bets) in players.iter_mut().zip(by_player) {
        info!(
            round_id = %round.id,
            player_id = %player.id,
            bets = player_bets.len(),
            "Reviewing player bets"
        );

        let player_id = player.id.clone();
        let overflow = || SettlementError::Overflow(player_id.clone());
        let mut total = Decimal::ZERO;

        for mut bet in player_bets {
            let rule = rules
                .rule(&bet.bet_type)
                .ok_or_else(|| SettlementError::UnknownBetType {
                    bet_id: bet.id.clone(),
                    bet_type: bet.bet_type.clone(),
                })?;

            bet.result = Some(winning_number);
            summary.total_wagered = summary
                .total_wagered
                .checked_add(bet.amount)
                .ok_or_else(overflow)?;

            let delta = if rule.covers(winning_number) {
                let winnings = bet.amount.checked_mul(rule.payout).ok_or_else(overflow)?;
                bet.state = BetState::Won;
                summary.bets_won += 1;
                summary.total_paid_out = summary
                    .total_paid_out
                    .checked_add(winnings)
                    .ok_or_else(overflow)?;
                info!(
                    bet_id = %bet.id,
                    player_id = %player.id,
                    bet_type = %bet.bet_type,
                    winnings = format!("${:.2}", winnings),
                    "Winning bet"
                );
                winnings
            } else {
                bet.state = BetState::Lost;
                summary.bets_lost += 1;
                summary.total_forfeited = summary
                    .total_forfeited
                    .checked_add(bet.amount)
                    .ok_or_else(overflow)?;
                info!(
                    bet_id = %bet.id,
                    player_id = %player.id,
                    bet_type = %bet.bet_type,
                    loss = format!("${:.2}", bet.amount),
                    "Losing bet"
                );
                -bet.amount
            };

            total = total.checked_add(delta).ok_or_else(overflow)?;
            settled.push(bet);
        }

        player.position_change = total;
        player.balance = player.balance.checked_add(total).ok_or_else(overflow)?;
    }

    info!(
        round_id = %round.id,
        won = summary.bets_won,
        lost = summary.bets_lost,
        wagered = format!("${:.2}", summary.total_wagered),
        house_net = format!("${:.2}", summary.house_net()),
        "Round results calculated"
    );

    Ok(Some(Settlement {
        round_id: round.id.clone(),
        winning_number,
        bets: settled,
        players,
        summary,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
