//! Rule tables: which pockets each bet type covers and what it pays.
//!
//! Two lookups are exposed: `coverage` (bet type → winning pockets) and
//! `payout` (bet type → net multiplier applied to a winning wager). Both
//! are built once at startup, from JSON files or from the built-in
//! single-zero layout, and are never mutated afterwards. Share them with
//! `Arc<RuleTables>`.

pub mod single_zero;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use tracing::info;

use crate::types::{BetType, Outcome};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A rule table that cannot be used for settlement.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("Failed to parse {table} table: {source}")]
    Parse {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Bet type '{0}' has coverage but no payout")]
    MissingPayout(BetType),

    #[error("Bet type '{0}' has a payout but no coverage")]
    MissingCoverage(BetType),

    #[error("Bet type '{bet_type}' has a negative payout: {payout}")]
    NegativePayout { bet_type: BetType, payout: Decimal },

    #[error("Bet type '{0}' covers no outcomes")]
    EmptyCoverage(BetType),

    #[error("Bet type '{bet_type}' covers {outcome}, which is not on the wheel")]
    OutcomeOutOfRange { bet_type: BetType, outcome: u8 },
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Coverage and payout for a single bet type.
#[derive(Debug, Clone, PartialEq)]
pub struct BetRule {
    pub coverage: BTreeSet<Outcome>,
    /// Net odds: a winning wager of `a` returns `a * payout`.
    pub payout: Decimal,
}

impl BetRule {
    pub fn covers(&self, outcome: Outcome) -> bool {
        self.coverage.contains(&outcome)
    }
}

/// Immutable coverage + payout tables keyed by bet type.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTables {
    rules: BTreeMap<BetType, BetRule>,
}

impl RuleTables {
    /// Build tables from separate coverage and payout maps.
    ///
    /// Both maps must describe exactly the same set of bet types, every
    /// payout must be non-negative and every coverage set must be a
    /// non-empty subset of the wheel.
    pub fn new(
        coverage: HashMap<BetType, BTreeSet<Outcome>>,
        mut payouts: HashMap<BetType, Decimal>,
    ) -> Result<Self, RulesError> {
        let mut rules = BTreeMap::new();

        for (bet_type, outcomes) in coverage {
            let payout = payouts
                .remove(&bet_type)
                .ok_or_else(|| RulesError::MissingPayout(bet_type.clone()))?;
            rules.insert(bet_type, BetRule { coverage: outcomes, payout });
        }

        if let Some(orphan) = payouts.into_keys().min() {
            return Err(RulesError::MissingCoverage(orphan));
        }

        let tables = Self { rules };
        tables.validate()?;
        Ok(tables)
    }

    /// Parse the two JSON documents (`{"red": [1, 3, …]}` and
    /// `{"red": 1}`) into validated tables.
    pub fn from_json(coverage_json: &str, payouts_json: &str) -> Result<Self, RulesError> {
        let coverage: HashMap<BetType, BTreeSet<Outcome>> = serde_json::from_str(coverage_json)
            .map_err(|source| RulesError::Parse { table: "coverage", source })?;
        let payouts: HashMap<BetType, Decimal> = serde_json::from_str(payouts_json)
            .map_err(|source| RulesError::Parse { table: "payout", source })?;
        Self::new(coverage, payouts)
    }

    /// Load tables from a pair of JSON files.
    pub fn load(coverage_path: &str, payouts_path: &str) -> Result<Self> {
        let coverage = fs::read_to_string(coverage_path)
            .with_context(|| format!("Failed to read coverage table: {coverage_path}"))?;
        let payouts = fs::read_to_string(payouts_path)
            .with_context(|| format!("Failed to read payout table: {payouts_path}"))?;

        let tables = Self::from_json(&coverage, &payouts)
            .with_context(|| format!("Invalid rule tables ({coverage_path}, {payouts_path})"))?;

        info!(
            bet_types = tables.len(),
            coverage_path, payouts_path, "Rule tables loaded"
        );
        Ok(tables)
    }

    /// The standard single-zero layout (see [`single_zero`]).
    pub fn single_zero() -> Self {
        Self {
            rules: single_zero::rules(),
        }
    }

    /// Check the invariants `new` enforces.
    pub fn validate(&self) -> Result<(), RulesError> {
        for (bet_type, rule) in &self.rules {
            if rule.payout < Decimal::ZERO {
                return Err(RulesError::NegativePayout {
                    bet_type: bet_type.clone(),
                    payout: rule.payout,
                });
            }
            if rule.coverage.is_empty() {
                return Err(RulesError::EmptyCoverage(bet_type.clone()));
            }
            if let Some(out) = rule.coverage.iter().find(|o| o.value() > Outcome::MAX) {
                return Err(RulesError::OutcomeOutOfRange {
                    bet_type: bet_type.clone(),
                    outcome: out.value(),
                });
            }
        }
        Ok(())
    }

    pub fn rule(&self, bet_type: &BetType) -> Option<&BetRule> {
        self.rules.get(bet_type)
    }

    /// Pockets that win for `bet_type`, or `None` if the type is unknown.
    pub fn coverage(&self, bet_type: &BetType) -> Option<&BTreeSet<Outcome>> {
        self.rules.get(bet_type).map(|r| &r.coverage)
    }

    /// Net payout multiplier for `bet_type`, or `None` if the type is unknown.
    pub fn payout(&self, bet_type: &BetType) -> Option<Decimal> {
        self.rules.get(bet_type).map(|r| r.payout)
    }

    /// Bet types in label order.
    pub fn bet_types(&self) -> impl Iterator<Item = &BetType> {
        self.rules.keys()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
