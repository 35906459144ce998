//! Strategy engine: cross-source matching and fee-adjusted arbitrage.

pub mod arbitrage;
pub mod matcher;
pub mod similarity;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::types::{is_fee_rate, ArbError, ArbitrageOpportunity, MatchedPair};
use arbitrage::{ArbitrageCalculator, Assessment};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Immutable per-scan parameters handed to the matcher and calculator.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParams {
    /// Inclusive lower bound on the 0–100 match score.
    pub match_threshold: u8,
    /// Fee rate charged on net winnings by source A, in [0, 1).
    pub fee_a: Decimal,
    /// Fee rate charged on net winnings by source B, in [0, 1).
    pub fee_b: Decimal,
    /// Smallest guaranteed profit worth reporting, in USD.
    pub min_profit_usd: Decimal,
    /// Total stake split across the two legs, in USD.
    pub total_budget_usd: Decimal,
}

impl ScanParams {
    pub fn validate(&self) -> Result<(), ArbError> {
        if self.match_threshold > 100 {
            return Err(ArbError::InvalidParameter(format!(
                "match threshold {} exceeds 100",
                self.match_threshold
            )));
        }
        for (name, fee) in [("fee_a", self.fee_a), ("fee_b", self.fee_b)] {
            if !is_fee_rate(fee) {
                return Err(ArbError::InvalidParameter(format!(
                    "{name} {fee} outside [0, 1)"
                )));
            }
        }
        if self.total_budget_usd <= Decimal::ZERO {
            return Err(ArbError::InvalidParameter(format!(
                "total budget {} must be positive",
                self.total_budget_usd
            )));
        }
        if self.min_profit_usd < Decimal::ZERO {
            return Err(ArbError::InvalidParameter(format!(
                "minimum profit {} must not be negative",
                self.min_profit_usd
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// What happened to one matched pair during evaluation.
///
/// Only `Selected` carries an opportunity; every other variant records why
/// a pair was passed over so a scan can be audited afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum PairDecision {
    Selected(Box<ArbitrageOpportunity>),
    NoArbitrage {
        pair: String,
        best_combined: Option<Decimal>,
    },
    BelowProfitFloor {
        pair: String,
        profit: Decimal,
    },
    PolarityUnresolved {
        pair: String,
    },
    /// A market price or fee was out of domain.
    InvalidData {
        pair: String,
        error: ArbError,
    },
    /// Split did not converge within tolerance.
    Degenerate {
        pair: String,
        error: ArbError,
    },
}

impl PairDecision {
    pub fn opportunity(&self) -> Option<&ArbitrageOpportunity> {
        match self {
            PairDecision::Selected(opp) => Some(opp.as_ref()),
            _ => None,
        }
    }
}

/// `srcA:idA|srcB:idB`
fn pair_label(pair: &MatchedPair) -> String {
    format!("{}|{}", pair.market_a.key(), pair.market_b.key())
}

// ---------------------------------------------------------------------------
// Batch evaluation
// ---------------------------------------------------------------------------

/// Evaluate one pair and turn the outcome into a decision. Never fails.
pub fn decide(pair: &MatchedPair, params: &ScanParams, at: DateTime<Utc>) -> PairDecision {
    let label = pair_label(pair);
    match ArbitrageCalculator::assess(pair, params, at) {
        Ok(Assessment::Opportunity(opp)) => PairDecision::Selected(opp),
        Ok(Assessment::NoArbitrage { best_combined }) => {
            debug!(pair = %label, "No arbitrage");
            PairDecision::NoArbitrage {
                pair: label,
                best_combined,
            }
        }
        Ok(Assessment::BelowProfitFloor { profit, .. }) => {
            PairDecision::BelowProfitFloor { pair: label, profit }
        }
        Ok(Assessment::PolarityUnresolved) => {
            debug!(pair = %label, "Polarity unknown, skipping pair");
            PairDecision::PolarityUnresolved { pair: label }
        }
        Err(error @ ArbError::ArithmeticDegenerate(_)) => {
            debug!(pair = %label, error = %error, "Degenerate stake split");
            PairDecision::Degenerate { pair: label, error }
        }
        Err(error) => {
            warn!(pair = %label, error = %error, "Rejected pair with invalid data");
            PairDecision::InvalidData { pair: label, error }
        }
    }
}

/// Evaluate every pair in parallel.
///
/// Returns the opportunities (sorted by guaranteed profit, highest first)
/// and a decision log in the same order as `pairs`.
pub fn evaluate_pairs(
    pairs: &[MatchedPair],
    params: &ScanParams,
    at: DateTime<Utc>,
) -> (Vec<ArbitrageOpportunity>, Vec<PairDecision>) {
    let decisions: Vec<PairDecision> = pairs
        .par_iter()
        .map(|pair| decide(pair, params, at))
        .collect();

    let mut opportunities: Vec<ArbitrageOpportunity> = decisions
        .iter()
        .filter_map(PairDecision::opportunity)
        .cloned()
        .collect();
    opportunities.sort_by(|a, b| b.guaranteed_profit.cmp(&a.guaranteed_profit));

    for opp in &opportunities {
        info!(
            event = %opp.pair.market_a.title,
            recommendation = %opp.recommendation(),
            profit = format!("${:.2}", opp.guaranteed_profit),
            roi = format!("{:.2}%", opp.roi_percent),
            "Arbitrage opportunity"
        );
    }
    info!(
        pairs = pairs.len(),
        opportunities = opportunities.len(),
        "Pair evaluation complete"
    );

    (opportunities, decisions)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
