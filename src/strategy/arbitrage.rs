//! Fee-adjusted arbitrage detection and stake sizing.
//!
//! For a side priced at `P` with platform fee `f`, a winning stake `B`
//! returns `B / P` gross and `(B / P - B) * (1 - f)` net profit. The
//! effective-return multiplier is `r = (1 - f) / P`, and a complementary
//! pair of bets is a true arbitrage iff `1/r_A + 1/r_B < 1`.
//!
//! When one exists, the budget `T` is split so that the net profit is the
//! same whichever side wins:
//!
//! ```text
//! g_X          = (1/P_X - 1) * (1 - f_X)
//! profit_A     = stake_A * g_A - stake_B
//! profit_B     = stake_B * g_B - stake_A
//! stake_A      = T * (1 + g_B) / (2 + g_A + g_B)
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::ScanParams;
use crate::types::{
    is_fee_rate, ArbError, ArbitrageOpportunity, Market, MatchedPair, Polarity, Side,
    PROFIT_EPSILON,
};

/// Every way of backing one side on A and one side on B.
pub const SIDE_COMBINATIONS: [(Side, Side); 4] = [
    (Side::Yes, Side::No),
    (Side::No, Side::Yes),
    (Side::Yes, Side::Yes),
    (Side::No, Side::No),
];

/// Outcome of assessing one matched pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// A guaranteed profit at or above the floor.
    Opportunity(Box<ArbitrageOpportunity>),
    /// Every hedging combination has `1/r_A + 1/r_B >= 1`.
    NoArbitrage {
        /// Smallest combined value seen, if any combination was a hedge.
        best_combined: Option<Decimal>,
    },
    /// Arbitrage exists but pays less than the configured minimum.
    BelowProfitFloor { profit: Decimal, floor: Decimal },
    /// The pair's outcome polarity is unknown, so no hedge can be built.
    PolarityUnresolved,
}

/// Stake split that equalises profit across both resolution branches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StakeSplit {
    pub stake_a: Decimal,
    pub stake_b: Decimal,
    pub profit_if_a_wins: Decimal,
    pub profit_if_b_wins: Decimal,
}

impl StakeSplit {
    pub fn guaranteed_profit(&self) -> Decimal {
        self.profit_if_a_wins.min(self.profit_if_b_wins)
    }
}

/// Stateless arbitrage calculator. Identical inputs give identical outputs.
pub struct ArbitrageCalculator;

impl ArbitrageCalculator {
    /// Evaluate a pair, stamping any opportunity with the current time.
    pub fn evaluate(
        pair: &MatchedPair,
        params: &ScanParams,
    ) -> Result<Option<ArbitrageOpportunity>, ArbError> {
        Self::evaluate_at(pair, params, Utc::now())
    }

    /// Evaluate a pair with an explicit detection timestamp.
    pub fn evaluate_at(
        pair: &MatchedPair,
        params: &ScanParams,
        at: DateTime<Utc>,
    ) -> Result<Option<ArbitrageOpportunity>, ArbError> {
        match Self::assess(pair, params, at)? {
            Assessment::Opportunity(opp) => Ok(Some(*opp)),
            _ => Ok(None),
        }
    }

    /// Full assessment of a pair, including why no opportunity was emitted.
    pub fn assess(
        pair: &MatchedPair,
        params: &ScanParams,
        at: DateTime<Utc>,
    ) -> Result<Assessment, ArbError> {
        pair.market_a.validate()?;
        pair.market_b.validate()?;
        Self::check_fee(&pair.market_a, params.fee_a)?;
        Self::check_fee(&pair.market_b, params.fee_b)?;
        if params.total_budget_usd <= Decimal::ZERO {
            return Err(ArbError::InvalidParameter(format!(
                "total budget {} must be positive",
                params.total_budget_usd
            )));
        }
        if params.min_profit_usd < Decimal::ZERO {
            return Err(ArbError::InvalidParameter(format!(
                "minimum profit {} must not be negative",
                params.min_profit_usd
            )));
        }

        if pair.polarity == Polarity::Unknown {
            return Ok(Assessment::PolarityUnresolved);
        }

        // Pick the hedging combination with the largest margin
        let mut best: Option<(Side, Side, Decimal)> = None;
        for (side_a, side_b) in SIDE_COMBINATIONS {
            if !pair.polarity.is_hedge(side_a, side_b) {
                continue;
            }
            let combined = Self::combined_value(
                pair.market_a.price(side_a),
                params.fee_a,
                pair.market_b.price(side_b),
                params.fee_b,
            )?;
            debug!(
                a = %pair.market_a.key(),
                b = %pair.market_b.key(),
                sides = format!("{side_a}/{side_b}"),
                combined = %combined.round_dp(6),
                "Side combination evaluated"
            );
            if best.map_or(true, |(_, _, c)| combined < c) {
                best = Some((side_a, side_b, combined));
            }
        }

        let (side_a, side_b, combined) = match best {
            Some(b) if b.2 < Decimal::ONE => b,
            other => {
                return Ok(Assessment::NoArbitrage {
                    best_combined: other.map(|b| b.2),
                })
            }
        };

        let price_a = pair.market_a.price(side_a);
        let price_b = pair.market_b.price(side_b);
        let split = Self::equalize(
            params.total_budget_usd,
            Self::net_odds(price_a, params.fee_a)?,
            Self::net_odds(price_b, params.fee_b)?,
        )?;

        let profit = split.guaranteed_profit();
        if profit < params.min_profit_usd {
            debug!(
                a = %pair.market_a.key(),
                b = %pair.market_b.key(),
                profit = format!("${:.2}", profit),
                floor = format!("${:.2}", params.min_profit_usd),
                "Arbitrage below profit floor"
            );
            return Ok(Assessment::BelowProfitFloor {
                profit,
                floor: params.min_profit_usd,
            });
        }

        let total = split.stake_a + split.stake_b;
        let roi_percent = profit / total * dec!(100);

        debug!(
            a = %pair.market_a.key(),
            b = %pair.market_b.key(),
            sides = format!("{side_a}/{side_b}"),
            combined = %combined.round_dp(6),
            stake_a = format!("${:.2}", split.stake_a),
            stake_b = format!("${:.2}", split.stake_b),
            profit = format!("${:.2}", profit),
            "Arbitrage sized"
        );

        Ok(Assessment::Opportunity(Box::new(ArbitrageOpportunity {
            pair: pair.clone(),
            side_a,
            side_b,
            stake_a: split.stake_a,
            stake_b: split.stake_b,
            profit_if_a_wins: split.profit_if_a_wins,
            profit_if_b_wins: split.profit_if_b_wins,
            guaranteed_profit: profit,
            total_investment: total,
            roi_percent,
            timestamp: at,
        })))
    }

    /// Effective-return multiplier `r = (1 - f) / P`.
    pub fn effective_return(price: Decimal, fee: Decimal) -> Result<Decimal, ArbError> {
        let r = (Decimal::ONE - fee)
            .checked_div(price)
            .ok_or_else(|| degenerate(format!("effective return at price {price}")))?;
        if r <= Decimal::ZERO {
            return Err(degenerate(format!(
                "non-positive effective return at price {price}, fee {fee}"
            )));
        }
        Ok(r)
    }

    /// `1/r_A + 1/r_B`; arbitrage exists iff this is below 1.
    pub fn combined_value(
        price_a: Decimal,
        fee_a: Decimal,
        price_b: Decimal,
        fee_b: Decimal,
    ) -> Result<Decimal, ArbError> {
        let inv_a = Self::inverse_return(price_a, fee_a)?;
        let inv_b = Self::inverse_return(price_b, fee_b)?;
        inv_a
            .checked_add(inv_b)
            .ok_or_else(|| degenerate("combined value overflow".to_string()))
    }

    /// `P / (1 - f)`, i.e. `1 / r`.
    fn inverse_return(price: Decimal, fee: Decimal) -> Result<Decimal, ArbError> {
        let keep = Decimal::ONE - fee;
        if keep <= Decimal::ZERO {
            return Err(degenerate(format!("fee {fee} leaves no return")));
        }
        price
            .checked_div(keep)
            .ok_or_else(|| degenerate(format!("inverse return at price {price}, fee {fee}")))
    }

    /// Net profit per unit stake on a win: `(1/P - 1) * (1 - f)`, which is
    /// the effective return less the kept stake, `r - (1 - f)`.
    pub fn net_odds(price: Decimal, fee: Decimal) -> Result<Decimal, ArbError> {
        Self::effective_return(price, fee)?
            .checked_sub(Decimal::ONE - fee)
            .ok_or_else(|| degenerate(format!("net odds at price {price}, fee {fee}")))
    }

    /// Closed-form budget split that equalises both branches' profit.
    ///
    /// Rejects splits that would need clamping into `[0, budget]`, that do
    /// not equalise within one cent, or that leave no positive profit.
    pub fn equalize(budget: Decimal, odds_a: Decimal, odds_b: Decimal) -> Result<StakeSplit, ArbError> {
        let overflow = || degenerate("stake split overflow".to_string());

        let numerator = budget
            .checked_mul(Decimal::ONE + odds_b)
            .ok_or_else(overflow)?;
        let denominator = dec!(2)
            .checked_add(odds_a)
            .and_then(|v| v.checked_add(odds_b))
            .ok_or_else(overflow)?;
        if denominator <= Decimal::ZERO {
            return Err(degenerate(format!("split denominator {denominator}")));
        }
        let raw_a = numerator.checked_div(denominator).ok_or_else(overflow)?;

        let stake_a = raw_a.clamp(Decimal::ZERO, budget);
        if stake_a != raw_a {
            return Err(degenerate(format!(
                "stake {raw_a} outside [0, {budget}]"
            )));
        }
        let stake_b = budget - stake_a;

        let profit_if_a_wins = stake_a
            .checked_mul(odds_a)
            .and_then(|v| v.checked_sub(stake_b))
            .ok_or_else(overflow)?;
        let profit_if_b_wins = stake_b
            .checked_mul(odds_b)
            .and_then(|v| v.checked_sub(stake_a))
            .ok_or_else(overflow)?;

        if (profit_if_a_wins - profit_if_b_wins).abs() > PROFIT_EPSILON {
            return Err(degenerate(format!(
                "branch profits {profit_if_a_wins} and {profit_if_b_wins} differ"
            )));
        }

        let split = StakeSplit {
            stake_a,
            stake_b,
            profit_if_a_wins,
            profit_if_b_wins,
        };
        if split.guaranteed_profit() <= Decimal::ZERO {
            return Err(degenerate(format!(
                "no positive profit (best branch {:.4})",
                split.guaranteed_profit()
            )));
        }
        Ok(split)
    }

    fn check_fee(market: &Market, fee: Decimal) -> Result<(), ArbError> {
        if is_fee_rate(fee) {
            Ok(())
        } else {
            Err(ArbError::InvalidMarketData {
                market_id: market.key(),
                reason: format!("fee {fee} outside [0, 1)"),
            })
        }
    }
}

fn degenerate(reason: String) -> ArbError {
    ArbError::ArithmeticDegenerate(reason)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
