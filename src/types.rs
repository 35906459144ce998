//! Shared types for the ARBSCAN engine.
//!
//! These types form the data model used across all modules. Platform
//! clients produce `Market`s, the matcher turns them into `MatchedPair`s,
//! and the calculator turns pairs into `ArbitrageOpportunity`s.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// One quoted binary contract on one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Source identifier: "polymarket" | "kalshi" | "predictit" | ...
    pub source: String,
    /// Identifier on the source (condition id, ticker, ...).
    pub market_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Price to buy YES, in (0, 1).
    pub yes_price: Decimal,
    /// Price to buy NO, in (0, 1). Need not sum to 1 with `yes_price`.
    pub no_price: Decimal,
    #[serde(default)]
    pub yes_bid: Option<Decimal>,
    #[serde(default)]
    pub yes_ask: Option<Decimal>,
    #[serde(default)]
    pub no_bid: Option<Decimal>,
    #[serde(default)]
    pub no_ask: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
    #[serde(default)]
    pub liquidity: Option<Decimal>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (Yes: ${:.2}, No: ${:.2})",
            self.source, self.title, self.yes_price, self.no_price,
        )
    }
}

impl Market {
    /// Minimal constructor; optional fields start empty.
    pub fn new(
        source: impl Into<String>,
        market_id: impl Into<String>,
        title: impl Into<String>,
        yes_price: Decimal,
        no_price: Decimal,
    ) -> Self {
        Self {
            source: source.into(),
            market_id: market_id.into(),
            title: title.into(),
            description: None,
            yes_price,
            no_price,
            yes_bid: None,
            yes_ask: None,
            no_bid: None,
            no_ask: None,
            volume: None,
            liquidity: None,
            end_date: None,
            url: None,
        }
    }

    /// Builder-style link setter.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Price to back the given side.
    pub fn price(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.yes_price,
            Side::No => self.no_price,
        }
    }

    /// Reject markets whose prices fall outside the open interval (0, 1).
    pub fn validate(&self) -> Result<(), ArbError> {
        for (side, price) in [(Side::Yes, self.yes_price), (Side::No, self.no_price)] {
            if !is_probability(price) {
                return Err(ArbError::InvalidMarketData {
                    market_id: self.key(),
                    reason: format!("{side} price {price} outside (0, 1)"),
                });
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// `source:market_id`, unique across sources.
    pub fn key(&self) -> String {
        format!("{}:{}", self.source, self.market_id)
    }

    /// Human-facing source name ("polymarket" -> "Polymarket").
    pub fn source_label(&self) -> String {
        let mut chars = self.source.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Helper to build a test/sample market with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Market::new(
            "polymarket",
            "0xabc",
            "Will Bitcoin reach $100k in 2025?",
            dec!(0.40),
            dec!(0.62),
        )
        .with_url("https://polymarket.com/event/bitcoin-100k")
    }
}

/// True iff `p` lies strictly between 0 and 1.
pub fn is_probability(p: Decimal) -> bool {
    p > Decimal::ZERO && p < Decimal::ONE
}

/// True iff `fee` lies in [0, 1).
pub fn is_fee_rate(fee: Decimal) -> bool {
    fee >= Decimal::ZERO && fee < Decimal::ONE
}

/// Convert an `f64` coming off the wire into a `Decimal`.
pub fn d(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Outcome side of a binary contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// How the YES outcome on source A relates to the YES outcome on source B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// YES means the same real-world outcome on both sources.
    Aligned,
    /// YES on A is NO on B (one title is the negation of the other).
    Inverted,
    /// Text alone cannot tell; no hedge may be computed.
    Unknown,
}

impl Polarity {
    /// Whether backing `side_a` on A and `side_b` on B covers both outcomes.
    pub fn is_hedge(&self, side_a: Side, side_b: Side) -> bool {
        match self {
            Polarity::Aligned => side_a != side_b,
            Polarity::Inverted => side_a == side_b,
            Polarity::Unknown => false,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Aligned => write!(f, "aligned"),
            Polarity::Inverted => write!(f, "inverted"),
            Polarity::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Matched pair
// ---------------------------------------------------------------------------

/// One market from source A matched to one market from source B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub market_a: Market,
    pub market_b: Market,
    /// Position of `market_a` in the list handed to the matcher.
    pub index_a: usize,
    /// Position of `market_b` in the list handed to the matcher.
    pub index_b: usize,
    /// Fuzzy match score, 0–100.
    pub score: f64,
    pub polarity: Polarity,
}

impl MatchedPair {
    /// Override the polarity when event metadata settles it.
    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }
}

impl fmt::Display for MatchedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' <-> '{}' (score={:.1}, {})",
            self.market_a.title, self.market_b.title, self.score, self.polarity,
        )
    }
}

// ---------------------------------------------------------------------------
// Arbitrage opportunity
// ---------------------------------------------------------------------------

/// A fee-adjusted, risk-free stake split across the two markets of a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub pair: MatchedPair,
    pub side_a: Side,
    pub side_b: Side,
    pub stake_a: Decimal,
    pub stake_b: Decimal,
    /// Net profit if the side backed on A wins.
    pub profit_if_a_wins: Decimal,
    /// Net profit if the side backed on B wins.
    pub profit_if_b_wins: Decimal,
    /// min(profit_if_a_wins, profit_if_b_wins)
    pub guaranteed_profit: Decimal,
    pub total_investment: Decimal,
    pub roi_percent: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    pub fn price_a(&self) -> Decimal {
        self.pair.market_a.price(self.side_a)
    }

    pub fn price_b(&self) -> Decimal {
        self.pair.market_b.price(self.side_b)
    }

    /// "Bet $X on SIDE (SourceA), Bet $Y on SIDE (SourceB)"
    pub fn recommendation(&self) -> String {
        format!(
            "Bet ${:.2} on {} ({}), Bet ${:.2} on {} ({})",
            self.stake_a.round_dp(2),
            self.side_a,
            self.pair.market_a.source_label(),
            self.stake_b.round_dp(2),
            self.side_b,
            self.pair.market_b.source_label(),
        )
    }

    /// Flatten into the record handed to alerting/logging collaborators.
    pub fn to_record(&self) -> OpportunityRecord {
        let a = &self.pair.market_a;
        let b = &self.pair.market_b;
        OpportunityRecord {
            event: a.title.clone(),
            match_score: (self.pair.score * 100.0).round() / 100.0,
            source_a: a.source.clone(),
            source_b: b.source.clone(),
            market_id_a: a.market_id.clone(),
            market_id_b: b.market_id.clone(),
            source_a_yes_prob: a.yes_price.round_dp(4),
            source_a_no_prob: a.no_price.round_dp(4),
            source_b_yes_prob: b.yes_price.round_dp(4),
            source_b_no_prob: b.no_price.round_dp(4),
            side_a: self.side_a,
            side_b: self.side_b,
            recommendation: self.recommendation(),
            total_investment: self.total_investment.round_dp(2),
            guaranteed_profit: self.guaranteed_profit.round_dp(2),
            roi_percent: self.roi_percent.round_dp(2),
            timestamp: self.timestamp,
            link_a: a.url.clone().unwrap_or_else(|| "N/A".to_string()),
            link_b: b.url.clone().unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

impl fmt::Display for ArbitrageOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | profit=${:.2} roi={:.2}% | score={:.1}",
            self.pair.market_a.title,
            self.recommendation(),
            self.guaranteed_profit,
            self.roi_percent,
            self.pair.score,
        )
    }
}

/// Flat, serialisable shape of an opportunity for alerts and the JSON log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub event: String,
    pub match_score: f64,
    pub source_a: String,
    pub source_b: String,
    pub market_id_a: String,
    pub market_id_b: String,
    pub source_a_yes_prob: Decimal,
    pub source_a_no_prob: Decimal,
    pub source_b_yes_prob: Decimal,
    pub source_b_no_prob: Decimal,
    pub side_a: Side,
    pub side_b: Side,
    pub recommendation: String,
    pub total_investment: Decimal,
    pub guaranteed_profit: Decimal,
    pub roi_percent: Decimal,
    pub timestamp: DateTime<Utc>,
    pub link_a: String,
    pub link_b: String,
}

/// Tolerance for "equal profit in both branches": one cent.
pub const PROFIT_EPSILON: Decimal = dec!(0.01);

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for ARBSCAN.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArbError {
    #[error("Invalid market data ({market_id}): {reason}")]
    InvalidMarketData { market_id: String, reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Degenerate arithmetic: {0}")]
    ArithmeticDegenerate(String),

    #[error("Platform error ({platform}): {message}")]
    Platform { platform: String, message: String },

    #[error("Alert delivery failed ({channel}): {message}")]
    Alert { channel: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_display() {
        assert_eq!(format!("{}", Side::Yes), "YES");
        assert_eq!(format!("{}", Side::No), "NO");
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Yes.opposite(), Side::No);
        assert_eq!(Side::No.opposite(), Side::Yes);
    }

    #[test]
    fn test_market_validate_ok() {
        assert!(Market::sample().validate().is_ok());
    }

    #[test]
    fn test_market_validate_rejects_bounds() {
        for (yes, no) in [
            (dec!(0), dec!(0.5)),
            (dec!(1), dec!(0.5)),
            (dec!(0.5), dec!(0)),
            (dec!(0.5), dec!(1.2)),
            (dec!(-0.1), dec!(0.5)),
        ] {
            let m = Market::new("kalshi", "T", "t", yes, no);
            assert!(
                matches!(m.validate(), Err(ArbError::InvalidMarketData { .. })),
                "yes={yes} no={no} should be rejected"
            );
        }
    }

    #[test]
    fn test_market_prices_need_not_sum_to_one() {
        let m = Market::new("kalshi", "T", "t", dec!(0.45), dec!(0.60));
        assert!(m.is_valid());
    }

    #[test]
    fn test_market_display() {
        let s = format!("{}", Market::sample());
        assert_eq!(s, "polymarket: Will Bitcoin reach $100k in 2025? (Yes: $0.40, No: $0.62)");
    }

    #[test]
    fn test_source_label() {
        assert_eq!(Market::sample().source_label(), "Polymarket");
        let mut m = Market::sample();
        m.source = String::new();
        assert_eq!(m.source_label(), "");
    }

    #[test]
    fn test_polarity_hedges() {
        assert!(Polarity::Aligned.is_hedge(Side::Yes, Side::No));
        assert!(!Polarity::Aligned.is_hedge(Side::Yes, Side::Yes));
        assert!(Polarity::Inverted.is_hedge(Side::No, Side::No));
        assert!(!Polarity::Inverted.is_hedge(Side::No, Side::Yes));
        assert!(!Polarity::Unknown.is_hedge(Side::Yes, Side::No));
    }

    #[test]
    fn test_fee_and_probability_domains() {
        assert!(is_fee_rate(dec!(0)));
        assert!(is_fee_rate(dec!(0.99)));
        assert!(!is_fee_rate(dec!(1)));
        assert!(!is_fee_rate(dec!(-0.01)));
        assert!(!is_probability(dec!(0)));
        assert!(is_probability(dec!(0.0001)));
    }

    #[test]
    fn test_opportunity_record_shape() {
        let a = Market::sample();
        let b = Market::new("kalshi", "BTC-100K", "Bitcoin to reach $100,000", dec!(0.47), dec!(0.55));
        let opp = ArbitrageOpportunity {
            pair: MatchedPair {
                market_a: a,
                market_b: b,
                index_a: 0,
                index_b: 0,
                score: 88.8888,
                polarity: Polarity::Aligned,
            },
            side_a: Side::Yes,
            side_b: Side::No,
            stake_a: dec!(416.2011),
            stake_b: dec!(583.7989),
            profit_if_a_wins: dec!(28.0168),
            profit_if_b_wins: dec!(28.0168),
            guaranteed_profit: dec!(28.0168),
            total_investment: dec!(1000),
            roi_percent: dec!(2.80168),
            timestamp: Utc::now(),
        };

        let rec = opp.to_record();
        assert_eq!(rec.event, "Will Bitcoin reach $100k in 2025?");
        assert_eq!(
            rec.recommendation,
            "Bet $416.20 on YES (Polymarket), Bet $583.80 on NO (Kalshi)"
        );
        assert_eq!(rec.guaranteed_profit, dec!(28.02));
        assert_eq!(rec.roi_percent, dec!(2.80));
        assert_eq!(rec.match_score, 88.89);
        assert_eq!(rec.link_b, "N/A");
        assert!(rec.link_a.contains("polymarket.com"));

        let json = serde_json::to_value(&rec).unwrap();
        for field in ["event", "recommendation", "guaranteed_profit", "total_investment", "timestamp"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn test_market_serialization_roundtrip() {
        let m = Market::sample();
        let json = serde_json::to_string(&m).unwrap();
        let back: Market = serde_json::from_str(&json).unwrap();
        assert_eq!(back.market_id, m.market_id);
        assert_eq!(back.yes_price, m.yes_price);
    }

    #[test]
    fn test_error_display() {
        let e = ArbError::InvalidMarketData {
            market_id: "kalshi:T".into(),
            reason: "YES price 0 outside (0, 1)".into(),
        };
        assert_eq!(
            e.to_string(),
            "Invalid market data (kalshi:T): YES price 0 outside (0, 1)"
        );
    }
}
