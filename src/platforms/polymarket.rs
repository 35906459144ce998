//! Polymarket integration.
//!
//! Uses the Gamma API for market discovery. Market data is free and
//! unauthenticated; prices are already probabilities in [0, 1].
//!
//! Gamma API: https://gamma-api.polymarket.com

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};

use super::{api_error, parse_end_date, MarketSource};
use crate::types::{d, ArbError, Market};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const PLATFORM_NAME: &str = "polymarket";
pub const DEFAULT_API_URL: &str = "https://gamma-api.polymarket.com";

/// Gamma caps a page at 100 markets.
const PAGE_SIZE: usize = 100;

fn unexpected_shape() -> ArbError {
    ArbError::Platform {
        platform: PLATFORM_NAME.to_string(),
        message: "unexpected Gamma response shape".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Gamma API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GammaMarket {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "conditionId")]
    pub condition_id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, rename = "endDate")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub closed: bool,
    /// Outcome labels as a JSON string: "[\"Yes\",\"No\"]"
    #[serde(default)]
    pub outcomes: Option<String>,
    /// Outcome prices as a JSON string: "[\"0.65\",\"0.35\"]"
    #[serde(default, rename = "outcomePrices")]
    pub outcome_prices: Option<String>,
    #[serde(default, rename = "volumeNum")]
    pub volume_num: Option<f64>,
    #[serde(default, rename = "liquidityNum")]
    pub liquidity_num: Option<f64>,
    #[serde(default, rename = "bestBid")]
    pub best_bid: Option<f64>,
    #[serde(default, rename = "bestAsk")]
    pub best_ask: Option<f64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PolymarketClient {
    http: Client,
    api_url: String,
}

impl PolymarketClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("arbscan/0.1")
            .build()
            .context("Failed to build Polymarket HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch one page of open markets from the Gamma API.
    async fn fetch_page(&self, offset: usize, page_size: usize) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/markets", self.api_url);
        debug!(offset, page_size, "Fetching Polymarket markets page");

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("active", "true".to_string()),
                ("closed", "false".to_string()),
                ("limit", page_size.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await
            .context("Gamma API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error(PLATFORM_NAME, status, &body).into());
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse Gamma markets response")?;

        Ok(Self::page_items(body)?)
    }

    /// Gamma returns either a bare array or `{ "data": [...] }`.
    fn page_items(body: serde_json::Value) -> Result<Vec<serde_json::Value>, ArbError> {
        match body {
            serde_json::Value::Array(items) => Ok(items),
            serde_json::Value::Object(mut map) => match map.remove("data") {
                Some(serde_json::Value::Array(items)) => Ok(items),
                _ => Err(unexpected_shape()),
            },
            _ => Err(unexpected_shape()),
        }
    }

    /// Convert a Gamma market into our internal Market type.
    ///
    /// Returns `None` for non-binary, closed, or unpriced markets.
    pub fn convert_market(gm: &GammaMarket) -> Option<Market> {
        if gm.question.is_empty() || gm.closed {
            return None;
        }
        if !Self::is_binary(gm) {
            return None;
        }

        let market_id = if !gm.condition_id.is_empty() {
            gm.condition_id.clone()
        } else {
            gm.id.clone().filter(|id| !id.is_empty())?
        };

        let (yes_price, no_price) =
            Self::parse_outcome_prices(gm.outcome_prices.as_deref().unwrap_or(""))?;

        let slug = if gm.slug.is_empty() { &market_id } else { &gm.slug };

        let mut market = Market::new(PLATFORM_NAME, market_id.clone(), gm.question.clone(), yes_price, no_price)
            .with_url(format!("https://polymarket.com/event/{slug}"));
        market.description = gm.description.clone().filter(|s| !s.is_empty());
        market.yes_bid = gm.best_bid.map(d);
        market.yes_ask = gm.best_ask.map(d);
        market.volume = gm.volume_num.map(d);
        market.liquidity = gm.liquidity_num.map(d);
        market.end_date = gm.end_date.as_deref().and_then(parse_end_date);
        Some(market)
    }

    /// Two outcomes, judged by the label list or, failing that, the prices.
    fn is_binary(gm: &GammaMarket) -> bool {
        match gm.outcomes.as_deref().map(Self::split_list) {
            Some(labels) if !labels.is_empty() => labels.len() == 2,
            _ => gm
                .outcome_prices
                .as_deref()
                .map(|p| Self::split_list(p).len() == 2)
                .unwrap_or(false),
        }
    }

    /// Split Gamma's stringified list into trimmed, unquoted items.
    fn split_list(s: &str) -> Vec<String> {
        let cleaned = s.replace(['[', ']', '"', '\\'], "");
        cleaned
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Parse outcome prices from Gamma's string format.
    /// Handles: "[\"0.65\",\"0.35\"]", "0.65, 0.35", etc.
    pub fn parse_outcome_prices(s: &str) -> Option<(Decimal, Decimal)> {
        let parts = Self::split_list(s);
        if parts.len() >= 2 {
            let yes = parse_decimal(&parts[0])?;
            let no = parse_decimal(&parts[1])?;
            Some((yes, no))
        } else {
            None
        }
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

// ---------------------------------------------------------------------------
// MarketSource trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketSource for PolymarketClient {
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>> {
        let mut markets: Vec<Market> = Vec::new();
        let mut offset = 0;

        while markets.len() < limit {
            let page_size = PAGE_SIZE.min(limit - markets.len());
            let batch = self.fetch_page(offset, page_size).await?;
            let batch_len = batch.len();

            for raw in batch {
                match serde_json::from_value::<GammaMarket>(raw) {
                    Ok(gm) => {
                        if let Some(m) = Self::convert_market(&gm) {
                            markets.push(m);
                        }
                    }
                    Err(e) => debug!(error = %e, "Skipping unparseable Gamma market"),
                }
            }

            offset += batch_len;
            if batch_len < page_size {
                break;
            }
        }

        markets.truncate(limit);
        info!(count = markets.len(), "Fetched Polymarket binary markets");
        Ok(markets)
    }

    fn name(&self) -> &str {
        PLATFORM_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gamma(question: &str, prices: &str) -> GammaMarket {
        GammaMarket {
            id: Some("512345".into()),
            question: question.into(),
            description: Some("Resolves YES if...".into()),
            condition_id: "0xabc123".into(),
            slug: "bitcoin-100k".into(),
            end_date: Some("2026-12-31".into()),
            closed: false,
            outcomes: Some("[\"Yes\", \"No\"]".into()),
            outcome_prices: Some(prices.into()),
            volume_num: Some(50000.0),
            liquidity_num: Some(10000.0),
            best_bid: Some(0.71),
            best_ask: Some(0.73),
        }
    }

    #[test]
    fn test_parse_outcome_prices_json_format() {
        let (yes, no) = PolymarketClient::parse_outcome_prices("[\"0.65\",\"0.35\"]").unwrap();
        assert_eq!(yes, dec!(0.65));
        assert_eq!(no, dec!(0.35));
    }

    #[test]
    fn test_parse_outcome_prices_simple_format() {
        let (yes, no) = PolymarketClient::parse_outcome_prices("0.72, 0.28").unwrap();
        assert_eq!(yes, dec!(0.72));
        assert_eq!(no, dec!(0.28));
    }

    #[test]
    fn test_parse_outcome_prices_scientific() {
        let (yes, _) = PolymarketClient::parse_outcome_prices("[\"5e-4\",\"0.9995\"]").unwrap();
        assert_eq!(yes, dec!(0.0005));
    }

    #[test]
    fn test_parse_outcome_prices_rejects_short_or_garbage() {
        assert!(PolymarketClient::parse_outcome_prices("").is_none());
        assert!(PolymarketClient::parse_outcome_prices("0.50").is_none());
        assert!(PolymarketClient::parse_outcome_prices("[\"abc\",\"0.5\"]").is_none());
    }

    #[test]
    fn test_convert_market_valid() {
        let market = PolymarketClient::convert_market(&gamma(
            "Will Bitcoin hit $100k?",
            "[\"0.72\",\"0.28\"]",
        ))
        .unwrap();

        assert_eq!(market.market_id, "0xabc123");
        assert_eq!(market.source, "polymarket");
        assert_eq!(market.yes_price, dec!(0.72));
        assert_eq!(market.no_price, dec!(0.28));
        assert_eq!(market.url.as_deref(), Some("https://polymarket.com/event/bitcoin-100k"));
        assert!(market.end_date.is_some());
        assert!(market.yes_ask.is_some());
    }

    #[test]
    fn test_convert_market_falls_back_to_numeric_id() {
        let mut gm = gamma("Test?", "[\"0.5\",\"0.5\"]");
        gm.condition_id = String::new();
        let market = PolymarketClient::convert_market(&gm).unwrap();
        assert_eq!(market.market_id, "512345");

        gm.id = None;
        assert!(PolymarketClient::convert_market(&gm).is_none());
    }

    #[test]
    fn test_convert_market_skips_non_binary() {
        let mut gm = gamma("Who wins?", "[\"0.2\",\"0.3\",\"0.5\"]");
        gm.outcomes = Some("[\"A\",\"B\",\"C\"]".into());
        assert!(PolymarketClient::convert_market(&gm).is_none());
    }

    #[test]
    fn test_convert_market_skips_closed_and_unpriced() {
        let mut gm = gamma("Closed?", "[\"0.5\",\"0.5\"]");
        gm.closed = true;
        assert!(PolymarketClient::convert_market(&gm).is_none());

        let mut gm = gamma("Unpriced?", "");
        gm.outcome_prices = None;
        assert!(PolymarketClient::convert_market(&gm).is_none());
    }

    #[test]
    fn test_gamma_market_deserializes_from_api_shape() {
        let raw = serde_json::json!({
            "id": "12",
            "question": "Fed cuts rates in March?",
            "conditionId": "0xdef",
            "slug": "fed-march",
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0.31\", \"0.69\"]",
            "volume": "1234.5",
            "volumeNum": 1234.5,
            "closed": false
        });
        let gm: GammaMarket = serde_json::from_value(raw).unwrap();
        let market = PolymarketClient::convert_market(&gm).unwrap();
        assert_eq!(market.market_id, "0xdef");
        assert_eq!(market.yes_price, dec!(0.31));
    }

    #[test]
    fn test_page_items_accepts_both_shapes() {
        let bare = serde_json::json!([{ "id": "1" }, { "id": "2" }]);
        assert_eq!(PolymarketClient::page_items(bare).unwrap().len(), 2);

        let wrapped = serde_json::json!({ "data": [{ "id": "1" }] });
        assert_eq!(PolymarketClient::page_items(wrapped).unwrap().len(), 1);

        let err = PolymarketClient::page_items(serde_json::json!({ "error": "busy" })).unwrap_err();
        assert!(matches!(err, ArbError::Platform { ref platform, .. } if platform == "polymarket"));
    }

    #[test]
    fn test_client_construction() {
        let client = PolymarketClient::new("https://gamma-api.polymarket.com/").unwrap();
        assert_eq!(client.name(), "polymarket");
        assert_eq!(client.api_url, "https://gamma-api.polymarket.com");
    }
}
