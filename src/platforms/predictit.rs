//! PredictIt integration.
//!
//! A single public endpoint returns every market with its contracts.
//! Only single-contract markets are plain YES/NO questions; their
//! `bestBuyYesCost` / `bestBuyNoCost` are the prices to back each side,
//! quoted in dollars per $1 share.
//!
//! API: https://www.predictit.org/api/marketdata/all

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{api_error, parse_end_date, MarketSource};
use crate::types::{d, is_probability, Market};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const PLATFORM_NAME: &str = "predictit";
pub const DEFAULT_API_URL: &str = "https://www.predictit.org/api/marketdata/all";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AllMarkets {
    #[serde(default)]
    markets: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PredictItMarket {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub contracts: Vec<PredictItContract>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PredictItContract {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date_end: Option<String>,
    #[serde(default)]
    pub last_trade_price: Option<f64>,
    #[serde(default)]
    pub best_buy_yes_cost: Option<f64>,
    #[serde(default)]
    pub best_buy_no_cost: Option<f64>,
    #[serde(default)]
    pub best_sell_yes_cost: Option<f64>,
    #[serde(default)]
    pub best_sell_no_cost: Option<f64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PredictItClient {
    http: Client,
    api_url: String,
}

impl PredictItClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (compatible; arbscan/0.1)")
            .build()
            .context("Failed to build PredictIt HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
        })
    }

    /// Convert a single-contract PredictIt market into our internal type.
    pub fn convert_market(pm: &PredictItMarket) -> Option<Market> {
        let [contract] = pm.contracts.as_slice() else {
            return None;
        };

        let title = if pm.short_name.is_empty() { &pm.name } else { &pm.short_name };
        if title.is_empty() {
            return None;
        }

        let last = contract.last_trade_price.map(d).filter(|p| is_probability(*p));
        let yes_price = contract
            .best_buy_yes_cost
            .map(d)
            .filter(|p| is_probability(*p))
            .or(last)?;
        let no_price = contract
            .best_buy_no_cost
            .map(d)
            .filter(|p| is_probability(*p))
            .or_else(|| last.map(|p| rust_decimal::Decimal::ONE - p))?;

        let id = pm.id.to_string();
        let url = pm
            .url
            .clone()
            .unwrap_or_else(|| format!("https://www.predictit.org/markets/detail/{id}"));

        let mut market = Market::new(PLATFORM_NAME, id, title.clone(), yes_price, no_price).with_url(url);
        market.description = Some(pm.name.clone()).filter(|n| !n.is_empty() && n != title);
        market.yes_ask = contract.best_buy_yes_cost.map(d);
        market.yes_bid = contract.best_sell_yes_cost.map(d);
        market.no_ask = contract.best_buy_no_cost.map(d);
        market.no_bid = contract.best_sell_no_cost.map(d);
        market.end_date = contract.date_end.as_deref().and_then(parse_end_date);
        Some(market)
    }
}

// ---------------------------------------------------------------------------
// MarketSource trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketSource for PredictItClient {
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>> {
        debug!(url = %self.api_url, "Fetching PredictIt markets");

        let resp = self
            .http
            .get(&self.api_url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("PredictIt request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                warn!("PredictIt refused the request (likely bot protection)");
            }
            return Err(api_error(PLATFORM_NAME, status, "").into());
        }

        let body: AllMarkets = resp
            .json()
            .await
            .context("Failed to parse PredictIt response")?;
        let total = body.markets.len();

        let markets: Vec<Market> = body
            .markets
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<PredictItMarket>(raw) {
                Ok(pm) => Self::convert_market(&pm),
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable PredictIt market");
                    None
                }
            })
            .take(limit)
            .collect();

        info!(total, count = markets.len(), "Fetched PredictIt binary markets");
        Ok(markets)
    }

    fn name(&self) -> &str {
        PLATFORM_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
