//! Kalshi integration.
//!
//! Reads open markets from the trade API v2 with cursor pagination.
//! Prices arrive in integer cents (1–99) and are converted to (0, 1).
//! Login is optional: with credentials configured the client obtains a
//! bearer token once and reuses it for every request.
//!
//! API docs: https://trading-api.readme.io/reference

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{api_error, parse_end_date, MarketSource};
use crate::types::Market;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const PLATFORM_NAME: &str = "kalshi";
pub const DEFAULT_API_URL: &str = "https://trading-api.kalshi.com/trade-api/v2";

/// Kalshi caps a page at 200 markets.
const PAGE_SIZE: usize = 200;

/// Email/password pair resolved from the environment.
pub struct KalshiCredentials {
    pub email: String,
    pub password: Secret<String>,
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarketsPage {
    #[serde(default)]
    markets: Vec<serde_json::Value>,
    #[serde(default)]
    cursor: Option<String>,
}

/// One entry of `GET /markets`. Prices are in cents.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct KalshiMarket {
    pub ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub rules_primary: Option<String>,
    #[serde(default)]
    pub market_type: Option<String>,
    #[serde(default)]
    pub yes_bid: Option<i64>,
    #[serde(default)]
    pub yes_ask: Option<i64>,
    #[serde(default)]
    pub no_bid: Option<i64>,
    #[serde(default)]
    pub no_ask: Option<i64>,
    #[serde(default)]
    pub last_price: Option<i64>,
    #[serde(default)]
    pub volume: Option<i64>,
    #[serde(default)]
    pub open_interest: Option<i64>,
    #[serde(default)]
    pub close_time: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KalshiClient {
    http: Client,
    api_url: String,
    credentials: Option<KalshiCredentials>,
    token: RwLock<Option<Secret<String>>>,
}

impl KalshiClient {
    pub fn new(api_url: &str, credentials: Option<KalshiCredentials>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("arbscan/0.1")
            .build()
            .context("Failed to build Kalshi HTTP client")?;

        if credentials.is_none() {
            warn!("Kalshi credentials not provided, fetching unauthenticated");
        }

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            credentials,
            token: RwLock::new(None),
        })
    }

    /// Log in once if credentials are configured. Failure is logged and the
    /// client carries on unauthenticated.
    async fn ensure_token(&self) {
        let Some(creds) = &self.credentials else {
            return;
        };
        if self.token.read().await.is_some() {
            return;
        }

        match self.login(creds).await {
            Ok(token) => {
                *self.token.write().await = Some(token);
                info!("Authenticated with Kalshi");
            }
            Err(e) => warn!(error = %e, "Kalshi login failed, continuing unauthenticated"),
        }
    }

    async fn login(&self, creds: &KalshiCredentials) -> Result<Secret<String>> {
        let url = format!("{}/login", self.api_url);
        let resp = self
            .http
            .post(&url)
            .json(&LoginRequest {
                email: &creds.email,
                password: creds.password.expose_secret(),
            })
            .send()
            .await
            .context("Kalshi login request failed")?;

        if !resp.status().is_success() {
            return Err(api_error(PLATFORM_NAME, resp.status(), "login rejected").into());
        }

        let body: LoginResponse = resp
            .json()
            .await
            .context("Failed to parse Kalshi login response")?;
        body.token
            .map(Secret::new)
            .context("Kalshi login returned no token")
    }

    async fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token.read().await.as_ref() {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    async fn fetch_page(&self, cursor: Option<&str>, page_size: usize) -> Result<MarketsPage> {
        let url = format!("{}/markets", self.api_url);
        let mut query = vec![
            ("limit", page_size.to_string()),
            ("status", "open".to_string()),
        ];
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }
        debug!(cursor = cursor.unwrap_or(""), page_size, "Fetching Kalshi markets page");

        let resp = self
            .authorize(self.http.get(&url).query(&query))
            .await
            .send()
            .await
            .context("Kalshi markets request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error(PLATFORM_NAME, status, &body).into());
        }

        resp.json()
            .await
            .context("Failed to parse Kalshi markets response")
    }

    /// Convert a Kalshi market into our internal Market type.
    ///
    /// Ask prices are what it costs to buy each side, so they are used when
    /// quoted; otherwise the last trade price stands in for YES and its
    /// complement for NO.
    pub fn convert_market(km: &KalshiMarket) -> Option<Market> {
        if km.ticker.is_empty() || km.title.is_empty() {
            return None;
        }
        if let Some(kind) = &km.market_type {
            if !kind.eq_ignore_ascii_case("binary") {
                return None;
            }
        }

        let last = km.last_price.and_then(cents);
        let yes_price = km.yes_ask.and_then(cents).or(last)?;
        let no_price = km
            .no_ask
            .and_then(cents)
            .or_else(|| last.map(|p| Decimal::ONE - p))?;

        let title = match km.subtitle.as_deref() {
            Some(sub) if !sub.is_empty() && sub != km.title => format!("{}: {}", km.title, sub),
            _ => km.title.clone(),
        };

        let mut market = Market::new(PLATFORM_NAME, km.ticker.clone(), title, yes_price, no_price)
            .with_url(format!("https://kalshi.com/markets/{}", km.ticker));
        market.description = km.rules_primary.clone().filter(|s| !s.is_empty());
        market.yes_bid = km.yes_bid.and_then(cents);
        market.yes_ask = km.yes_ask.and_then(cents);
        market.no_bid = km.no_bid.and_then(cents);
        market.no_ask = km.no_ask.and_then(cents);
        market.volume = km.volume.map(Decimal::from);
        market.liquidity = km.open_interest.map(Decimal::from);
        market.end_date = km.close_time.as_deref().and_then(parse_end_date);
        Some(market)
    }
}

/// Cents to a probability; 0 and 100 mean "no quote".
fn cents(value: i64) -> Option<Decimal> {
    (1..=99)
        .contains(&value)
        .then(|| Decimal::new(value, 2))
}

// ---------------------------------------------------------------------------
// MarketSource trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketSource for KalshiClient {
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>> {
        self.ensure_token().await;

        let mut markets: Vec<Market> = Vec::new();
        let mut cursor: Option<String> = None;

        while markets.len() < limit {
            let page_size = PAGE_SIZE.min(limit - markets.len());
            let page = self.fetch_page(cursor.as_deref(), page_size).await?;
            if page.markets.is_empty() {
                break;
            }

            for raw in page.markets {
                match serde_json::from_value::<KalshiMarket>(raw) {
                    Ok(km) => match Self::convert_market(&km) {
                        Some(m) => markets.push(m),
                        None => debug!(ticker = %km.ticker, "Skipping unpriced Kalshi market"),
                    },
                    Err(e) => debug!(error = %e, "Skipping unparseable Kalshi market"),
                }
            }

            cursor = page.cursor.filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        markets.truncate(limit);
        info!(count = markets.len(), "Fetched Kalshi binary markets");
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

    fn kalshi_market() -> KalshiMarket {
        KalshiMarket {
            ticker: "KXBTC-25DEC31-100K".into(),
            title: "Bitcoin to reach $100,000".into(),
            subtitle: None,
            rules_primary: Some("Resolves Yes if...".into()),
            market_type: Some("binary".into()),
            yes_bid: Some(45),
            yes_ask: Some(47),
            no_bid: Some(53),
            no_ask: Some(55),
            last_price: Some(46),
            volume: Some(12000),
            open_interest: Some(3400),
            close_time: Some("2025-12-31T23:59:00Z".into()),
        }
    }

    #[test]
    fn test_cents_conversion() {
        assert_eq!(cents(47), Some(dec!(0.47)));
        assert_eq!(cents(1), Some(dec!(0.01)));
        assert_eq!(cents(0), None);
        assert_eq!(cents(100), None);
    }

    #[test]
    fn test_convert_market_prefers_ask() {
        let m = KalshiClient::convert_market(&kalshi_market()).unwrap();
        assert_eq!(m.source, "kalshi");
        assert_eq!(m.market_id, "KXBTC-25DEC31-100K");
        assert_eq!(m.yes_price, dec!(0.47));
        assert_eq!(m.no_price, dec!(0.55));
        assert_eq!(m.yes_bid, Some(dec!(0.45)));
        assert_eq!(m.liquidity, Some(dec!(3400)));
        assert_eq!(m.url.as_deref(), Some("https://kalshi.com/markets/KXBTC-25DEC31-100K"));
        assert!(m.end_date.is_some());
        assert!(m.is_valid());
    }

    #[test]
    fn test_convert_market_last_price_fallback() {
        let mut km = kalshi_market();
        km.yes_ask = Some(0);
        km.no_ask = None;
        let m = KalshiClient::convert_market(&km).unwrap();
        assert_eq!(m.yes_price, dec!(0.46));
        assert_eq!(m.no_price, dec!(0.54));
    }

    #[test]
    fn test_convert_market_unpriced_is_dropped() {
        let mut km = kalshi_market();
        km.yes_ask = None;
        km.no_ask = None;
        km.last_price = None;
        assert!(KalshiClient::convert_market(&km).is_none());
    }

    #[test]
    fn test_convert_market_joins_subtitle() {
        let mut km = kalshi_market();
        km.subtitle = Some("Above $100k".into());
        let m = KalshiClient::convert_market(&km).unwrap();
        assert_eq!(m.title, "Bitcoin to reach $100,000: Above $100k");

        km.subtitle = Some(km.title.clone());
        let m = KalshiClient::convert_market(&km).unwrap();
        assert_eq!(m.title, "Bitcoin to reach $100,000");
    }

    #[test]
    fn test_convert_market_skips_non_binary() {
        let mut km = kalshi_market();
        km.market_type = Some("scalar".into());
        assert!(KalshiClient::convert_market(&km).is_none());
    }

    #[test]
    fn test_markets_page_deserializes() {
        let raw = serde_json::json!({
            "markets": [{ "ticker": "FED-25MAR", "title": "Fed cuts rates in March", "yes_ask": 31, "no_ask": 71 }],
            "cursor": "abc"
        });
        let page: MarketsPage = serde_json::from_value(raw).unwrap();
        assert_eq!(page.cursor.as_deref(), Some("abc"));
        let km: KalshiMarket = serde_json::from_value(page.markets[0].clone()).unwrap();
        let m = KalshiClient::convert_market(&km).unwrap();
        assert_eq!(m.no_price, dec!(0.71));
    }

    #[test]
    fn test_client_construction() {
        let client = KalshiClient::new(DEFAULT_API_URL, None).unwrap();
        assert_eq!(client.name(), "kalshi");
    }
}
