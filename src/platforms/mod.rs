//! Market sources.
//!
//! Defines the `MarketSource` trait and provides read-only quote fetchers for:
//! - Polymarket (Gamma API, no auth)
//! - Kalshi (trade API v2, optional login)
//! - PredictIt (public market data feed)

pub mod kalshi;
pub mod polymarket;
pub mod predictit;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::types::{ArbError, Market};

/// Abstraction over a quote source.
///
/// Implementors return binary markets with prices already converted to
/// probabilities. A market that fails to parse is dropped on its own; an
/// error means the whole fetch failed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch up to `limit` open binary markets.
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>>;

    /// Source identifier, matching `Market::source`.
    fn name(&self) -> &str;
}

/// Build the configured client for `name`.
pub fn build_source(name: &str, config: &AppConfig) -> Result<Arc<dyn MarketSource>> {
    let platforms = &config.platforms;
    let source: Arc<dyn MarketSource> = match name {
        polymarket::PLATFORM_NAME => {
            Arc::new(polymarket::PolymarketClient::new(&platforms.polymarket.api_url)?)
        }
        kalshi::PLATFORM_NAME => {
            let credentials = platforms.kalshi.credentials()?;
            Arc::new(kalshi::KalshiClient::new(&platforms.kalshi.api_url, credentials)?)
        }
        predictit::PLATFORM_NAME => {
            Arc::new(predictit::PredictItClient::new(&platforms.predictit.api_url)?)
        }
        other => bail!(ArbError::Config(format!("Unknown market source: {other}"))),
    };
    Ok(source)
}

/// Error for a non-success response from `platform`.
pub(crate) fn api_error(platform: &str, status: reqwest::StatusCode, body: &str) -> ArbError {
    let message = match body.trim() {
        "" => format!("HTTP {status}"),
        body => format!("HTTP {status}: {body}"),
    };
    ArbError::Platform {
        platform: platform.to_string(),
        message,
    }
}

/// Parse the date formats the sources use: RFC 3339, naive ISO datetime,
/// or a bare date (taken as end of day UTC).
pub(crate) fn parse_end_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|naive| naive.and_utc())
}
