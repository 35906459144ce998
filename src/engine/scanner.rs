//! Cross-source arbitrage scanner.
//!
//! One scan fetches both sources concurrently, drops invalid quotes,
//! matches titles across sources, evaluates every pair for fee-adjusted
//! arbitrage, and hands new opportunities to the alert and log
//! collaborators. Already-alerted opportunities are suppressed through
//! the `AlertDedupStore` the scanner owns; an opportunity is only recorded
//! there once an alert for it was delivered, so undelivered alerts are
//! retried on the next scan.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::alerter::{AlertDispatcher, DispatchSummary};
use crate::config::AppConfig;
use crate::platforms::{build_source, MarketSource};
use crate::storage::{AlertDedupStore, OpportunityLog};
use crate::strategy::matcher::MarketMatcher;
use crate::strategy::{evaluate_pairs, PairDecision, ScanParams};
use crate::types::{ArbitrageOpportunity, Market, OpportunityRecord};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of one scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub source_a: String,
    pub source_b: String,
    /// Valid markets kept from each source.
    pub markets_a: usize,
    pub markets_b: usize,
    /// Markets dropped for out-of-domain prices.
    pub invalid_markets: usize,
    pub pairs: usize,
    /// Every opportunity found, best first, including suppressed ones.
    pub opportunities: Vec<ArbitrageOpportunity>,
    pub decisions: Vec<PairDecision>,
    /// Opportunities alerted for the first time in this scan.
    pub new_alerts: Vec<OpportunityRecord>,
    /// New opportunities no sink accepted; retried next scan.
    pub undelivered: usize,
    pub suppressed: usize,
    pub delivery: DispatchSummary,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scan at {}: {} {} / {} {} markets, {} invalid, {} pairs",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.markets_a,
            self.source_a,
            self.markets_b,
            self.source_b,
            self.invalid_markets,
            self.pairs,
        )?;
        write!(
            f,
            "{} opportunities ({} new, {} suppressed",
            self.opportunities.len(),
            self.new_alerts.len(),
            self.suppressed,
        )?;
        if self.undelivered > 0 {
            write!(f, ", {} undelivered", self.undelivered)?;
        }
        write!(f, ")")?;
        for (i, opp) in self.opportunities.iter().enumerate() {
            write!(f, "\n  {}. {}", i + 1, opp)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct ArbitrageScanner {
    source_a: Arc<dyn MarketSource>,
    source_b: Arc<dyn MarketSource>,
    params: ScanParams,
    fetch_limit: usize,
    alerts: AlertDispatcher,
    log: Option<OpportunityLog>,
    dedup: AlertDedupStore,
    dedup_path: Option<PathBuf>,
}

impl ArbitrageScanner {
    pub fn new(
        source_a: Arc<dyn MarketSource>,
        source_b: Arc<dyn MarketSource>,
        params: ScanParams,
        alerts: AlertDispatcher,
    ) -> Self {
        Self {
            source_a,
            source_b,
            params,
            fetch_limit: 200,
            alerts,
            log: None,
            dedup: AlertDedupStore::new(Duration::hours(24)),
            dedup_path: None,
        }
    }

    /// Wire every collaborator from config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let params = config.scan_params()?;
        let source_a = build_source(&config.scanner.source_a, config)?;
        let source_b = build_source(&config.scanner.source_b, config)?;
        let alerts = AlertDispatcher::from_config(&config.alerts)?;

        let window = Duration::hours(config.storage.dedup_window_hours);
        let dedup = AlertDedupStore::load(&config.storage.dedup_path, window)?;

        Ok(Self::new(source_a, source_b, params, alerts)
            .with_fetch_limit(config.scanner.fetch_limit)
            .with_opportunity_log(OpportunityLog::new(&config.storage.opportunity_log))
            .with_dedup(dedup, Some(config.storage.dedup_path.clone())))
    }

    pub fn with_fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = limit;
        self
    }

    pub fn with_opportunity_log(mut self, log: OpportunityLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Replace the de-duplication store; `path` persists it after each scan.
    pub fn with_dedup(mut self, store: AlertDedupStore, path: Option<PathBuf>) -> Self {
        self.dedup = store;
        self.dedup_path = path;
        self
    }

    pub fn params(&self) -> &ScanParams {
        &self.params
    }

    pub fn dedup(&self) -> &AlertDedupStore {
        &self.dedup
    }

    pub async fn scan(&mut self) -> Result<ScanReport> {
        self.scan_at(Utc::now()).await
    }

    /// Run one scan with an explicit clock.
    pub async fn scan_at(&mut self, now: DateTime<Utc>) -> Result<ScanReport> {
        self.params.validate().context("Invalid scan parameters")?;
        info!(
            source_a = self.source_a.name(),
            source_b = self.source_b.name(),
            "Starting arbitrage scan"
        );

        // 1. Fetch both sources concurrently; a failed source is empty
        let (fetched_a, fetched_b) = tokio::join!(
            self.source_a.fetch_markets(self.fetch_limit),
            self.source_b.fetch_markets(self.fetch_limit),
        );
        let fetched_a = fetched_a.unwrap_or_else(|e| {
            warn!(source = self.source_a.name(), error = %e, "Fetch failed, continuing without");
            Vec::new()
        });
        let fetched_b = fetched_b.unwrap_or_else(|e| {
            warn!(source = self.source_b.name(), error = %e, "Fetch failed, continuing without");
            Vec::new()
        });

        // 2. Drop out-of-domain quotes
        let (markets_a, invalid_a) = Self::keep_valid(fetched_a);
        let (markets_b, invalid_b) = Self::keep_valid(fetched_b);
        info!(
            markets_a = markets_a.len(),
            markets_b = markets_b.len(),
            invalid = invalid_a + invalid_b,
            "Markets fetched"
        );

        // 3. Match and evaluate
        let pairs = MarketMatcher::find_matches(&markets_a, &markets_b, self.params.match_threshold);
        let (opportunities, decisions) = evaluate_pairs(&pairs, &self.params, now);

        // 4. Suppress repeats, alert the rest, remember what got through
        self.dedup.evict_expired(now);
        let fresh: Vec<&ArbitrageOpportunity> = opportunities
            .iter()
            .filter(|opp| !self.dedup.is_suppressed(opp, now))
            .collect();
        let suppressed = opportunities.len() - fresh.len();
        let records: Vec<OpportunityRecord> = fresh.iter().map(|opp| opp.to_record()).collect();

        let delivery = self.alerts.dispatch(&records).await;

        let mut new_alerts = Vec::with_capacity(records.len());
        let mut undelivered = 0;
        for ((opp, record), reached) in fresh.into_iter().zip(records).zip(&delivery.reached) {
            if *reached {
                self.dedup.record(opp, now);
                new_alerts.push(record);
            } else {
                warn!(event = %record.event, "Alert not delivered, will retry next scan");
                undelivered += 1;
            }
        }

        if let Some(log) = &self.log {
            if let Err(e) = log.append(&new_alerts) {
                warn!(error = %e, "Failed to append opportunity log");
            }
        }
        if let Some(path) = &self.dedup_path {
            if let Err(e) = self.dedup.save(path) {
                warn!(error = %e, "Failed to persist alert history");
            }
        }

        let report = ScanReport {
            started_at: now,
            source_a: self.source_a.name().to_string(),
            source_b: self.source_b.name().to_string(),
            markets_a: markets_a.len(),
            markets_b: markets_b.len(),
            invalid_markets: invalid_a + invalid_b,
            pairs: pairs.len(),
            opportunities,
            decisions,
            new_alerts,
            undelivered,
            suppressed,
            delivery,
        };

        info!(
            pairs = report.pairs,
            opportunities = report.opportunities.len(),
            new_alerts = report.new_alerts.len(),
            suppressed = report.suppressed,
            undelivered = report.undelivered,
            alerts_failed = report.delivery.failed,
            "Scan complete"
        );
        Ok(report)
    }

    /// Split off markets whose prices are out of domain.
    fn keep_valid(markets: Vec<Market>) -> (Vec<Market>, usize) {
        let total = markets.len();
        let valid: Vec<Market> = markets
            .into_iter()
            .filter(|m| match m.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Dropping invalid market");
                    false
                }
            })
            .collect();
        let dropped = total - valid.len();
        (valid, dropped)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
