//! In-memory market source and alert sink for integration testing.
//!
//! `MockSource` returns a fixed set of markets, counts fetches, and can be
//! forced to fail. `CaptureSink` records every alert it is handed, or
//! rejects them all while switched off.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arbscan::engine::alerter::AlertSink;
use arbscan::platforms::MarketSource;
use arbscan::types::{Market, OpportunityRecord};

/// A deterministic market source.
pub struct MockSource {
    name: String,
    markets: Mutex<Vec<Market>>,
    fetches: AtomicUsize,
    /// If set, every fetch returns this error.
    force_error: Mutex<Option<String>>,
}

impl MockSource {
    pub fn new(name: &str, markets: Vec<Market>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            markets: Mutex::new(markets),
            fetches: AtomicUsize::new(0),
            force_error: Mutex::new(None),
        })
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Replace the quoted markets, e.g. to move a price between scans.
    pub fn set_markets(&self, markets: Vec<Market>) {
        *self.markets.lock().unwrap() = markets;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketSource for MockSource {
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        Ok(self.markets.lock().unwrap().iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Alert sink that keeps everything it receives.
#[derive(Default)]
pub struct CaptureSink {
    received: Mutex<Vec<OpportunityRecord>>,
    rejecting: AtomicBool,
}

impl CaptureSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn received(&self) -> Vec<OpportunityRecord> {
        self.received.lock().unwrap().clone()
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }
}

#[async_trait]
impl AlertSink for CaptureSink {
    async fn send(&self, record: &OpportunityRecord) -> Result<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(anyhow!("capture sink offline"));
        }
        self.received.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn channel(&self) -> &str {
        "capture"
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn polymarket(id: &str, title: &str, yes: Decimal, no: Decimal) -> Market {
    Market::new("polymarket", id, title, yes, no)
        .with_url(format!("https://polymarket.com/event/{id}"))
}

pub fn kalshi(id: &str, title: &str, yes: Decimal, no: Decimal) -> Market {
    Market::new("kalshi", id, title, yes, no)
}
