//! Alert de-duplication.
//!
//! An opportunity is identified by a fingerprint of the two markets, the
//! sides and prices taken, and the detection date. Once alerted, the same
//! fingerprint is suppressed until it falls outside the rolling window.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::ensure_parent;
use crate::types::{ArbError, ArbitrageOpportunity};

/// On-disk shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DedupFile {
    alerted: HashMap<String, DateTime<Utc>>,
}

/// Fingerprints of already-alerted opportunities with their alert time.
#[derive(Debug, Clone)]
pub struct AlertDedupStore {
    alerted: HashMap<String, DateTime<Utc>>,
    window: Duration,
}

impl AlertDedupStore {
    pub fn new(window: Duration) -> Self {
        Self {
            alerted: HashMap::new(),
            window,
        }
    }

    /// `srcA:idA|srcB:idB|SIDE@price|SIDE@price|YYYY-MM-DD`
    pub fn fingerprint(opp: &ArbitrageOpportunity) -> String {
        format!(
            "{}|{}|{}@{:.2}|{}@{:.2}|{}",
            opp.pair.market_a.key(),
            opp.pair.market_b.key(),
            opp.side_a,
            opp.price_a().round_dp(2),
            opp.side_b,
            opp.price_b().round_dp(2),
            opp.timestamp.format("%Y-%m-%d"),
        )
    }

    /// Whether the same fingerprint was already alerted inside the window.
    pub fn is_suppressed(&self, opp: &ArbitrageOpportunity, now: DateTime<Utc>) -> bool {
        let key = Self::fingerprint(opp);
        match self.alerted.get(&key) {
            Some(at) if now - *at < self.window => {
                debug!(fingerprint = %key, "Suppressing duplicate alert");
                true
            }
            _ => false,
        }
    }

    /// Mark `opp` as alerted at `now`. Call once the alert was delivered.
    pub fn record(&mut self, opp: &ArbitrageOpportunity, now: DateTime<Utc>) {
        self.alerted.insert(Self::fingerprint(opp), now);
    }

    pub fn contains(&self, opp: &ArbitrageOpportunity) -> bool {
        self.alerted.contains_key(&Self::fingerprint(opp))
    }

    /// Drop fingerprints older than the window. Returns how many went.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.alerted.len();
        let window = self.window;
        self.alerted.retain(|_, at| now - *at < window);
        before - self.alerted.len()
    }

    pub fn len(&self) -> usize {
        self.alerted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerted.is_empty()
    }

    /// Load from disk. A missing file starts an empty store.
    pub fn load(path: &Path, window: Duration) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No alert history found, starting fresh");
            return Ok(Self::new(window));
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alert history from {}", path.display()))?;
        let file: DedupFile = serde_json::from_str(&json).map_err(|e| {
            ArbError::Storage(format!("corrupt alert history {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), entries = file.alerted.len(), "Alert history loaded");
        Ok(Self {
            alerted: file.alerted,
            window,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        let file = DedupFile {
            alerted: self.alerted.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialise alert history")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write alert history to {}", path.display()))?;

        debug!(path = %path.display(), entries = self.alerted.len(), "Alert history saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
