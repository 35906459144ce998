//! Persistence layer.
//!
//! Emitted opportunities are appended to a JSON-lines file, one
//! `OpportunityRecord` per line. Alert de-duplication state lives in
//! [`dedup`] and is saved as a single JSON document between runs.

pub mod dedup;

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::types::OpportunityRecord;

pub use dedup::AlertDedupStore;

/// Create the parent directory of `path` if it has one.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Append-only log of emitted opportunities.
#[derive(Debug, Clone)]
pub struct OpportunityLog {
    path: PathBuf,
}

impl OpportunityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records, one JSON object per line.
    pub fn append(&self, records: &[OpportunityRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        ensure_parent(&self.path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open opportunity log {}", self.path.display()))?;

        let mut buf = String::new();
        for record in records {
            let line = serde_json::to_string(record).context("Failed to serialise opportunity")?;
            buf.push_str(&line);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())
            .with_context(|| format!("Failed to write opportunity log {}", self.path.display()))?;

        debug!(path = %self.path.display(), count = records.len(), "Opportunities logged");
        Ok(())
    }

    /// Read every record back. A missing file is an empty log; corrupt
    /// lines are skipped.
    pub fn read_all(&self) -> Result<Vec<OpportunityRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open opportunity log {}", self.path.display()))?;

        let mut records = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read opportunity log")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<OpportunityRecord>(&line) {
                Ok(r) => records.push(r),
                Err(e) => warn!(line = n + 1, error = %e, "Skipping corrupt opportunity log line"),
            }
        }
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
