//! Cross-source market matcher.
//!
//! Scores every title in list A against every title in list B, keeps the
//! candidates at or above the threshold, and assigns them greedily from
//! the highest score down so that each market ends up in at most one pair.

use std::collections::HashSet;
use tracing::{debug, info};

use super::similarity::{has_negation, normalize_title, sort_key, IndelScore};
use crate::types::{Market, MatchedPair, Polarity};

/// A scored (A, B) candidate before assignment.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    index_a: usize,
    index_b: usize,
    score: f64,
    polarity: Polarity,
}

/// Title prepared once per market: scoring key plus negation flag.
struct PreparedTitle {
    index: usize,
    key: String,
    negated: bool,
}

/// Pairs markets describing the same event across two sources.
pub struct MarketMatcher;

impl MarketMatcher {
    /// Match `list_a` against `list_b`, one-to-one.
    ///
    /// `threshold` is an inclusive lower bound on the 0–100 score. Markets
    /// with invalid prices or titles that normalise to nothing never become
    /// candidates.
    pub fn find_matches(list_a: &[Market], list_b: &[Market], threshold: u8) -> Vec<MatchedPair> {
        debug_assert!(threshold <= 100, "match threshold {threshold} exceeds 100");
        let prepared_a = Self::prepare(list_a);
        let prepared_b = Self::prepare(list_b);

        // Dense |A| x |B| scoring pass, keeping only candidates >= threshold
        let mut candidates: Vec<Candidate> = Vec::new();
        for a in &prepared_a {
            for b in &prepared_b {
                let score = IndelScore::between(&a.key, &b.key);
                if score.meets(threshold) {
                    candidates.push(Candidate {
                        index_a: a.index,
                        index_b: b.index,
                        score: score.percent(),
                        polarity: Self::polarity(a, b),
                    });
                }
            }
        }
        let candidate_count = candidates.len();

        // Stable sort keeps input order among equal scores
        candidates.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut used_a: HashSet<usize> = HashSet::new();
        let mut used_b: HashSet<usize> = HashSet::new();
        let mut pairs = Vec::new();

        for c in candidates {
            if used_a.contains(&c.index_a) || used_b.contains(&c.index_b) {
                continue;
            }
            used_a.insert(c.index_a);
            used_b.insert(c.index_b);

            let market_a = &list_a[c.index_a];
            let market_b = &list_b[c.index_b];

            debug!(
                score = format!("{:.1}", c.score),
                a = %market_a.title,
                b = %market_b.title,
                polarity = %c.polarity,
                "Match accepted"
            );

            pairs.push(MatchedPair {
                market_a: market_a.clone(),
                market_b: market_b.clone(),
                index_a: c.index_a,
                index_b: c.index_b,
                score: c.score,
                polarity: c.polarity,
            });
        }

        info!(
            markets_a = list_a.len(),
            markets_b = list_b.len(),
            candidates = candidate_count,
            pairs = pairs.len(),
            threshold,
            "Market matching complete"
        );

        pairs
    }

    /// Normalise every valid title once, skipping ones that cannot match.
    fn prepare(markets: &[Market]) -> Vec<PreparedTitle> {
        markets
            .iter()
            .enumerate()
            .filter_map(|(index, m)| {
                if let Err(e) = m.validate() {
                    debug!(error = %e, "Skipping invalid market in matcher");
                    return None;
                }
                let normalized = normalize_title(&m.title);
                if normalized.is_empty() {
                    debug!(market = %m.key(), "Skipping market with empty title");
                    return None;
                }
                Some(PreparedTitle {
                    index,
                    key: sort_key(&normalized),
                    negated: has_negation(&normalized),
                })
            })
            .collect()
    }

    /// Aligned unless exactly one title is phrased as a negation.
    fn polarity(a: &PreparedTitle, b: &PreparedTitle) -> Polarity {
        if a.negated == b.negated {
            Polarity::Aligned
        } else {
            Polarity::Unknown
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
