//! Title normalisation and word-order-tolerant similarity scoring.
//!
//! Scores are on a 0–100 scale: the Indel similarity of the two titles'
//! content tokens after sorting, so "Bitcoin to reach $100,000" and
//! "Will Bitcoin reach $100k in 2025?" compare on the words they share
//! rather than on where those words sit.

/// Words that carry no event identity and are dropped before scoring.
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "will", "does", "do", "did", "is", "are", "be", "was",
    "in", "on", "at", "of", "to", "by", "for", "as",
];

/// Tokens that flip the meaning of a question.
const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "wont", "cant", "doesnt", "isnt", "fail", "fails", "without",
];

/// Lowercase, strip punctuation, collapse whitespace.
///
/// Apostrophes and digit-group commas are deleted outright (`trump's` ->
/// `trumps`, `100,000` -> `100000`); a `.` between two digits survives as
/// a decimal point; any other punctuation separates words.
pub fn normalize_title(title: &str) -> String {
    let chars: Vec<char> = title.to_lowercase().chars().collect();
    let mut out = String::with_capacity(chars.len());

    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            out.push(c);
            continue;
        }
        if c.is_whitespace() {
            out.push(' ');
            continue;
        }

        let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
        let next_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        match c {
            '\'' | '\u{2019}' => {}
            ',' if prev_digit && next_digit => {}
            '.' if prev_digit && next_digit => out.push('.'),
            _ => out.push(' '),
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokens used for scoring: filler words dropped, magnitudes expanded.
///
/// Falls back to the plain normalised tokens when a title consists only
/// of filler words, so such titles still compare against each other.
pub fn content_tokens(normalized: &str) -> Vec<String> {
    let tokens: Vec<String> = normalized
        .split_whitespace()
        .filter(|w| !FILLER_WORDS.contains(w))
        .map(expand_magnitude)
        .collect();

    if tokens.is_empty() {
        normalized.split_whitespace().map(String::from).collect()
    } else {
        tokens
    }
}

/// Whether a normalised title contains a negating token.
pub fn has_negation(normalized: &str) -> bool {
    normalized
        .split_whitespace()
        .any(|w| NEGATION_WORDS.contains(&w))
}

/// `100k` -> `100000`, `2.5m` -> `2500000`, `1bn` -> `1000000000`.
fn expand_magnitude(token: &str) -> String {
    let (number, multiplier) = if let Some(n) = token.strip_suffix("bn") {
        (n, 1_000_000_000u64)
    } else if let Some(n) = token.strip_suffix('b') {
        (n, 1_000_000_000)
    } else if let Some(n) = token.strip_suffix('m') {
        (n, 1_000_000)
    } else if let Some(n) = token.strip_suffix('k') {
        (n, 1_000)
    } else {
        return token.to_string();
    };

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return token.to_string();
    }

    match number.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            let expanded = value * multiplier as f64;
            if expanded.fract() == 0.0 && expanded < 1e18 {
                format!("{}", expanded as u64)
            } else {
                token.to_string()
            }
        }
        _ => token.to_string(),
    }
}

/// Sorted, space-joined content tokens of a normalised title.
pub fn sort_key(normalized: &str) -> String {
    let mut tokens = content_tokens(normalized);
    tokens.sort();
    tokens.join(" ")
}

/// Word-order-tolerant similarity of two *normalised* titles, 0–100.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sort_key(a), &sort_key(b))
}

/// Normalised Indel similarity: `100 * (1 - indel / (|a| + |b|))`.
pub fn ratio(a: &str, b: &str) -> f64 {
    IndelScore::between(a, b).percent()
}

/// Indel distance of two strings together with their combined length.
///
/// Kept as integers so threshold checks are exact; `percent` is only for
/// ordering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndelScore {
    pub distance: usize,
    pub total: usize,
}

impl IndelScore {
    pub fn between(a: &str, b: &str) -> Self {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let total = a.len() + b.len();
        // Indel distance = |a| + |b| - 2 * LCS
        let distance = total - 2 * lcs_len(&a, &b);
        Self { distance, total }
    }

    /// Score on the 0–100 scale. Two empty strings score 100.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (100 * (self.total - self.distance)) as f64 / self.total as f64
    }

    /// `percent() >= threshold`, decided in integer arithmetic.
    pub fn meets(&self, threshold: u8) -> bool {
        let allowed = 100usize.saturating_sub(usize::from(threshold));
        self.distance * 100 <= allowed * self.total
    }
}

/// Longest common subsequence length with a single rolling row.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diag + 1
            } else {
                above.max(row[j])
            };
            diag = above;
        }
    }
    row[b.len()]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
