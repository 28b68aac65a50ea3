//! Description normalization.
//!
//! Bank exports stuff dates and reference numbers into the description. Those
//! are unique per transaction, so we strip them before the classifier sees the
//! text and let it generalize on merchant vocabulary instead.

use regex::Regex;
use std::sync::LazyLock;

// dd.mm.yyyy, yyyy-mm-dd, ddmmyy ... with at most one separator char between parts
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\d{2,4}.?\d{2}.?\d{2,4}\s*").expect("date pattern is valid"));

// card numbers, references, date remnants
static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4,}\s*").expect("digit-run pattern is valid"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Normalize a raw transaction description.
///
/// Empty input comes back unchanged.
pub fn normalize(description: &str) -> String {
    if description.is_empty() {
        return String::new();
    }

    let without_dates = DATE_RE.replace_all(description, "");
    let without_digits = DIGIT_RUN_RE.replace_all(&without_dates, "");
    WHITESPACE_RE
        .replace_all(&without_digits, " ")
        .trim()
        .to_lowercase()
}
