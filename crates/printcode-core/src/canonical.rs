//! Code canonicalization shared by ingestion and search.
//!
//! Every place that turns a service code into a key goes through this module:
//! the row mapper (storage form), the ingestion pipeline (derived search keys)
//! and the search matcher (exact comparison). Keeping a single implementation
//! means a stored code and a user query can never be normalized differently.
//!
//! # Forms
//!
//! | Form | Example input | Output |
//! |------|---------------|--------|
//! | storage | `" C-0202* "` | `"C-0202"` |
//! | [`MatchMode::Numeric`] | `"C-0202"` | `"0202"` |
//! | [`MatchMode::Alphanumeric`] | `"c-240"` | `"C240"` |

use serde::Serialize;

/// Characters the source documents use to flag provisional codes.
pub const NOISE_CHARS: &[char] = &['*'];

/// Comparison policy, chosen from the shape of the user's query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Query is made only of ASCII digits. Codes compare by their digits.
    Numeric,
    /// Query contains letters or punctuation. Codes compare by their
    /// uppercased alphanumeric characters.
    Alphanumeric,
}

impl MatchMode {
    /// Pick the mode for a query. Returns `None` for an empty query.
    pub fn for_query(query: &str) -> Option<Self> {
        let q = query.trim();
        if q.is_empty() {
            None
        } else if q.chars().all(|c| c.is_ascii_digit()) {
            Some(MatchMode::Numeric)
        } else {
            Some(MatchMode::Alphanumeric)
        }
    }
}

/// Storage form of a raw code: noise characters removed, whitespace trimmed.
pub fn storage_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !NOISE_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Project a raw code into the comparison form for `mode`.
///
/// Whitespace-only input always yields the empty string.
pub fn canonicalize(raw: &str, mode: MatchMode) -> String {
    let stored = storage_code(raw);
    match mode {
        MatchMode::Numeric => stored.chars().filter(|c| c.is_ascii_digit()).collect(),
        MatchMode::Alphanumeric => stored
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(|c| c.to_uppercase())
            .collect(),
    }
}

/// Digits of a code with leading zeros removed.
///
/// This is the key the storage-side prefix filter runs against, so that
/// `"C-0202"` is found by both `"202"` and `"0202"`. A code made only of
/// zeros keeps a single `"0"`; a code without digits yields `""`.
pub fn significant_digits(raw: &str) -> String {
    let digits = canonicalize(raw, MatchMode::Numeric);
    if digits.is_empty() {
        return digits;
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Exact comparison of a stored code against a query under `mode`.
///
/// Numeric mode requires the significant digits to be equal as strings and,
/// when both fit in a `u128`, as integers. The two checks must agree.
/// Empty canonical forms never match.
pub fn codes_match(candidate: &str, query: &str, mode: MatchMode) -> bool {
    match mode {
        MatchMode::Numeric => {
            let a = canonicalize(candidate, mode);
            let b = canonicalize(query, mode);
            if a.is_empty() || b.is_empty() {
                return false;
            }
            let string_eq = significant_digits(&a) == significant_digits(&b);
            let int_eq = match (a.parse::<u128>(), b.parse::<u128>()) {
                (Ok(x), Ok(y)) => x == y,
                _ => string_eq,
            };
            string_eq && int_eq
        }
        MatchMode::Alphanumeric => {
            let a = canonicalize(candidate, mode);
            !a.is_empty() && a == canonicalize(query, mode)
        }
    }
}
