//! Exact-match search over a pre-filtered candidate list.
//!
//! Search runs in two passes. The store first returns a loose superset:
//! every code for the model whose search key starts with the query's key
//! ([`loose_prefix`]). [`filter_exact`] then narrows that set to codes equal
//! to the query under the query's [`MatchMode`]. Both passes derive their
//! keys from [`crate::canonical`], so the prefix pass can never drop a code
//! the exact pass would accept.

use crate::canonical::{canonicalize, codes_match, significant_digits, MatchMode};
use crate::models::CodedRecord;

/// Storage-side prefix filter for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    /// Prefix over a code's significant digits.
    Digits(String),
    /// Prefix over a code's uppercased alphanumeric characters.
    Alnum(String),
}

impl SearchKey {
    pub fn prefix(&self) -> &str {
        match self {
            SearchKey::Digits(p) | SearchKey::Alnum(p) => p,
        }
    }
}

/// Search keys stored next to each code at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeKeys {
    pub digits_key: String,
    pub alnum_key: String,
}

impl CodeKeys {
    pub fn for_code(code: &str) -> Self {
        Self {
            digits_key: significant_digits(code),
            alnum_key: canonicalize(code, MatchMode::Alphanumeric),
        }
    }
}

/// Loose prefix for the storage query, or `None` for an empty query
/// (meaning: no code filter).
///
/// A numeric query made only of zeros keeps the key `"0"`, matching
/// [`significant_digits`].
pub fn loose_prefix(query: &str) -> Option<SearchKey> {
    match MatchMode::for_query(query)? {
        MatchMode::Numeric => Some(SearchKey::Digits(significant_digits(query))),
        MatchMode::Alphanumeric => Some(SearchKey::Alnum(canonicalize(
            query,
            MatchMode::Alphanumeric,
        ))),
    }
}

/// Keep candidates whose code equals `query` under the query's mode.
///
/// Returns every candidate, in order, when the query is blank. Pure and
/// order-preserving.
pub fn filter_exact<'a, T: CodedRecord>(candidates: &'a [T], query: &str) -> Vec<&'a T> {
    let mode = match MatchMode::for_query(query) {
        Some(mode) => mode,
        None => return candidates.iter().collect(),
    };
    let query = query.trim();
    candidates
        .iter()
        .filter(|c| codes_match(c.code(), query, mode))
        .collect()
}

/// Owned variant of [`filter_exact`].
pub fn retain_exact<T: CodedRecord>(candidates: Vec<T>, query: &str) -> Vec<T> {
    let mode = match MatchMode::for_query(query) {
        Some(mode) => mode,
        None => return candidates,
    };
    let query = query.trim();
    candidates
        .into_iter()
        .filter(|c| codes_match(c.code(), query, mode))
        .collect()
}
