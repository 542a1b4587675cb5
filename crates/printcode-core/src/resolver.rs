//! Model aliasing.
//!
//! Several cosmetic model variants share one data set (a C6085 uses the
//! C6100 service manual). [`ModelResolver`] maps a requested model name to
//! the canonical model it is stored and queried against. It is an immutable
//! value built once from configuration and handed to the ingestion pipeline
//! and the query paths, so both always agree on the target.

use std::collections::BTreeMap;

use thiserror::Error;

/// Invalid alias table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("model alias with empty name")]
    EmptyName,

    /// An alias pointing at another alias. Aliases resolve in one step only.
    #[error("alias '{alias}' points to '{target}', which is itself an alias")]
    ChainedAlias { alias: String, target: String },

    #[error("alias '{0}' points to itself")]
    SelfAlias(String),
}

/// Immutable alias → canonical model table.
#[derive(Debug, Clone, Default)]
pub struct ModelResolver {
    aliases: BTreeMap<String, String>,
    vendor_prefixes: Vec<String>,
}

impl ModelResolver {
    /// A resolver with no aliases: every model is its own canonical target.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build a resolver from `(alias, canonical)` pairs and the vendor
    /// prefixes to strip from requested names.
    ///
    /// Alias and canonical names are normalized with the same prefix rules
    /// as lookups. Fails if an alias is empty, points to itself, or points to
    /// another alias.
    pub fn new<I, A, C>(aliases: I, vendor_prefixes: Vec<String>) -> Result<Self, ResolverError>
    where
        I: IntoIterator<Item = (A, C)>,
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let mut resolver = Self {
            aliases: BTreeMap::new(),
            vendor_prefixes,
        };

        let mut table = BTreeMap::new();
        for (alias, canonical) in aliases {
            let alias = resolver.normalize(alias.as_ref());
            let canonical = resolver.normalize(canonical.as_ref());
            if alias.is_empty() || canonical.is_empty() {
                return Err(ResolverError::EmptyName);
            }
            if alias == canonical {
                return Err(ResolverError::SelfAlias(alias));
            }
            table.insert(alias, canonical);
        }

        for (alias, target) in &table {
            if table.contains_key(target) {
                return Err(ResolverError::ChainedAlias {
                    alias: alias.clone(),
                    target: target.clone(),
                });
            }
        }

        resolver.aliases = table;
        Ok(resolver)
    }

    /// Trim and strip vendor prefixes from a requested model name.
    pub fn normalize(&self, requested: &str) -> String {
        let mut name = requested.trim().to_string();
        for prefix in &self.vendor_prefixes {
            let p = prefix.trim();
            if p.is_empty() {
                continue;
            }
            if let Some(rest) = name.strip_prefix(p) {
                name = rest.trim().to_string();
            }
        }
        name
    }

    /// Canonical model for `requested`. Total: unknown models resolve to
    /// their normalized selves.
    pub fn resolve(&self, requested: &str) -> String {
        let name = self.normalize(requested);
        match self.aliases.get(&name) {
            Some(canonical) => canonical.clone(),
            None => name,
        }
    }

    /// Whether `model` (after normalization) is a configured alias.
    pub fn is_alias(&self, model: &str) -> bool {
        self.aliases.contains_key(&self.normalize(model))
    }

    /// Configured aliases of `canonical`, in name order.
    pub fn aliases_of(&self, canonical: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|(_, c)| c.as_str() == canonical)
            .map(|(a, _)| a.as_str())
            .collect()
    }
}
