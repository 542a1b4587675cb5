//! Error-code and DIP-switch lookup.
//!
//! Lookups resolve the requested model through the [`ModelResolver`], so an
//! alias and its canonical model return the same rows. Error-code search
//! runs in two passes: a loose prefix filter in storage on the derived
//! search keys, then (unless `exact` is off) the exact matcher in memory.
//! The prefix pass always returns a superset of the exact matches, so the
//! limit is applied after exact filtering.
//!
//! Codes whose `faulty_part_isolation` text names DIP switches
//! ("DipSW 3-5") carry the referenced switch rows of the same model.

use anyhow::Result;
use serde::Serialize;

use printcode_core::matcher::{loose_prefix, retain_exact};
use printcode_core::models::{StoredDipSwitch, StoredErrorCode};
use printcode_core::resolver::ModelResolver;
use printcode_core::store::{CatalogStore, DipSwitchQuery, ErrorCodeQuery};
use printcode_core::switch_refs::switch_refs;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// One error code with the DIP switches its isolation text references.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorCodeHit {
    #[serde(flatten)]
    pub error: StoredErrorCode,
    pub dip_switches: Vec<StoredDipSwitch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorSearchResult {
    pub requested: String,
    pub model: String,
    /// Whether a printer row exists for the resolved model.
    pub registered: bool,
    pub results: Vec<ErrorCodeHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DipSwitchResult {
    pub requested: String,
    pub model: String,
    pub results: Vec<StoredDipSwitch>,
}

/// Search the error codes of `model`. An empty `code` lists every code.
pub async fn search_error_codes(
    store: &dyn CatalogStore,
    resolver: &ModelResolver,
    model: &str,
    code: &str,
    exact: bool,
    limit: i64,
) -> Result<ErrorSearchResult> {
    let requested = resolver.normalize(model);
    let resolved = resolver.resolve(&requested);

    let printer = store.find_printer(&resolved).await?;
    if printer.is_none() {
        return Ok(ErrorSearchResult {
            requested,
            model: resolved,
            registered: false,
            results: Vec::new(),
        });
    }

    let key = loose_prefix(code);
    let filtering = exact && key.is_some();
    let query = ErrorCodeQuery {
        model: &resolved,
        key,
        limit: if filtering { None } else { Some(limit) },
    };
    let mut codes = store.query_error_codes(&query).await?;
    if filtering {
        codes = retain_exact(codes, code);
        codes.truncate(limit.max(0) as usize);
    }

    let results = attach_switches(store, &resolved, codes).await?;

    Ok(ErrorSearchResult {
        requested,
        model: resolved,
        registered: true,
        results,
    })
}

async fn attach_switches(
    store: &dyn CatalogStore,
    model: &str,
    codes: Vec<StoredErrorCode>,
) -> Result<Vec<ErrorCodeHit>> {
    let refs: Vec<Vec<(i64, i64)>> = codes
        .iter()
        .map(|c| {
            c.record
                .faulty_part_isolation
                .as_deref()
                .map(switch_refs)
                .unwrap_or_default()
        })
        .collect();

    let switches = if refs.iter().any(|r| !r.is_empty()) {
        store
            .query_dip_switches(&DipSwitchQuery {
                model,
                ..Default::default()
            })
            .await?
    } else {
        Vec::new()
    };

    Ok(codes
        .into_iter()
        .zip(refs)
        .map(|(error, refs)| {
            let dip_switches = refs
                .iter()
                .filter_map(|(sw, bit)| {
                    switches
                        .iter()
                        .find(|s| s.record.switch_number == *sw && s.record.bit_number == *bit)
                        .cloned()
                })
                .collect();
            ErrorCodeHit {
                error,
                dip_switches,
            }
        })
        .collect())
}

/// DIP switches of `model`, optionally narrowed to one switch or bit.
pub async fn lookup_dip_switches(
    store: &dyn CatalogStore,
    resolver: &ModelResolver,
    model: &str,
    switch_number: Option<i64>,
    bit_number: Option<i64>,
) -> Result<DipSwitchResult> {
    let requested = resolver.normalize(model);
    let resolved = resolver.resolve(&requested);
    let results = store
        .query_dip_switches(&DipSwitchQuery {
            model: &resolved,
            switch_number,
            bit_number,
        })
        .await?;
    Ok(DipSwitchResult {
        requested,
        model: resolved,
        results,
    })
}

/// `pcode search`: print matching error codes.
pub async fn run_search(
    config: &Config,
    model: &str,
    code: Option<&str>,
    exact: bool,
    limit: Option<i64>,
) -> Result<()> {
    let limit = limit.unwrap_or(config.search.default_limit);
    if limit < 1 {
        anyhow::bail!("--limit must be >= 1");
    }

    let resolver = config.resolver()?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let found = search_error_codes(
        &store,
        &resolver,
        model,
        code.unwrap_or_default(),
        exact,
        limit,
    )
    .await?;
    pool.close().await;

    if !found.registered {
        println!("Unknown model: {} (resolved to {})", found.requested, found.model);
        return Ok(());
    }
    if found.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    if found.requested != found.model {
        println!("{} → {}", found.requested, found.model);
        println!();
    }

    for (i, hit) in found.results.iter().enumerate() {
        let rec = &hit.error.record;
        println!("{}. [{}] {}", i + 1, rec.code, rec.classification.as_deref().unwrap_or("-"));
        print_field("cause", &rec.cause);
        print_field("measures", &rec.measures);
        print_field("solution", &rec.solution);
        print_field("estimated abnormal parts", &rec.estimated_abnormal_parts);
        print_field("correction", &rec.correction);
        print_field("faulty part isolation", &rec.faulty_part_isolation);
        print_field("note", &rec.note);
        for sw in &hit.dip_switches {
            println!(
                "    DipSW {}-{}: {} (default {})",
                sw.record.switch_number,
                sw.record.bit_number,
                sw.record.function_name.as_deref().unwrap_or("-"),
                sw.record.default_val.as_deref().unwrap_or("-"),
            );
        }
        println!();
    }

    Ok(())
}

/// `pcode dipsw`: print DIP-switch settings.
pub async fn run_dipsw(
    config: &Config,
    model: &str,
    switch_number: Option<i64>,
    bit_number: Option<i64>,
) -> Result<()> {
    let resolver = config.resolver()?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let found = lookup_dip_switches(&store, &resolver, model, switch_number, bit_number).await?;
    pool.close().await;

    if found.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for sw in &found.results {
        let rec = &sw.record;
        println!(
            "DipSW {}-{}  {}",
            rec.switch_number,
            rec.bit_number,
            rec.function_name.as_deref().unwrap_or("-")
        );
        print_field("0", &rec.setting_0);
        print_field("1", &rec.setting_1);
        print_field("default", &rec.default_val);
    }

    Ok(())
}

fn print_field(label: &str, value: &Option<String>) {
    if let Some(v) = value {
        println!("    {}: {}", label, v);
    }
}
