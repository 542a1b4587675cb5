//! Printer registry commands.
//!
//! Printer rows are the only thing ingestion does not create: a target
//! model must be registered here first. Names are normalized by the
//! resolver (vendor prefixes stripped), and alias names are refused so an
//! alias never gets a catalog of its own.

use anyhow::{bail, Result};

use printcode_core::models::Printer;
use printcode_core::resolver::ModelResolver;
use printcode_core::store::CatalogStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Register canonical printer models. Existing rows are returned unchanged.
pub async fn register_printers(
    store: &dyn CatalogStore,
    resolver: &ModelResolver,
    models: &[String],
) -> Result<Vec<Printer>> {
    let mut names = Vec::with_capacity(models.len());
    for model in models {
        let name = resolver.normalize(model);
        if name.is_empty() {
            bail!("model name must not be empty");
        }
        if resolver.is_alias(&name) {
            bail!(
                "'{}' is an alias of '{}'; register the canonical model instead",
                name,
                resolver.resolve(&name)
            );
        }
        names.push(name);
    }

    let mut printers = Vec::with_capacity(names.len());
    for name in names {
        printers.push(store.register_printer(&name).await?);
    }
    Ok(printers)
}

/// `pcode printer add`
pub async fn run_add(config: &Config, models: &[String]) -> Result<()> {
    let resolver = config.resolver()?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let printers = register_printers(&store, &resolver, models).await?;
    pool.close().await;

    for p in printers {
        println!("{}  {}", p.id, p.model_name);
    }
    Ok(())
}

/// `pcode printer list`
pub async fn run_list(config: &Config) -> Result<()> {
    let resolver = config.resolver()?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let printers = store.list_printers().await?;
    pool.close().await;

    if printers.is_empty() {
        println!("No printers registered.");
        return Ok(());
    }

    println!("{:<12} ALIASES", "MODEL");
    for p in printers {
        let aliases = resolver.aliases_of(&p.model_name);
        let aliases = if aliases.is_empty() {
            "-".to_string()
        } else {
            aliases.join(", ")
        };
        println!("{:<12} {}", p.model_name, aliases);
    }
    Ok(())
}
