//! # pcode CLI
//!
//! ## Usage
//!
//! ```bash
//! pcode --config ./config/pcode.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pcode init` | Create the SQLite database and run schema migrations |
//! | `pcode printer add <model>…` | Register canonical printer models |
//! | `pcode printer list` | List printers and their aliases |
//! | `pcode import <kind> <file> --model <m>…` | Import an error-code or DIP-switch sheet |
//! | `pcode search <model> [code]` | Search error codes |
//! | `pcode dipsw <model>` | Show DIP-switch settings |
//! | `pcode serve` | Start the HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use printcode::{config, ingest, migrate, printers, search, server, source::SourceFormat};
use printcode_core::models::SheetKind;

/// Printer service-code catalog.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pcode.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pcode",
    about = "Printer service-code catalog: import error-code and DIP-switch sheets, search by model and code",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pcode.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage printer models.
    Printer {
        #[command(subcommand)]
        action: PrinterAction,
    },

    /// Import an error-code or DIP-switch sheet for one or more models.
    ///
    /// The whole import is one transaction: it is either fully committed or
    /// leaves the catalog unchanged. Rows without a usable key and models
    /// that are not registered are skipped and reported.
    Import {
        /// Sheet kind: `error_codes` or `dip_switches`.
        kind: SheetKind,

        /// CSV or XLSX file.
        file: PathBuf,

        /// Target model; repeat for several. Aliases resolve to their
        /// canonical model.
        #[arg(long = "model", required = true)]
        models: Vec<String>,

        /// Source format, overriding the file extension (`csv` or `xlsx`).
        #[arg(long)]
        format: Option<SourceFormat>,

        /// Map rows and report counts without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search error codes of a model.
    ///
    /// Numeric queries compare significant digits (`202` finds `C-0202`);
    /// others compare letters and digits ignoring separators and case.
    Search {
        model: String,

        /// Code to look up; omit to list every code.
        code: Option<String>,

        /// Return every code starting with the query instead of exact matches.
        #[arg(long)]
        loose: bool,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show DIP-switch settings of a model.
    Dipsw {
        model: String,

        #[arg(long)]
        switch: Option<i64>,

        #[arg(long)]
        bit: Option<i64>,
    },

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum PrinterAction {
    /// Register canonical printer models. Existing models are kept.
    Add {
        #[arg(required = true)]
        models: Vec<String>,
    },
    /// List registered printers.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pcode=info,printcode=info,printcode_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Printer { action } => match action {
            PrinterAction::Add { models } => printers::run_add(&cfg, &models).await?,
            PrinterAction::List => printers::run_list(&cfg).await?,
        },
        Commands::Import {
            kind,
            file,
            models,
            format,
            dry_run,
        } => {
            ingest::run_import(&cfg, kind, &file, &models, format, dry_run).await?;
        }
        Commands::Search {
            model,
            code,
            loose,
            limit,
        } => {
            search::run_search(&cfg, &model, code.as_deref(), !loose, limit).await?;
        }
        Commands::Dipsw { model, switch, bit } => {
            search::run_dipsw(&cfg, &model, switch, bit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
