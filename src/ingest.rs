//! Import orchestration: source table → [`IngestPipeline`] → report.
//!
//! Shared by `pcode import` and `POST /api/import/{kind}`. The source is
//! validated against the declared sheet kind before anything is written;
//! the pipeline run is bounded by `[ingest].timeout_secs` and a timed-out
//! run drops its transaction, leaving storage unchanged.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::warn;

use printcode_core::ingest::{IngestPipeline, IngestReport, IngestStatus, ModelStatus, PreparedBatch};
use printcode_core::models::SheetKind;
use printcode_core::store::CatalogStore;

use crate::config::Config;
use crate::db;
use crate::source::{self, SourceFormat, SourceTable};
use crate::sqlite_store::SqliteStore;

/// Result of one import, as printed by the CLI and returned by the server.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub success: bool,
    pub message: String,
    pub report: IngestReport,
}

/// Validate, map and (unless `dry_run`) write one source table.
///
/// Errors are reserved for problems with the request itself: a source of
/// the wrong schema or an empty model list. Everything else, including a
/// rolled-back transaction, is reported in the [`ImportOutcome`].
pub async fn import_table(
    store: &dyn CatalogStore,
    pipeline: &IngestPipeline,
    kind: SheetKind,
    table: &SourceTable,
    models: &[String],
    dry_run: bool,
    timeout: Duration,
) -> Result<ImportOutcome> {
    table.require_schema(kind)?;

    let models: Vec<String> = models
        .iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    if models.is_empty() {
        bail!("at least one target model is required");
    }

    let batch = PreparedBatch::map(kind, &table.rows);
    if dry_run {
        let report = batch.dry_run_report();
        return Ok(outcome(report));
    }

    let report = match tokio::time::timeout(
        timeout,
        pipeline.ingest_prepared(store, &batch, &models),
    )
    .await
    {
        Ok(report) => report,
        Err(_) => {
            warn!(kind = kind.as_str(), ?timeout, "import timed out; transaction dropped");
            IngestReport {
                kind,
                status: IngestStatus::Failed {
                    cause: format!("timed out after {:?}", timeout),
                },
                rows_read: batch.rows_read,
                blank_rows: batch.blank_rows,
                rows_mapped: batch.records.len(),
                models: Vec::new(),
                row_errors: batch.row_errors.clone(),
            }
        }
    };

    Ok(outcome(report))
}

fn outcome(report: IngestReport) -> ImportOutcome {
    ImportOutcome {
        success: report.success(),
        message: summarize(&report),
        report,
    }
}

/// One-line human summary of a report.
pub fn summarize(report: &IngestReport) -> String {
    let kind = report.kind.as_str();
    let mut msg = match &report.status {
        IngestStatus::Failed { cause } => {
            return format!("Import of {} rolled back: {}", kind, cause);
        }
        IngestStatus::DryRun => format!(
            "Dry run: {} of {} {} rows would be written",
            report.rows_mapped, report.rows_read, kind
        ),
        IngestStatus::Committed => {
            let ingested: Vec<&str> = report
                .models
                .iter()
                .filter(|m| matches!(m.status, ModelStatus::Ingested { .. }))
                .map(|m| m.resolved.as_str())
                .collect();
            if ingested.is_empty() {
                format!("No {} rows written", kind)
            } else {
                format!(
                    "Imported {} {} rows for {}",
                    report.upserted(),
                    kind,
                    ingested.join(", ")
                )
            }
        }
    };

    let missing = report.missing_models();
    if !missing.is_empty() {
        msg.push_str(&format!("; model not found: {}", missing.join(", ")));
    }
    if !report.row_errors.is_empty() {
        msg.push_str(&format!("; {} row(s) rejected", report.row_errors.len()));
    }
    msg
}

/// `pcode import`: read a file and ingest it for the given models.
pub async fn run_import(
    config: &Config,
    kind: SheetKind,
    path: &Path,
    models: &[String],
    format: Option<SourceFormat>,
    dry_run: bool,
) -> Result<()> {
    let table = match format {
        Some(format) => {
            let bytes = std::fs::read(path).map_err(|e| source::SourceError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            source::read_bytes(&bytes, format)?
        }
        None => source::read_path(path)?,
    };

    let pipeline = IngestPipeline::new(std::sync::Arc::new(config.resolver()?));

    // A dry run never touches the database
    let outcome = if dry_run {
        let store = printcode_core::store::memory::InMemoryStore::new();
        import_table(&store, &pipeline, kind, &table, models, true, config.ingest_timeout()).await?
    } else {
        let pool = db::connect(config).await?;
        let store = SqliteStore::new(pool.clone());
        let outcome =
            import_table(&store, &pipeline, kind, &table, models, false, config.ingest_timeout())
                .await?;
        pool.close().await;
        outcome
    };

    print_report(path, &outcome);

    if !outcome.success {
        bail!("{}", outcome.message);
    }
    Ok(())
}

fn print_report(path: &Path, outcome: &ImportOutcome) {
    let report = &outcome.report;
    let suffix = if report.status == IngestStatus::DryRun {
        " (dry-run)"
    } else {
        ""
    };
    println!("import {} {}{}", report.kind.as_str(), path.display(), suffix);
    println!("  rows read: {}", report.rows_read);
    if report.blank_rows > 0 {
        println!("  blank rows: {}", report.blank_rows);
    }
    println!("  rows mapped: {}", report.rows_mapped);
    for failure in &report.row_errors {
        println!("  row {}: {}", failure.row, failure.error);
    }
    for model in &report.models {
        let label = if model.requested == model.resolved {
            model.requested.clone()
        } else {
            format!("{} → {}", model.requested, model.resolved)
        };
        match &model.status {
            ModelStatus::Ingested { upserted } => {
                println!("  {}: {} upserted", label, upserted)
            }
            ModelStatus::NotFound => println!("  {}: model not found", label),
            ModelStatus::Duplicate { of } => println!("  {}: same model as {}", label, of),
        }
    }
    if outcome.success {
        println!("ok");
    }
}
