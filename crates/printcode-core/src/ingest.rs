//! Ingestion pipeline: rows → typed records → one transactional batch.
//!
//! ```text
//! RawRow ──map_row──▶ MappedRecord ──┐
//!   │                                ├──▶ upsert per resolved model ──▶ commit
//!   └─ RowError (recorded, skipped)  │
//! target models ──ModelResolver──────┘
//! ```
//!
//! # Failure isolation
//!
//! | Failure | Scope | Effect |
//! |---------|-------|--------|
//! | [`RowError`] | one row | row skipped, listed in the report |
//! | model not in store | one model | model skipped, other models proceed |
//! | store error | whole batch | rollback, [`IngestStatus::Failed`] |
//!
//! Every resolved model is written inside one transaction, so a batch is
//! either fully committed or not at all. Dropping the future returned by
//! [`IngestPipeline::ingest`] drops the open transaction, which discards its
//! writes; callers implement timeouts by simply abandoning the future.
//!
//! Re-running a batch is idempotent: every write is an upsert keyed by the
//! record's identity key that overwrites all other columns.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::mapper::{map_row, RowError};
use crate::models::{MappedRecord, RawRow, SheetKind};
use crate::resolver::ModelResolver;
use crate::store::{CatalogStore, CatalogTx};

/// A row the mapper rejected. `row` is the 1-based data row number (the
/// header row is not counted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub error: RowError,
}

/// Outcome for one requested target model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelStatus {
    /// Rows were written for this model. On a failed batch this is the
    /// number of writes attempted before the rollback.
    Ingested { upserted: usize },
    /// No printer row exists for the resolved model.
    NotFound,
    /// Resolves to the same canonical model as an earlier target.
    Duplicate { of: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelReport {
    pub requested: String,
    pub resolved: String,
    #[serde(flatten)]
    pub status: ModelStatus,
    /// Rows excluded for this model by row errors.
    pub skipped_rows: usize,
}

/// Batch-level outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestStatus {
    Committed,
    /// Rolled back; nothing from this batch is stored.
    Failed { cause: String },
    /// Rows were mapped but no transaction was opened.
    DryRun,
}

/// Structured result of one ingestion run, for the caller to relay.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub kind: SheetKind,
    pub status: IngestStatus,
    pub rows_read: usize,
    pub blank_rows: usize,
    pub rows_mapped: usize,
    pub models: Vec<ModelReport>,
    pub row_errors: Vec<RowFailure>,
}

impl IngestReport {
    pub fn success(&self) -> bool {
        !matches!(self.status, IngestStatus::Failed { .. })
    }

    /// Total upserts across models that were ingested.
    pub fn upserted(&self) -> usize {
        self.models
            .iter()
            .map(|m| match m.status {
                ModelStatus::Ingested { upserted } => upserted,
                _ => 0,
            })
            .sum()
    }

    pub fn missing_models(&self) -> Vec<&str> {
        self.models
            .iter()
            .filter(|m| m.status == ModelStatus::NotFound)
            .map(|m| m.requested.as_str())
            .collect()
    }
}

/// Rows already run through the mapper.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub kind: SheetKind,
    pub rows_read: usize,
    pub blank_rows: usize,
    pub records: Vec<MappedRecord>,
    pub row_errors: Vec<RowFailure>,
}

impl PreparedBatch {
    /// Map every row. Fully blank rows are counted and skipped without an
    /// error; rows with content but no usable key become [`RowFailure`]s.
    pub fn map(kind: SheetKind, rows: &[RawRow]) -> Self {
        let mut records = Vec::with_capacity(rows.len());
        let mut row_errors = Vec::new();
        let mut blank_rows = 0;

        for (i, row) in rows.iter().enumerate() {
            if row.is_empty() {
                blank_rows += 1;
                continue;
            }
            match map_row(kind, row) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(row = i + 1, %error, "row rejected");
                    row_errors.push(RowFailure { row: i + 1, error });
                }
            }
        }

        Self {
            kind,
            rows_read: rows.len(),
            blank_rows,
            records,
            row_errors,
        }
    }

    /// Report for a batch that will not be written.
    pub fn dry_run_report(&self) -> IngestReport {
        IngestReport {
            kind: self.kind,
            status: IngestStatus::DryRun,
            rows_read: self.rows_read,
            blank_rows: self.blank_rows,
            rows_mapped: self.records.len(),
            models: Vec::new(),
            row_errors: self.row_errors.clone(),
        }
    }
}

/// One target after alias resolution.
struct Target {
    requested: String,
    resolved: String,
    duplicate_of: Option<String>,
}

/// Orchestrates mapping, model resolution and the transactional write.
#[derive(Clone)]
pub struct IngestPipeline {
    resolver: Arc<ModelResolver>,
}

impl IngestPipeline {
    pub fn new(resolver: Arc<ModelResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Map `rows` and write them for every model in `targets`.
    pub async fn ingest(
        &self,
        store: &dyn CatalogStore,
        kind: SheetKind,
        rows: &[RawRow],
        targets: &[String],
    ) -> IngestReport {
        let batch = PreparedBatch::map(kind, rows);
        self.ingest_prepared(store, &batch, targets).await
    }

    /// Write an already-mapped batch for every model in `targets`.
    pub async fn ingest_prepared(
        &self,
        store: &dyn CatalogStore,
        batch: &PreparedBatch,
        targets: &[String],
    ) -> IngestReport {
        let targets = self.plan_targets(targets);
        let mut models = Vec::with_capacity(targets.len());

        let status = match self.write_batch(store, batch, &targets, &mut models).await {
            Ok(()) => {
                info!(
                    kind = batch.kind.as_str(),
                    records = batch.records.len(),
                    models = models.len(),
                    "ingestion committed"
                );
                IngestStatus::Committed
            }
            Err(e) => {
                error!(kind = batch.kind.as_str(), error = %format!("{:#}", e), "ingestion rolled back");
                IngestStatus::Failed {
                    cause: format!("{:#}", e),
                }
            }
        };

        IngestReport {
            kind: batch.kind,
            status,
            rows_read: batch.rows_read,
            blank_rows: batch.blank_rows,
            rows_mapped: batch.records.len(),
            models,
            row_errors: batch.row_errors.clone(),
        }
    }

    fn plan_targets(&self, targets: &[String]) -> Vec<Target> {
        let mut planned: Vec<Target> = Vec::with_capacity(targets.len());
        for requested in targets {
            let requested = self.resolver.normalize(requested);
            let resolved = self.resolver.resolve(&requested);
            let duplicate_of = planned
                .iter()
                .find(|t| t.duplicate_of.is_none() && t.resolved == resolved)
                .map(|t| t.requested.clone());
            planned.push(Target {
                requested,
                resolved,
                duplicate_of,
            });
        }
        planned
    }

    async fn write_batch(
        &self,
        store: &dyn CatalogStore,
        batch: &PreparedBatch,
        targets: &[Target],
        models: &mut Vec<ModelReport>,
    ) -> Result<()> {
        let mut tx = store.begin().await?;
        match write_targets(tx.as_mut(), batch, targets, models).await {
            Ok(()) => tx.commit().await,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "rollback failed; transaction dropped");
                }
                Err(e)
            }
        }
    }
}

async fn write_targets(
    tx: &mut dyn CatalogTx,
    batch: &PreparedBatch,
    targets: &[Target],
    models: &mut Vec<ModelReport>,
) -> Result<()> {
    let skipped_rows = batch.row_errors.len();

    for target in targets {
        let mut report = ModelReport {
            requested: target.requested.clone(),
            resolved: target.resolved.clone(),
            status: ModelStatus::NotFound,
            skipped_rows,
        };

        if let Some(of) = &target.duplicate_of {
            info!(requested = %target.requested, of = %of, "target already covered by alias");
            report.status = ModelStatus::Duplicate { of: of.clone() };
            report.skipped_rows = 0;
            models.push(report);
            continue;
        }

        let printer = match tx.find_printer(&target.resolved).await? {
            Some(p) => p,
            None => {
                warn!(requested = %target.requested, resolved = %target.resolved, "model not found, skipping");
                models.push(report);
                continue;
            }
        };

        let mut upserted = 0;
        report.status = ModelStatus::Ingested { upserted };
        models.push(report);
        let idx = models.len() - 1;

        for record in &batch.records {
            match record {
                MappedRecord::ErrorCode(rec) => tx.upsert_error_code(&printer.id, rec).await?,
                MappedRecord::DipSwitch(rec) => tx.upsert_dip_switch(&printer.model_name, rec).await?,
            }
            upserted += 1;
            models[idx].status = ModelStatus::Ingested { upserted };
        }

        info!(model = %printer.model_name, upserted, "model ingested");
    }

    Ok(())
}
