//! Storage abstraction for the service-code catalog.
//!
//! The [`CatalogStore`] trait covers the reads the query paths need and
//! opens [`CatalogTx`] transactions for the ingestion pipeline. Every write
//! goes through a transaction and is a single conflict-resolving upsert,
//! never an existence check followed by a write.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`begin`](CatalogStore::begin) | Open a write transaction |
//! | [`find_printer`](CatalogStore::find_printer) | Printer row by canonical name |
//! | [`list_printers`](CatalogStore::list_printers) | All printer rows |
//! | [`register_printer`](CatalogStore::register_printer) | Insert a printer row if absent |
//! | [`query_error_codes`](CatalogStore::query_error_codes) | Codes for a model, optional loose prefix |
//! | [`query_dip_switches`](CatalogStore::query_dip_switches) | Switches for a model |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::matcher::SearchKey;
use crate::models::{DipSwitchRecord, ErrorCodeRecord, Printer, StoredDipSwitch, StoredErrorCode};

/// Filter for [`CatalogStore::query_error_codes`].
#[derive(Debug, Clone)]
pub struct ErrorCodeQuery<'a> {
    /// Canonical model name.
    pub model: &'a str,
    /// Loose prefix over the stored search keys. `None` returns all codes.
    pub key: Option<SearchKey>,
    /// Maximum rows returned.
    pub limit: Option<i64>,
}

/// Filter for [`CatalogStore::query_dip_switches`].
#[derive(Debug, Clone, Default)]
pub struct DipSwitchQuery<'a> {
    /// Canonical model name.
    pub model: &'a str,
    pub switch_number: Option<i64>,
    pub bit_number: Option<i64>,
}

/// An open write transaction.
///
/// Dropping a transaction without calling [`commit`](CatalogTx::commit)
/// discards every write made through it. This is what makes a cancelled or
/// timed-out ingestion leave storage unchanged.
#[async_trait]
pub trait CatalogTx: Send {
    /// Printer row by canonical name, as seen inside this transaction.
    async fn find_printer(&mut self, model_name: &str) -> Result<Option<Printer>>;

    /// Insert or fully overwrite the error code keyed by
    /// `(printer_id, record.code)`.
    async fn upsert_error_code(&mut self, printer_id: &str, record: &ErrorCodeRecord) -> Result<()>;

    /// Insert or fully overwrite the switch keyed by
    /// `(model_name, switch_number, bit_number)`.
    async fn upsert_dip_switch(&mut self, model_name: &str, record: &DipSwitchRecord) -> Result<()>;

    /// Make every write visible atomically.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Abstract catalog backend.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Open a write transaction.
    async fn begin(&self) -> Result<Box<dyn CatalogTx>>;

    async fn find_printer(&self, model_name: &str) -> Result<Option<Printer>>;

    async fn list_printers(&self) -> Result<Vec<Printer>>;

    /// Insert a printer row for `model_name` unless one exists. Returns the
    /// row either way.
    async fn register_printer(&self, model_name: &str) -> Result<Printer>;

    /// Error codes for a model, ordered by code.
    async fn query_error_codes(&self, query: &ErrorCodeQuery<'_>) -> Result<Vec<StoredErrorCode>>;

    /// DIP switches for a model, ordered by switch then bit.
    async fn query_dip_switches(&self, query: &DipSwitchQuery<'_>) -> Result<Vec<StoredDipSwitch>>;
}
