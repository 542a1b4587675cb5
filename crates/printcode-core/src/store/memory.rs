//! In-memory [`CatalogStore`] implementation for tests and embedding.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. A transaction stages its
//! writes locally and applies them under one write lock on commit, so
//! readers never observe a half-applied batch. Keys are the same identity
//! keys the SQLite schema enforces with `UNIQUE` constraints.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::matcher::{CodeKeys, SearchKey};
use crate::models::{DipSwitchRecord, ErrorCodeRecord, Printer, StoredDipSwitch, StoredErrorCode};

use super::{CatalogStore, CatalogTx, DipSwitchQuery, ErrorCodeQuery};

#[derive(Default)]
struct State {
    /// Keyed by canonical model name.
    printers: BTreeMap<String, Printer>,
    /// Keyed by (printer_id, code).
    error_codes: BTreeMap<(String, String), ErrorCodeRecord>,
    /// Keyed by (model_name, switch_number, bit_number).
    dip_switches: BTreeMap<(String, i64, i64), DipSwitchRecord>,
}

enum StagedWrite {
    ErrorCode(String, ErrorCodeRecord),
    DipSwitch(String, DipSwitchRecord),
}

/// In-memory catalog store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    fail_after_writes: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every transaction fail on its `n + 1`-th write, as a dropped
    /// connection would. Used to exercise rollback.
    pub fn with_write_failure_after(mut self, n: usize) -> Self {
        self.fail_after_writes = Some(n);
        self
    }

    /// Number of stored error codes across all printers.
    pub fn error_code_count(&self) -> usize {
        self.read().map(|s| s.error_codes.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTx {
    store: InMemoryStore,
    staged: Vec<StagedWrite>,
}

impl InMemoryTx {
    fn stage(&mut self, write: StagedWrite) -> Result<()> {
        if let Some(limit) = self.store.fail_after_writes {
            if self.staged.len() >= limit {
                bail!("connection lost after {} writes", limit);
            }
        }
        self.staged.push(write);
        Ok(())
    }
}

#[async_trait]
impl CatalogTx for InMemoryTx {
    async fn find_printer(&mut self, model_name: &str) -> Result<Option<Printer>> {
        self.store.find_printer(model_name).await
    }

    async fn upsert_error_code(&mut self, printer_id: &str, record: &ErrorCodeRecord) -> Result<()> {
        self.stage(StagedWrite::ErrorCode(printer_id.to_string(), record.clone()))
    }

    async fn upsert_dip_switch(&mut self, model_name: &str, record: &DipSwitchRecord) -> Result<()> {
        self.stage(StagedWrite::DipSwitch(model_name.to_string(), record.clone()))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTx { store, staged } = *self;
        let mut state = store.write()?;
        for write in staged {
            match write {
                StagedWrite::ErrorCode(printer_id, record) => {
                    state
                        .error_codes
                        .insert((printer_id, record.code.clone()), record);
                }
                StagedWrite::DipSwitch(model, record) => {
                    state.dip_switches.insert(
                        (model, record.switch_number, record.bit_number),
                        record,
                    );
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>> {
        Ok(Box::new(InMemoryTx {
            store: self.clone(),
            staged: Vec::new(),
        }))
    }

    async fn find_printer(&self, model_name: &str) -> Result<Option<Printer>> {
        Ok(self.read()?.printers.get(model_name).cloned())
    }

    async fn list_printers(&self) -> Result<Vec<Printer>> {
        Ok(self.read()?.printers.values().cloned().collect())
    }

    async fn register_printer(&self, model_name: &str) -> Result<Printer> {
        let mut state = self.write()?;
        let printer = state
            .printers
            .entry(model_name.to_string())
            .or_insert_with(|| Printer {
                id: uuid::Uuid::new_v4().to_string(),
                model_name: model_name.to_string(),
            });
        Ok(printer.clone())
    }

    async fn query_error_codes(&self, query: &ErrorCodeQuery<'_>) -> Result<Vec<StoredErrorCode>> {
        let state = self.read()?;
        let printer_id = match state.printers.get(query.model) {
            Some(p) => p.id.clone(),
            None => return Ok(Vec::new()),
        };

        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(state
            .error_codes
            .iter()
            .filter(|((pid, _), _)| *pid == printer_id)
            .filter(|((_, code), _)| match &query.key {
                None => true,
                Some(key) => {
                    let keys = CodeKeys::for_code(code);
                    match key {
                        SearchKey::Digits(p) => keys.digits_key.starts_with(p.as_str()),
                        SearchKey::Alnum(p) => keys.alnum_key.starts_with(p.as_str()),
                    }
                }
            })
            .take(limit)
            .map(|((pid, _), record)| StoredErrorCode {
                printer_id: pid.clone(),
                record: record.clone(),
            })
            .collect())
    }

    async fn query_dip_switches(&self, query: &DipSwitchQuery<'_>) -> Result<Vec<StoredDipSwitch>> {
        let state = self.read()?;
        Ok(state
            .dip_switches
            .iter()
            .filter(|((model, sw, bit), _)| {
                model == query.model
                    && query.switch_number.map_or(true, |s| s == *sw)
                    && query.bit_number.map_or(true, |b| b == *bit)
            })
            .map(|((model, _, _), record)| StoredDipSwitch {
                model_name: model.clone(),
                record: record.clone(),
            })
            .collect())
    }
}
