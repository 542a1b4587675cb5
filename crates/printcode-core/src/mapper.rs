//! Row mapper: header-driven conversion of [`RawRow`]s into typed records.
//!
//! Column lookup is by exact (case-sensitive) header name against a fixed
//! vocabulary per [`SheetKind`]. Unknown columns are ignored, missing or
//! blank optional columns become `None`. A row that cannot produce an
//! identity key is rejected with a [`RowError`]; the caller decides what to
//! do with it (the ingestion pipeline records it and moves on).

use serde::Serialize;
use thiserror::Error;

use crate::canonical::storage_code;
use crate::models::{DipSwitchRecord, ErrorCodeRecord, MappedRecord, RawRow, SheetKind};

/// Error-code sheet headers.
pub mod error_columns {
    pub const CODE: &str = "Code";
    pub const CLASSIFICATION: &str = "Classification";
    pub const CAUSE: &str = "Cause";
    pub const MEASURES: &str = "Measures to take when an alert occurs";
    pub const SOLUTION: &str = "Solution";
    pub const ESTIMATED_PARTS: &str = "Estimated abnormal parts";
    pub const CORRECTION: &str = "Correction";
    pub const ISOLATION: &str = "Faulty part isolation DIPSW";
    /// Older sheets drop the "DIPSW" suffix.
    pub const ISOLATION_SHORT: &str = "Faulty part isolation";
    pub const NOTE: &str = "Note";
}

/// DIP-switch sheet headers.
pub mod dip_columns {
    pub const SWITCH: &str = "Switch";
    pub const BIT: &str = "Bit";
    pub const FUNCTION: &str = "Function";
    pub const SETTING_0: &str = "Setting 0";
    pub const SETTING_1: &str = "Setting 1";
    pub const DEFAULT: &str = "Default";
}

/// Why a single row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowError {
    /// The identity column is missing or empty after noise stripping.
    #[error("empty key: column '{column}' is missing or blank")]
    EmptyKey { column: String },

    /// A numeric column did not parse as an integer in range.
    #[error("bad number in column '{column}': '{value}'")]
    BadNumber { column: String, value: String },

    /// The default column holds something other than 0 or 1.
    #[error("bad default value '{value}': expected 0, 1 or blank")]
    BadDefault { value: String },
}

/// The header that identifies a row of the given kind. A source lacking it
/// entirely is the wrong schema.
pub fn key_columns(kind: SheetKind) -> &'static [&'static str] {
    match kind {
        SheetKind::ErrorCodes => &[error_columns::CODE],
        SheetKind::DipSwitches => &[dip_columns::SWITCH, dip_columns::BIT],
    }
}

/// Map one row according to the declared sheet kind.
pub fn map_row(kind: SheetKind, row: &RawRow) -> Result<MappedRecord, RowError> {
    match kind {
        SheetKind::ErrorCodes => map_error_code(row).map(MappedRecord::ErrorCode),
        SheetKind::DipSwitches => map_dip_switch(row).map(MappedRecord::DipSwitch),
    }
}

pub fn map_error_code(row: &RawRow) -> Result<ErrorCodeRecord, RowError> {
    use error_columns::*;

    let code = storage_code(row.get(CODE).unwrap_or_default());
    if code.is_empty() {
        return Err(RowError::EmptyKey {
            column: CODE.to_string(),
        });
    }

    Ok(ErrorCodeRecord {
        code,
        classification: text(row, CLASSIFICATION),
        cause: text(row, CAUSE),
        measures: text(row, MEASURES),
        solution: text(row, SOLUTION),
        estimated_abnormal_parts: text(row, ESTIMATED_PARTS),
        correction: text(row, CORRECTION),
        faulty_part_isolation: text(row, ISOLATION).or_else(|| text(row, ISOLATION_SHORT)),
        note: text(row, NOTE),
    })
}

pub fn map_dip_switch(row: &RawRow) -> Result<DipSwitchRecord, RowError> {
    use dip_columns::*;

    let switch_number = integer(row, SWITCH, 1)?;
    let bit_number = integer(row, BIT, 0)?;

    let default_val = match text(row, DEFAULT) {
        None => None,
        Some(v) => match parse_integer(&v) {
            Some(0) => Some("0".to_string()),
            Some(1) => Some("1".to_string()),
            _ => return Err(RowError::BadDefault { value: v }),
        },
    };

    Ok(DipSwitchRecord {
        switch_number,
        bit_number,
        function_name: text(row, FUNCTION),
        setting_0: text(row, SETTING_0),
        setting_1: text(row, SETTING_1),
        default_val,
    })
}

/// Cell text as written, `None` when absent or blank.
fn text(row: &RawRow, column: &str) -> Option<String> {
    row.get(column)
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

fn integer(row: &RawRow, column: &str, min: i64) -> Result<i64, RowError> {
    let raw = row.get(column).unwrap_or_default().trim();
    match parse_integer(raw) {
        Some(n) if n >= min => Ok(n),
        _ => Err(RowError::BadNumber {
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Parse an integer cell. Spreadsheet exports often render integers as
/// floats (`"3.0"`), which are accepted when they have no fraction.
fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
