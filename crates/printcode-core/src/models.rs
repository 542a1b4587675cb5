//! Core data models for the service-code catalog.
//!
//! These types represent the raw spreadsheet rows, the typed records the
//! row mapper produces, and the printer rows they are stored against.

use serde::{Deserialize, Serialize};

/// One spreadsheet row: column header to cell text, in source order.
///
/// The column set is not fixed; lookups are by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row by pairing headers with cell values. Extra cells beyond
    /// the header count are dropped; missing trailing cells are absent.
    pub fn from_pairs<H, V>(headers: &[H], values: &[V]) -> Self
    where
        H: AsRef<str>,
        V: AsRef<str>,
    {
        let cells = headers
            .iter()
            .zip(values.iter())
            .map(|(h, v)| (h.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        Self { cells }
    }

    pub fn push(&mut self, header: impl Into<String>, value: impl Into<String>) {
        self.cells.push((header.into(), value.into()));
    }

    /// Cell under `header`. When a header repeats, the first occurrence wins.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }
}

/// The two sheet schemas an ingestion run can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetKind {
    ErrorCodes,
    DipSwitches,
}

impl SheetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetKind::ErrorCodes => "error_codes",
            SheetKind::DipSwitches => "dip_switches",
        }
    }
}

impl std::str::FromStr for SheetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "errors" | "error_codes" | "error-codes" => Ok(SheetKind::ErrorCodes),
            "dipsw" | "dip_switches" | "dip-switches" => Ok(SheetKind::DipSwitches),
            other => Err(format!(
                "unknown sheet kind '{}'. Use error_codes or dip_switches.",
                other
            )),
        }
    }
}

/// A canonical printer model row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Printer {
    pub id: String,
    pub model_name: String,
}

/// A service error code, as mapped from an error-code sheet.
///
/// `code` is already in storage form (see [`crate::canonical::storage_code`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorCodeRecord {
    pub code: String,
    pub classification: Option<String>,
    pub cause: Option<String>,
    pub measures: Option<String>,
    pub solution: Option<String>,
    pub estimated_abnormal_parts: Option<String>,
    pub correction: Option<String>,
    pub faulty_part_isolation: Option<String>,
    pub note: Option<String>,
}

/// A DIP-switch bit setting, as mapped from a DIP-switch sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DipSwitchRecord {
    pub switch_number: i64,
    pub bit_number: i64,
    pub function_name: Option<String>,
    pub setting_0: Option<String>,
    pub setting_1: Option<String>,
    /// `"0"`, `"1"`, or unset.
    pub default_val: Option<String>,
}

/// Output of the row mapper, tagged by the declared sheet kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedRecord {
    ErrorCode(ErrorCodeRecord),
    DipSwitch(DipSwitchRecord),
}

/// An error code as stored, attached to its printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredErrorCode {
    pub printer_id: String,
    #[serde(flatten)]
    pub record: ErrorCodeRecord,
}

/// A DIP-switch row as stored, keyed by canonical model name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDipSwitch {
    pub model_name: String,
    #[serde(flatten)]
    pub record: DipSwitchRecord,
}

/// Anything carrying a service code the search matcher can compare.
pub trait CodedRecord {
    fn code(&self) -> &str;
}

impl CodedRecord for ErrorCodeRecord {
    fn code(&self) -> &str {
        &self.code
    }
}

impl CodedRecord for StoredErrorCode {
    fn code(&self) -> &str {
        &self.record.code
    }
}

impl CodedRecord for String {
    fn code(&self) -> &str {
        self
    }
}

impl CodedRecord for &str {
    fn code(&self) -> &str {
        self
    }
}
