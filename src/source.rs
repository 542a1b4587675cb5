//! Tabular sources: CSV files and XLSX workbooks.
//!
//! A source is read into header-keyed [`RawRow`]s. The first row is the
//! header; header cells are trimmed (exports often carry trailing spaces)
//! but otherwise kept verbatim, since column lookup is case-sensitive.
//! XLSX sources use the first worksheet.
//!
//! Anything that prevents reading the table as a whole is a
//! [`SourceError`]; the import is aborted before a transaction is opened.

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, Xlsx};
use thiserror::Error;

use printcode_core::mapper::key_columns;
use printcode_core::models::{RawRow, SheetKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Xlsx,
}

impl SourceFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        ext.parse()
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "xlsx" => Ok(SourceFormat::Xlsx),
            other => Err(SourceError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// The source cannot be read as a table of the declared kind.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported source format '{0}' (expected csv or xlsx)")]
    UnsupportedFormat(String),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("unreadable workbook: {0}")]
    Workbook(String),

    #[error("source has no header row")]
    NoHeader,

    #[error("source has no '{column}' column; expected a {kind} sheet")]
    MissingKeyColumn { column: String, kind: &'static str },
}

/// A parsed table.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl SourceTable {
    /// Check that every identity column of `kind` is present in the header.
    /// A sheet of the other schema fails here instead of producing one row
    /// error per line.
    pub fn require_schema(&self, kind: SheetKind) -> Result<(), SourceError> {
        for column in key_columns(kind) {
            if !self.headers.iter().any(|h| h == column) {
                return Err(SourceError::MissingKeyColumn {
                    column: column.to_string(),
                    kind: kind.as_str(),
                });
            }
        }
        Ok(())
    }
}

/// Read a source file, inferring the format from its extension.
pub fn read_path(path: &Path) -> Result<SourceTable, SourceError> {
    let format = SourceFormat::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    read_bytes(&bytes, format)
}

/// Read an in-memory source.
pub fn read_bytes(bytes: &[u8], format: SourceFormat) -> Result<SourceTable, SourceError> {
    let table = match format {
        SourceFormat::Csv => read_csv(bytes)?,
        SourceFormat::Xlsx => read_xlsx(bytes)?,
    };
    if table.headers.iter().all(|h| h.is_empty()) {
        return Err(SourceError::NoHeader);
    }
    Ok(table)
}

fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}

fn read_csv(bytes: &[u8]) -> Result<SourceTable, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = rdr
        .byte_headers()?
        .iter()
        .map(|h| clean_header(&String::from_utf8_lossy(h)))
        .collect();

    let mut rows = Vec::new();
    for record in rdr.byte_records() {
        let record = record?;
        let values: Vec<String> = record
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect();
        rows.push(RawRow::from_pairs(&headers, &values));
    }

    Ok(SourceTable { headers, rows })
}

fn read_xlsx(bytes: &[u8]) -> Result<SourceTable, SourceError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| SourceError::Workbook(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SourceError::Workbook("workbook has no worksheets".to_string()))?
        .map_err(|e| SourceError::Workbook(e.to_string()))?;

    let mut iter = range.rows();
    let headers: Vec<String> = match iter.next() {
        Some(cells) => cells.iter().map(|c| clean_header(&cell_text(c))).collect(),
        None => return Err(SourceError::NoHeader),
    };

    let rows = iter
        .map(|cells| {
            let values: Vec<String> = cells.iter().map(cell_text).collect();
            RawRow::from_pairs(&headers, &values)
        })
        .collect();

    Ok(SourceTable { headers, rows })
}

/// Render a cell as the text a CSV export would contain. Whole floats lose
/// their fraction so numeric codes and switch numbers read as integers.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printcode_core::mapper::map_error_code;

    #[test]
    fn test_csv_headers_trimmed_and_rows_keyed() {
        let csv = "\u{feff}Code,Cause ,Faulty part isolation DIPSW \nC-0101*,Open circuit,DipSW 3-5\n";
        let table = read_bytes(csv.as_bytes(), SourceFormat::Csv).unwrap();
        assert_eq!(
            table.headers,
            vec!["Code", "Cause", "Faulty part isolation DIPSW"]
        );
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("Cause"), Some("Open circuit"));
    }

    #[test]
    fn test_csv_ragged_rows_tolerated() {
        let csv = "Code,Cause,Note\nC-1\nC-2,b,c,extra\n";
        let table = read_bytes(csv.as_bytes(), SourceFormat::Csv).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("Cause"), None);
        assert_eq!(table.rows[1].get("Note"), Some("c"));
    }

    #[test]
    fn test_schema_check() {
        let csv = "Switch,Bit,Function\n1,0,x\n";
        let table = read_bytes(csv.as_bytes(), SourceFormat::Csv).unwrap();
        assert!(table.require_schema(SheetKind::DipSwitches).is_ok());
        assert!(matches!(
            table.require_schema(SheetKind::ErrorCodes),
            Err(SourceError::MissingKeyColumn { .. })
        ));
    }

    #[test]
    fn test_empty_source_has_no_header() {
        assert!(matches!(
            read_bytes(b"", SourceFormat::Csv),
            Err(SourceError::NoHeader)
        ));
    }

    #[test]
    fn test_corrupt_workbook_is_unreadable() {
        assert!(matches!(
            read_bytes(b"not a zip file", SourceFormat::Xlsx),
            Err(SourceError::Workbook(_))
        ));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            SourceFormat::from_path(Path::new("codes.XLSX")).unwrap(),
            SourceFormat::Xlsx
        );
        assert!(SourceFormat::from_path(Path::new("codes.pdf")).is_err());
    }

    #[test]
    fn test_float_cells_render_as_integers() {
        assert_eq!(cell_text(&Data::Float(202.0)), "202");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
    }

    /// One-sheet workbook: a `Code ` / `Cause` header over a shared-string
    /// code and a numeric code.
    fn minimal_xlsx() -> Vec<u8> {
        use std::io::Write;
        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#,
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
            ),
            (
                "xl/workbook.xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Codes" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#,
            ),
            (
                "xl/sharedStrings.xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="5" uniqueCount="5"><si><t xml:space="preserve">Code </t></si><si><t>Cause</t></si><si><t>C-0202*</t></si><si><t>Fuser open</t></si><si><t>Motor lock</t></si></sst>"#,
            ),
            (
                "xl/worksheets/sheet1.xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:B3"/><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row><row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2" t="s"><v>3</v></c></row><row r="3"><c r="A3"><v>3501</v></c><c r="B3" t="s"><v>4</v></c></row></sheetData></worksheet>"#,
            ),
        ];

        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, xml) in parts {
                zip.start_file(name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(xml.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_xlsx_first_sheet_read_and_mapped() {
        let table = read_bytes(&minimal_xlsx(), SourceFormat::Xlsx).unwrap();
        assert_eq!(table.headers, vec!["Code", "Cause"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].get("Code"), Some("3501"));
        table.require_schema(SheetKind::ErrorCodes).unwrap();

        let codes: Vec<String> = table
            .rows
            .iter()
            .map(|r| map_error_code(r).unwrap().code)
            .collect();
        assert_eq!(codes, vec!["C-0202", "3501"]);
        assert_eq!(
            map_error_code(&table.rows[1]).unwrap().cause.as_deref(),
            Some("Motor lock")
        );
    }
}
