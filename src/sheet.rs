//! Tabular input: spreadsheets, CSV and JSON identifier lists
//!
//! Supports:
//! - Workbooks (`.xlsx`, `.xlsm`, `.xls`, `.ods`), first worksheet, first row as header
//! - CSV files with a header row
//! - JSON arrays of identifiers, arrays of objects, or an object with a `documentos` array

use anyhow::Context;
use calamine::{open_workbook_auto, Data, Reader};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Cannot determine file format from extension (expected .xlsx, .xls, .ods, .csv or .json): {0}")]
    UnknownFormat(PathBuf),

    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("{path} has no worksheet")]
    NoWorksheet { path: PathBuf },

    #[error("{path} does not contain the column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Invalid JSON identifier list in {path}: {message}")]
    InvalidJson { path: PathBuf, message: String },
}

/// File formats understood by the reader
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SheetFormat {
    Workbook,
    Csv,
    Json,
}

impl SheetFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
            Some("xlsx") | Some("xlsm") | Some("xlsb") | Some("xls") | Some("ods") => Some(Self::Workbook),
            Some("csv") => Some(Self::Csv),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// Header row plus data rows, every cell rendered as text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Column position by header name, ignoring case and surrounding whitespace
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.headers.iter().position(|h| h.trim().to_lowercase() == wanted)
    }

    /// Cell text, empty when the row is shorter than the header
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// All values of one column, in row order
    pub fn column(&self, column: usize) -> Vec<String> {
        (0..self.rows.len()).map(|row| self.cell(row, column).to_string()).collect()
    }
}

/// Read a workbook or CSV file into a [`Table`]
pub fn read_table(path: &Path) -> Result<Table, SheetError> {
    match SheetFormat::from_path(path) {
        Some(SheetFormat::Workbook) => read_workbook(path),
        Some(SheetFormat::Csv) => read_csv(path),
        Some(SheetFormat::Json) | None => Err(SheetError::UnknownFormat(path.to_path_buf())),
    }
}

/// Read the identifier column from any supported input file
///
/// Rows with an empty identifier cell are kept so the output lines up with
/// the input row for row.
pub fn read_identifiers(path: &Path, column: &str) -> Result<Vec<String>, SheetError> {
    if SheetFormat::from_path(path) == Some(SheetFormat::Json) {
        let content = fs::read_to_string(path).map_err(|e| read_error(path, e))?;
        return parse_json_identifiers(&content, column).map_err(|e| SheetError::InvalidJson {
            path: path.to_path_buf(),
            message: format!("{:#}", e),
        });
    }

    let table = read_table(path)?;
    let index = table.column_index(column).ok_or_else(|| SheetError::MissingColumn {
        path: path.to_path_buf(),
        column: column.to_string(),
    })?;

    debug!("Read {} identifier rows from {}", table.rows.len(), path.display());
    Ok(table.column(index))
}

fn read_error(path: &Path, error: impl std::fmt::Display) -> SheetError {
    SheetError::Read {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

fn read_workbook(path: &Path) -> Result<Table, SheetError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| read_error(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SheetError::NoWorksheet { path: path.to_path_buf() })?
        .map_err(|e| read_error(path, e))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());

    let headers = rows.next().unwrap_or_default();
    Ok(Table {
        headers,
        rows: rows.collect(),
    })
}

/// Render a workbook cell as text; whole floats lose their `.0`
pub fn cell_to_string(cell: &Data) -> String {
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

fn read_csv(path: &Path) -> Result<Table, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| read_error(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| read_error(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| read_error(path, e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table { headers, rows })
}

/// Parse identifiers from JSON content
///
/// Supports three formats:
/// 1. Array of identifiers: `["900123456", 800197268]`
/// 2. Array of objects with the identifier column: `[{"documento": "900123456"}]`
/// 3. Object with a `documentos` array holding either of the above
pub fn parse_json_identifiers(content: &str, column: &str) -> anyhow::Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(content)
        .context("Failed to parse JSON content")?;

    match &value {
        serde_json::Value::Array(items) => Ok(parse_json_array(items, column)),
        serde_json::Value::Object(obj) => match obj.get("documentos") {
            Some(serde_json::Value::Array(items)) => Ok(parse_json_array(items, column)),
            Some(_) => anyhow::bail!("'documentos' field must be an array"),
            None => anyhow::bail!("JSON object must have a 'documentos' array field"),
        },
        _ => anyhow::bail!("JSON must be an array of identifiers or an object with a 'documentos' field"),
    }
}

fn parse_json_array(items: &[serde_json::Value], column: &str) -> Vec<String> {
    items
        .iter()
        .map(|item| match item {
            serde_json::Value::Object(obj) => obj.get(column).map(json_scalar).unwrap_or_default(),
            other => json_scalar(other),
        })
        .collect()
}

fn json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
