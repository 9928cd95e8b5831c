//! Tabular parser
//!
//! Converts raw upload bytes into a structured [`Table`] for both
//! delimited-text and spreadsheet container formats. Tolerant by
//! design: short rows are padded, long rows truncated with a warning,
//! and a cell that fails numeric coercion degrades to raw text rather
//! than aborting the parse. Only a file that yields no data at all is
//! an error.

use std::io::Cursor;

use calamine::Reader;
use thiserror::Error;

/// Why a file could not be parsed
#[derive(Debug, Error)]
pub enum ParseError {
    /// No data rows (zero bytes, or headers with nothing under them)
    #[error("File is empty or contains no data rows")]
    Empty,

    /// Extension the parser has no reader for
    #[error("Unsupported file format: .{0}")]
    UnsupportedFormat(String),

    /// Unreadable container or malformed structure
    #[error("Malformed file: {0}")]
    Malformed(String),
}

/// A single parsed cell.
///
/// Per-cell best-effort typing: numeric coercion is attempted and
/// failure degrades the cell to text, never the whole parse.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Coerce a raw string cell
    fn from_raw(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// The cell's text, if it is a text cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Ordered headers plus rows of cells aligned to them.
///
/// Construction guarantees every row has exactly `headers.len()` cells.
#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table from raw string records.
    ///
    /// Duplicate headers are dropped (first occurrence wins, along with
    /// its column of cells). Rows shorter than the header count are
    /// padded with empty cells; longer rows are truncated.
    fn from_records(raw_headers: Vec<String>, raw_rows: Vec<Vec<String>>) -> Result<Table, ParseError> {
        // Positions of the headers we keep
        let mut headers = Vec::new();
        let mut kept_positions = Vec::new();
        for (position, header) in raw_headers.into_iter().enumerate() {
            let header = header.trim().to_string();
            if headers.contains(&header) {
                tracing::warn!(header = %header, "Duplicate column header dropped");
                continue;
            }
            headers.push(header);
            kept_positions.push(position);
        }

        if headers.is_empty() || raw_rows.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut truncated = 0usize;
        let rows: Vec<Vec<Cell>> = raw_rows
            .into_iter()
            .map(|raw| {
                if raw.len() > kept_positions.last().map_or(0, |p| p + 1) {
                    truncated += 1;
                }
                kept_positions
                    .iter()
                    .map(|&position| raw.get(position).map_or(Cell::Empty, |s| Cell::from_raw(s)))
                    .collect()
            })
            .collect();

        if truncated > 0 {
            tracing::warn!(
                rows = truncated,
                "Rows with extra cells beyond the header count were truncated"
            );
        }

        Ok(Table { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Iterate one column's cells top to bottom
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().map(move |row| &row[index])
    }
}

/// Parse upload bytes according to the declared extension
pub fn parse(bytes: &[u8], extension: &str) -> Result<Table, ParseError> {
    match extension {
        "csv" => parse_csv(bytes),
        "xlsx" | "xls" => parse_spreadsheet(bytes),
        other => Err(ParseError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Table, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::Malformed(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut raw_rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::Malformed(e.to_string()))?;
        raw_rows.push(record.iter().map(|field| field.to_string()).collect());
    }

    Table::from_records(headers, raw_rows)
}

fn parse_spreadsheet(bytes: &[u8]) -> Result<Table, ParseError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
        .map_err(|e| ParseError::Malformed(e.to_string()))?;

    // One job per file; only the first worksheet feeds the pipeline
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ParseError::Empty)?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ParseError::Malformed(e.to_string()))?;

    let mut rows = range.rows().map(|row| {
        row.iter()
            .map(|cell| match cell {
                calamine::Data::Empty => String::new(),
                calamine::Data::String(s) => s.clone(),
                calamine::Data::Float(f) => f.to_string(),
                calamine::Data::Int(i) => i.to_string(),
                calamine::Data::Bool(b) => b.to_string(),
                calamine::Data::DateTime(dt) => dt.as_f64().to_string(),
                calamine::Data::DateTimeIso(s) => s.clone(),
                calamine::Data::DurationIso(s) => s.clone(),
                calamine::Data::Error(_) => String::new(),
            })
            .collect::<Vec<String>>()
    });

    let headers = rows.next().ok_or(ParseError::Empty)?;
    let raw_rows: Vec<Vec<String>> = rows.collect();

    Table::from_records(headers, raw_rows)
}
