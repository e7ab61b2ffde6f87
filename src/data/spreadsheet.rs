use std::fmt;
use std::io::Cursor;

use calamine::{Data, Range, Reader, Xls, Xlsx};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("xlsx engine failed ({xlsx}); xls engine failed ({xls})")]
    AllEnginesFailed { xlsx: String, xls: String },
    #[error("workbook has no worksheets")]
    NoWorksheet,
}

/// One spreadsheet cell. Only `Text` is touched by text standardization.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Cell {
    pub fn text(s: &str) -> Self {
        Cell::Text(s.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Value bound into a TEXT column; `None` means SQL NULL.
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) if s == "null" => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Float(f) if f.is_nan() => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) => write!(f, "{x}"),
            Cell::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&Data> for Cell {
    fn from(d: &Data) -> Self {
        match d {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Int(*i),
            Data::Float(x) => Cell::Float(*x),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::Float(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    }
}

/// First worksheet as a rectangular grid, header row not yet located.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Cell::Empty);
                r
            })
            .collect();
        Self { rows }
    }

    fn from_range(range: &Range<Data>) -> Self {
        Self::from_rows(
            range
                .rows()
                .map(|row| row.iter().map(Cell::from).collect())
                .collect(),
        )
    }
}

/// Decodes with the xlsx engine, falling back to the legacy xls engine.
pub fn decode(bytes: &[u8]) -> Result<RawTable, DecodeError> {
    let xlsx_err = match decode_xlsx(bytes) {
        Ok(Some(table)) => {
            tracing::info!(rows = table.rows.len(), engine = "xlsx", "Spreadsheet decoded");
            return Ok(table);
        }
        Ok(None) => return Err(DecodeError::NoWorksheet),
        Err(e) => e,
    };
    tracing::warn!(error = %xlsx_err, "xlsx engine failed, trying xls");

    match decode_xls(bytes) {
        Ok(Some(table)) => {
            tracing::info!(rows = table.rows.len(), engine = "xls", "Spreadsheet decoded");
            Ok(table)
        }
        Ok(None) => Err(DecodeError::NoWorksheet),
        Err(e) => Err(DecodeError::AllEnginesFailed {
            xlsx: xlsx_err.to_string(),
            xls: e.to_string(),
        }),
    }
}

fn decode_xlsx(bytes: &[u8]) -> Result<Option<RawTable>, calamine::XlsxError> {
    let mut wb: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    match wb.worksheet_range_at(0) {
        None => Ok(None),
        Some(range) => Ok(Some(RawTable::from_range(&range?))),
    }
}

fn decode_xls(bytes: &[u8]) -> Result<Option<RawTable>, calamine::XlsError> {
    let mut wb: Xls<_> = Xls::new(Cursor::new(bytes))?;
    match wb.worksheet_range_at(0) {
        None => Ok(None),
        Some(range) => Ok(Some(RawTable::from_range(&range?))),
    }
}
