//! Reshapes the regulator's price sheet into a canonical table.
//!
//! The published workbook carries a variable block of title rows above the
//! real header, three barcode columns of which only one is usually filled,
//! and free-form Portuguese text. The steps below run in a fixed order:
//! header detection, barcode folding, column names, cell values, date stamp.

use thiserror::Error;

use crate::data::spreadsheet::{Cell, RawTable};
use crate::text;

/// Cell that marks the header row.
pub const HEADER_TOKEN: &str = "SUBSTÂNCIA";
pub const DATE_COLUMN: &str = "date_time";

const EAN_1: &str = "EAN 1";
const EAN_2: &str = "EAN 2";
const EAN_3: &str = "EAN 3";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("no row contains the header token \"SUBSTÂNCIA\"")]
    HeaderNotFound,
    #[error("column {0:?} is missing from the header row")]
    MissingColumn(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl NormalizedTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Cell> {
        let c = self.column_index(column)?;
        self.rows.get(row)?.get(c)
    }
}

pub fn normalize(raw: &RawTable, processing_date: u32) -> Result<NormalizedTable, NormalizeError> {
    let (columns, data) = split_header(raw)?;
    let mut table = fold_ean_columns(columns, data)?;

    table.columns = table.columns.iter().map(|c| text::column_name(c)).collect();
    for row in &mut table.rows {
        for cell in row.iter_mut() {
            standardize_cell(cell);
        }
    }

    table.columns.push(DATE_COLUMN.to_string());
    for row in &mut table.rows {
        row.push(Cell::Int(i64::from(processing_date)));
    }

    tracing::info!(
        rows = table.rows.len(),
        columns = table.columns.len(),
        date = processing_date,
        "Table normalized"
    );
    Ok(table)
}

/// Rows above the header are dropped; the header row names the columns.
fn split_header(raw: &RawTable) -> Result<(Vec<String>, &[Vec<Cell>]), NormalizeError> {
    let idx = raw
        .rows
        .iter()
        .position(|row| row.iter().any(|c| c.as_text() == Some(HEADER_TOKEN)))
        .ok_or(NormalizeError::HeaderNotFound)?;
    tracing::debug!(header_row = idx, "Header row located");

    let columns = raw.rows[idx]
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Cell::Empty => format!("unnamed_{i}"),
            other => other.to_string(),
        })
        .collect();
    Ok((columns, &raw.rows[idx + 1..]))
}

/// Folds `EAN 2` and `EAN 3` into `EAN 1`.
///
/// Base rows keep their `EAN 1`. Each row whose `EAN 2` (resp. `EAN 3`) is text
/// without a hyphen is emitted again with that value as `EAN 1`. Output order is
/// base rows, then the `EAN 2` copies, then the `EAN 3` copies.
fn fold_ean_columns(
    columns: Vec<String>,
    data: &[Vec<Cell>],
) -> Result<NormalizedTable, NormalizeError> {
    let find = |name: &'static str| {
        columns
            .iter()
            .position(|c| c == name)
            .ok_or(NormalizeError::MissingColumn(name))
    };
    let ean1 = find(EAN_1)?;
    let ean2 = find(EAN_2)?;
    let ean3 = find(EAN_3)?;

    let keep: Vec<usize> = (0..columns.len())
        .filter(|&i| i != ean2 && i != ean3)
        .collect();
    let at = |row: &[Cell], i: usize| row.get(i).cloned().unwrap_or(Cell::Empty);
    let project = |row: &[Cell], ean: usize| -> Vec<Cell> {
        keep.iter()
            .map(|&i| if i == ean1 { at(row, ean) } else { at(row, i) })
            .collect()
    };
    let unhyphenated = |row: &[Cell], i: usize| {
        row.get(i)
            .and_then(Cell::as_text)
            .is_some_and(|s| !s.contains('-'))
    };

    let mut rows: Vec<Vec<Cell>> = data.iter().map(|r| project(r.as_slice(), ean1)).collect();
    let from_ean2: Vec<Vec<Cell>> = data
        .iter()
        .filter(|r| unhyphenated(r.as_slice(), ean2))
        .map(|r| project(r.as_slice(), ean2))
        .collect();
    let from_ean3: Vec<Vec<Cell>> = data
        .iter()
        .filter(|r| unhyphenated(r.as_slice(), ean3))
        .map(|r| project(r.as_slice(), ean3))
        .collect();
    tracing::debug!(
        base = rows.len(),
        ean2 = from_ean2.len(),
        ean3 = from_ean3.len(),
        "Barcode columns folded"
    );
    rows.extend(from_ean2);
    rows.extend(from_ean3);

    Ok(NormalizedTable {
        columns: keep.iter().map(|&i| columns[i].clone()).collect(),
        rows,
    })
}

fn standardize_cell(cell: &mut Cell) {
    match cell {
        Cell::Text(s) => *s = text::cell_value(s),
        Cell::Empty | Cell::Int(_) | Cell::Float(_) | Cell::Bool(_) => {}
    }
}
