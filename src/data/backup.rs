use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, XlsxError};
use thiserror::Error;

use crate::data::spreadsheet::Cell;
use crate::engine::normalizer::NormalizedTable;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("cannot create backup directory {}: {source}", path.display())]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write workbook {}: {source}", path.display())]
    Workbook {
        path: PathBuf,
        #[source]
        source: XlsxError,
    },
    #[error("table does not fit in one worksheet ({rows} rows x {cols} columns)")]
    TooLarge { rows: usize, cols: usize },
}

/// `<dir>/lista_anvisa_<date>_pagina_<page>.xlsx`
pub fn backup_path(dir: &Path, date: u32, page: u32) -> PathBuf {
    dir.join(format!("lista_anvisa_{date}_pagina_{page}.xlsx"))
}

/// Writes the table as a single-sheet workbook: header row, then typed cells.
pub fn write_backup(
    table: &NormalizedTable,
    dir: &Path,
    date: u32,
    page: u32,
) -> Result<PathBuf, BackupError> {
    std::fs::create_dir_all(dir).map_err(|source| BackupError::Dir {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = backup_path(dir, date, page);

    let too_large = || BackupError::TooLarge {
        rows: table.rows.len(),
        cols: table.columns.len(),
    };
    let wb_err = |source| BackupError::Workbook {
        path: path.clone(),
        source,
    };

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();

    for (c, name) in table.columns.iter().enumerate() {
        let col = u16::try_from(c).map_err(|_| too_large())?;
        ws.write_string(0, col, name).map_err(wb_err)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        let row_idx = u32::try_from(r + 1).map_err(|_| too_large())?;
        for (c, cell) in row.iter().enumerate() {
            let col = u16::try_from(c).map_err(|_| too_large())?;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    ws.write_string(row_idx, col, s).map_err(wb_err)?;
                }
                Cell::Int(i) => {
                    ws.write_number(row_idx, col, *i as f64).map_err(wb_err)?;
                }
                Cell::Float(x) if x.is_nan() => {}
                Cell::Float(x) => {
                    ws.write_number(row_idx, col, *x).map_err(wb_err)?;
                }
                Cell::Bool(b) => {
                    ws.write_boolean(row_idx, col, *b).map_err(wb_err)?;
                }
            }
        }
    }

    wb.save(&path).map_err(wb_err)?;
    tracing::info!(path = %path.display(), rows = table.rows.len(), "Local backup written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::spreadsheet;

    #[test]
    fn path_convention() {
        assert_eq!(
            backup_path(Path::new("backup_anvisa"), 20240312, 40),
            PathBuf::from("backup_anvisa/lista_anvisa_20240312_pagina_40.xlsx")
        );
    }

    #[test]
    fn backup_is_readable_spreadsheet() {
        let dir = tempfile::tempdir().unwrap();
        let table = NormalizedTable {
            columns: vec!["substancia".into(), "pf_0".into(), "date_time".into()],
            rows: vec![vec![
                Cell::text("ACIDO FOLICO"),
                Cell::Float(3.25),
                Cell::Int(20240312),
            ]],
        };

        let path = write_backup(&table, &dir.path().join("nested"), 20240312, 20).unwrap();
        assert!(path.ends_with("lista_anvisa_20240312_pagina_20.xlsx"));

        let bytes = std::fs::read(&path).unwrap();
        let raw = spreadsheet::decode(&bytes).unwrap();
        assert_eq!(raw.rows[0][0], Cell::text("substancia"));
        assert_eq!(raw.rows[1][0], Cell::text("ACIDO FOLICO"));
        assert_eq!(raw.rows[1][1], Cell::Float(3.25));
    }
}
