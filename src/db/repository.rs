use rusqlite::{params_from_iter, Connection, Transaction};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::engine::normalizer::NormalizedTable;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("columns missing from {table} after schema update: {}", missing.join(", "))]
    SchemaMismatch { table: String, missing: Vec<String> },
}

/// Destination for normalized price tables.
pub trait TableStore {
    /// Appends every row, widening the schema first. Returns rows written.
    fn upsert(&self, table: &NormalizedTable) -> Result<usize, StoreError>;
}

/// SQLite table whose columns only ever grow: one nullable TEXT column per
/// normalized column name, plus a surrogate `id`.
pub struct Db {
    path: String,
    table: String,
}

impl Db {
    /// `table` must already be a validated identifier.
    pub fn new(path: &str, table: &str) -> Self {
        Self {
            path: path.to_string(),
            table: table.to_string(),
        }
    }

    /// A fresh connection per call, so an unreachable database surfaces as
    /// an ordinary error at persist time.
    pub fn connect(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Ok(conn)
    }

    pub fn columns(&self, conn: &Connection) -> Result<Vec<String>, StoreError> {
        existing_columns(conn, &self.table)
    }

    pub fn row_count(&self, conn: &Connection) -> Result<i64, StoreError> {
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote(&self.table)),
            [],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

impl TableStore for Db {
    fn upsert(&self, table: &NormalizedTable) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT)",
            quote(&self.table)
        ))?;
        let added = add_missing_columns(&tx, &self.table, &table.columns)?;
        if !added.is_empty() {
            tracing::info!(table = %self.table, columns = ?added, "Schema widened");
        }
        validate_columns(&tx, &self.table, &table.columns)?;
        let rows = insert_rows(&tx, &self.table, table)?;

        tx.commit()?;
        tracing::info!(table = %self.table, rows, "Rows stored");
        Ok(rows)
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn existing_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

/// `ALTER TABLE .. ADD COLUMN` for every incoming column the table lacks.
fn add_missing_columns(
    tx: &Transaction<'_>,
    table: &str,
    incoming: &[String],
) -> Result<Vec<String>, StoreError> {
    let mut existing: HashSet<String> = existing_columns(tx, table)?.into_iter().collect();
    let mut added = Vec::new();
    for col in incoming {
        if existing.contains(col) {
            continue;
        }
        tx.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT",
            quote(table),
            quote(col)
        ))?;
        existing.insert(col.clone());
        added.push(col.clone());
    }
    Ok(added)
}

fn validate_columns(tx: &Transaction<'_>, table: &str, incoming: &[String]) -> Result<(), StoreError> {
    let existing: HashSet<String> = existing_columns(tx, table)?.into_iter().collect();
    let missing: Vec<String> = incoming
        .iter()
        .filter(|c| !existing.contains(*c))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch {
            table: table.to_string(),
            missing,
        })
    }
}

fn insert_rows(tx: &Transaction<'_>, table: &str, data: &NormalizedTable) -> Result<usize, StoreError> {
    if data.columns.is_empty() {
        return Ok(0);
    }
    let cols: Vec<String> = data.columns.iter().map(|c| quote(c)).collect();
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(table),
        cols.join(", "),
        placeholders.join(", ")
    );
    let mut stmt = tx.prepare(&sql)?;
    for row in &data.rows {
        let values = (0..cols.len()).map(|i| row.get(i).and_then(|c| c.to_sql_text()));
        stmt.execute(params_from_iter(values))?;
    }
    Ok(data.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::spreadsheet::Cell;

    fn table(columns: &[&str], rows: Vec<Vec<Cell>>) -> NormalizedTable {
        NormalizedTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    fn db(dir: &tempfile::TempDir) -> Db {
        Db::new(dir.path().join("anvisa.db").to_str().unwrap(), "lista_anvisa_robo")
    }

    #[test]
    fn creates_table_and_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let db = db(&dir);
        let t = table(
            &["substancia", "ean_1", "date_time"],
            vec![
                vec![Cell::text("DIPIRONA"), Cell::text("789100"), Cell::Int(20240312)],
                vec![Cell::text("D'AGUA"), Cell::Empty, Cell::Int(20240312)],
            ],
        );

        assert_eq!(db.upsert(&t).unwrap(), 2);

        let conn = db.connect().unwrap();
        assert_eq!(db.columns(&conn).unwrap(), vec!["id", "substancia", "ean_1", "date_time"]);
        let (name, ean): (String, Option<String>) = conn
            .query_row(
                "SELECT substancia, ean_1 FROM lista_anvisa_robo WHERE id = 2",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(name, "D'AGUA");
        assert_eq!(ean, None);
    }

    #[test]
    fn new_column_is_added_without_touching_others() {
        let dir = tempfile::tempdir().unwrap();
        let db = db(&dir);
        db.upsert(&table(&["substancia", "pf_0"], vec![vec![Cell::text("A"), Cell::Float(1.5)]]))
            .unwrap();

        db.upsert(&table(&["substancia", "nova_coluna"], vec![vec![Cell::text("B"), Cell::text("X")]]))
            .unwrap();

        let conn = db.connect().unwrap();
        let mut stmt = conn.prepare("PRAGMA table_info(lista_anvisa_robo)").unwrap();
        let info: Vec<(String, String, bool)> = stmt
            .query_map([], |r| Ok((r.get(1)?, r.get(2)?, r.get::<_, i64>(3)? != 0)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            info,
            vec![
                ("id".to_string(), "INTEGER".to_string(), false),
                ("substancia".to_string(), "TEXT".to_string(), false),
                ("pf_0".to_string(), "TEXT".to_string(), false),
                ("nova_coluna".to_string(), "TEXT".to_string(), false),
            ]
        );
        assert_eq!(db.row_count(&conn).unwrap(), 2);
    }

    #[test]
    fn null_spellings_become_sql_null() {
        let dir = tempfile::tempdir().unwrap();
        let db = db(&dir);
        db.upsert(&table(
            &["a", "b", "c"],
            vec![vec![Cell::text("null"), Cell::Float(f64::NAN), Cell::Empty]],
        ))
        .unwrap();

        let conn = db.connect().unwrap();
        let nulls: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM lista_anvisa_robo WHERE a IS NULL AND b IS NULL AND c IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(nulls, 1);
    }
}
