use std::path::{Path, PathBuf};

use crate::data::backup::{self, BackupError};
use crate::db::repository::TableStore;
use crate::engine::normalizer::NormalizedTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Database { rows: usize },
    LocalBackup { path: PathBuf },
}

impl PersistOutcome {
    /// `true` only when the rows reached the database.
    pub fn stored_in_database(&self) -> bool {
        matches!(self, PersistOutcome::Database { .. })
    }
}

/// Database first; on any store error the table is written once as a local
/// workbook instead. Fails only when that backup fails too.
pub fn persist<S: TableStore>(
    store: &S,
    backup_dir: &Path,
    table: &NormalizedTable,
    date: u32,
    page: u32,
) -> Result<PersistOutcome, BackupError> {
    match store.upsert(table) {
        Ok(rows) => Ok(PersistOutcome::Database { rows }),
        Err(e) => {
            tracing::error!(error = %e, date, page, "Database write failed, saving local backup");
            let path = backup::write_backup(table, backup_dir, date, page)?;
            Ok(PersistOutcome::LocalBackup { path })
        }
    }
}
