//! Failures that end a run.

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::data::backup::BackupError;
use crate::data::fetcher::FetchError;
use crate::data::spreadsheet::DecodeError;
use crate::engine::normalizer::NormalizeError;
use crate::engine::sink::PersistOutcome;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("download failed: {0}")]
    Transport(#[from] FetchError),
    #[error("spreadsheet could not be decoded: {0}")]
    Decode(#[from] DecodeError),
    #[error("spreadsheet layout not recognised: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("database and local backup both failed: {0}")]
    LocalBackup(#[from] BackupError),
    /// The table was persisted but the new checkpoint was not written.
    #[error("file {date} was persisted but the checkpoint could not be saved: {source}")]
    CheckpointSave {
        date: u32,
        outcome: PersistOutcome,
        #[source]
        source: CheckpointError,
    },
}

impl RunError {
    /// `false` once the table already reached the database or a local backup.
    pub fn nothing_persisted(&self) -> bool {
        !matches!(self, RunError::CheckpointSave { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn io_failure() -> CheckpointError {
        CheckpointError::Io {
            path: PathBuf::from("bot_anvisa_config.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        }
    }

    #[test]
    fn only_post_persist_save_failure_reports_stored_rows() {
        assert!(RunError::Checkpoint(io_failure()).nothing_persisted());
        assert!(RunError::Normalize(NormalizeError::HeaderNotFound).nothing_persisted());

        let err = RunError::CheckpointSave {
            date: 20240312,
            outcome: PersistOutcome::Database { rows: 3 },
            source: io_failure(),
        };
        assert!(!err.nothing_persisted());
        assert!(err.to_string().contains("20240312 was persisted"));
    }
}
