use std::path::Path;

use crate::checkpoint::{self, Checkpoint};
use crate::data::fetcher::ListingSource;
use crate::data::spreadsheet;
use crate::db::repository::TableStore;
use crate::engine::locator::{self, CandidateFile, StopPolicy};
use crate::engine::normalizer;
use crate::engine::sink::{self, PersistOutcome};
use crate::error::RunError;

pub struct RunSettings<'a> {
    pub checkpoint_path: &'a Path,
    pub backup_dir: &'a Path,
    pub stop_policy: StopPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    NothingFound,
    AlreadyProcessed { latest: u32, checkpoint: Checkpoint },
    Processed {
        file: CandidateFile,
        outcome: PersistOutcome,
        checkpoint: Checkpoint,
    },
}

/// One discovery-and-load cycle.
///
/// The checkpoint is saved only after the table reached the database or a
/// local backup; every earlier failure leaves it untouched. A failed save
/// after that point is reported as `RunError::CheckpointSave`.
pub async fn run_once<S, T>(source: &S, store: &T, settings: &RunSettings<'_>) -> Result<RunReport, RunError>
where
    S: ListingSource,
    T: TableStore,
{
    let mut cp = checkpoint::load(settings.checkpoint_path)?;
    tracing::info!(page = cp.last_page, date = cp.last_date, "Last processed");

    let Some(file) = locator::locate_latest(source, settings.stop_policy).await else {
        return Ok(RunReport::NothingFound);
    };
    if !cp.is_newer(file.date) {
        tracing::info!(latest = file.date, processed = cp.last_date, "Latest spreadsheet already processed");
        return Ok(RunReport::AlreadyProcessed {
            latest: file.date,
            checkpoint: cp,
        });
    }

    tracing::info!(date = file.date, page = file.page, url = %file.url, "Processing new spreadsheet");
    let bytes = source.download(&file.url).await?;
    let raw = spreadsheet::decode(&bytes)?;
    let table = normalizer::normalize(&raw, file.date)?;
    let outcome = sink::persist(store, settings.backup_dir, &table, file.date, file.page)?;

    cp.advance(file.date, file.page);
    if let Err(source) = checkpoint::save(settings.checkpoint_path, &cp) {
        return Err(RunError::CheckpointSave {
            date: file.date,
            outcome,
            source,
        });
    }
    tracing::info!(date = cp.last_date, page = cp.last_page, "Checkpoint advanced");

    Ok(RunReport::Processed {
        file,
        outcome,
        checkpoint: cp,
    })
}
