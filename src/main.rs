use anyhow::Context;

use anvisa_price_bot::config::Config;
use anvisa_price_bot::data::fetcher::Fetcher;
use anvisa_price_bot::db::Db;
use anvisa_price_bot::engine::runner::{self, RunReport, RunSettings};
use anvisa_price_bot::engine::sink::PersistOutcome;
use anvisa_price_bot::error::RunError;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anvisa_price_bot=info".into()),
        )
        .init();

    let cfg = Config::from_env().context("invalid configuration")?;
    let fetcher = Fetcher::new(&cfg.listing_url, cfg.retry, cfg.request_timeout)?;
    let db = Db::new(&cfg.database_url, &cfg.table);
    let settings = RunSettings {
        checkpoint_path: &cfg.checkpoint_path,
        backup_dir: &cfg.backup_dir,
        stop_policy: cfg.stop_policy,
    };

    tracing::info!(listing = %cfg.listing_url, "ANVISA price bot starting");

    println!("=== ANVISA price list ===");
    let ok = match runner::run_once(&fetcher, &db, &settings).await {
        Ok(report) => {
            print_summary(&report);
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            println!("Run failed: {e}");
            match &e {
                RunError::CheckpointSave { outcome, .. } => {
                    print_outcome(outcome);
                    println!("Checkpoint not saved; the next run will load this file again.");
                }
                _ => println!("Checkpoint left unchanged."),
            }
            false
        }
    };
    println!("=== done ===");

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    match report {
        RunReport::NothingFound => println!("No spreadsheet found on any listing page."),
        RunReport::AlreadyProcessed { latest, checkpoint } => println!(
            "Nothing new: latest file {latest} was already processed (checkpoint {}).",
            checkpoint.last_date
        ),
        RunReport::Processed { file, outcome, .. } => {
            println!("New file {} (page {})", file.date, file.page);
            println!("  {}", file.url);
            print_outcome(outcome);
        }
    }
}

fn print_outcome(outcome: &PersistOutcome) {
    match outcome {
        PersistOutcome::Database { rows } => println!("Stored {rows} rows in the database."),
        PersistOutcome::LocalBackup { path } => {
            println!("Database unavailable; saved local backup {}", path.display())
        }
    }
}
