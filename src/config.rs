use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::data::fetcher::RetryPolicy;
use crate::engine::locator::StopPolicy;

const DEFAULT_LISTING_URL: &str =
    "https://www.gov.br/anvisa/pt-br/assuntos/medicamentos/cmed/precos/arquivos";

pub struct Config {
    pub listing_url: String,
    pub database_url: String,
    pub table: String,
    pub checkpoint_path: PathBuf,
    pub backup_dir: PathBuf,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub stop_policy: StopPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.into(),
            database_url: "./data/anvisa.db".into(),
            table: "lista_anvisa_robo".into(),
            checkpoint_path: PathBuf::from("bot_anvisa_config.json"),
            backup_dir: PathBuf::from("backup_anvisa"),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(300),
            stop_policy: StopPolicy::StopOnFailure,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(url) = lookup("ANVISA_LISTING_URL") {
            cfg.listing_url = url;
        }
        if let Some(db) = lookup("DATABASE_URL") {
            cfg.database_url = db;
        }
        if let Some(table) = lookup("ANVISA_TABLE") {
            cfg.table = table;
        }
        if !is_identifier(&cfg.table) {
            bail!("ANVISA_TABLE must be a plain SQL identifier, got {:?}", cfg.table);
        }
        if let Some(path) = lookup("CHECKPOINT_PATH") {
            cfg.checkpoint_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("BACKUP_DIR") {
            cfg.backup_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("FETCH_MAX_RETRIES") {
            cfg.retry.max_retries = v
                .trim()
                .parse()
                .with_context(|| format!("FETCH_MAX_RETRIES is not a number: {v}"))?;
        }
        if let Some(v) = lookup("FETCH_RETRY_DELAY_MS") {
            let ms: u64 = v
                .trim()
                .parse()
                .with_context(|| format!("FETCH_RETRY_DELAY_MS is not a number: {v}"))?;
            cfg.retry.delay = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("FETCH_TIMEOUT_SECS") {
            let secs: u64 = v
                .trim()
                .parse()
                .with_context(|| format!("FETCH_TIMEOUT_SECS is not a number: {v}"))?;
            cfg.request_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("ON_FETCH_FAILURE") {
            cfg.stop_policy = match v.trim().to_ascii_lowercase().as_str() {
                "stop" => StopPolicy::StopOnFailure,
                "skip" => StopPolicy::SkipFailed,
                other => bail!("ON_FETCH_FAILURE must be `stop` or `skip`, got {other:?}"),
            };
        }

        Ok(cfg)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_source_behaviour() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.table, "lista_anvisa_robo");
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.delay, Duration::ZERO);
        assert_eq!(cfg.request_timeout, Duration::from_secs(300));
        assert_eq!(cfg.stop_policy, StopPolicy::StopOnFailure);
        assert_eq!(cfg.checkpoint_path, PathBuf::from("bot_anvisa_config.json"));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = Config::from_lookup(lookup(&[
            ("FETCH_MAX_RETRIES", "5"),
            ("FETCH_RETRY_DELAY_MS", "250"),
            ("ON_FETCH_FAILURE", "Skip"),
            ("ANVISA_TABLE", "precos_2024"),
        ]))
        .unwrap();
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.delay, Duration::from_millis(250));
        assert_eq!(cfg.stop_policy, StopPolicy::SkipFailed);
        assert_eq!(cfg.table, "precos_2024");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[("FETCH_MAX_RETRIES", "three")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ON_FETCH_FAILURE", "retry")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ANVISA_TABLE", "x; DROP TABLE y")])).is_err());
    }
}
