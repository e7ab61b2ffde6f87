//! Progress file shared between runs.
//!
//! On disk the date is a JSON string (`"20240312"`); older files written with a
//! bare number are still accepted.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use chrono_tz::America::Sao_Paulo;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint {} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "ultima_pagina_processada", default)]
    pub last_page: u32,
    #[serde(
        rename = "ultima_data_processada",
        default,
        serialize_with = "date_as_string",
        deserialize_with = "date_from_string_or_number"
    )]
    pub last_date: u32,
}

impl Checkpoint {
    pub fn new(last_page: u32, last_date: u32) -> Self {
        Self {
            last_page,
            last_date,
        }
    }

    /// Page 0, dated today in Brasília time.
    pub fn fresh() -> Self {
        Self::new(0, today())
    }

    /// Whether a file published on `date` still needs processing.
    pub fn is_newer(&self, date: u32) -> bool {
        date > self.last_date
    }

    /// Records a processed file. The date never moves backwards.
    pub fn advance(&mut self, date: u32, page: u32) -> bool {
        if !self.is_newer(date) {
            return false;
        }
        self.last_date = date;
        self.last_page = page;
        true
    }
}

/// Today as `YYYYMMDD`.
pub fn today() -> u32 {
    let now = Utc::now().with_timezone(&Sao_Paulo);
    now.format("%Y%m%d")
        .to_string()
        .parse()
        .unwrap_or_default()
}

/// Loads the checkpoint, writing a fresh one first if the file is missing.
pub fn load(path: &Path) -> Result<Checkpoint, CheckpointError> {
    if !path.exists() {
        let cp = Checkpoint::fresh();
        tracing::info!(path = %path.display(), date = cp.last_date, "No checkpoint yet, creating default");
        save(path, &cp)?;
        return Ok(cp);
    }
    let raw = fs::read_to_string(path).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cp: Checkpoint = serde_json::from_str(&raw).map_err(|source| CheckpointError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(page = cp.last_page, date = cp.last_date, "Checkpoint loaded");
    Ok(cp)
}

/// Writes `<path>.tmp` and renames it over `path`.
pub fn save(path: &Path, cp: &Checkpoint) -> Result<(), CheckpointError> {
    let io_err = |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_string_pretty(cp).map_err(|source| CheckpointError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let tmp = tmp_path(path);
    {
        let mut f = fs::File::create(&tmp).map_err(io_err)?;
        f.write_all(json.as_bytes()).map_err(io_err)?;
        f.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn date_as_string<S: Serializer>(date: &u32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&date.to_string())
}

fn date_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u32),
    }
    match Raw::deserialize(d)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("date {s:?} is not YYYYMMDD digits"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_is_written_as_string() {
        let json = serde_json::to_value(Checkpoint::new(40, 20240312)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ultima_pagina_processada": 40, "ultima_data_processada": "20240312"})
        );
    }

    #[test]
    fn accepts_string_or_number_date() {
        let a: Checkpoint =
            serde_json::from_str(r#"{"ultima_pagina_processada": 20, "ultima_data_processada": "20240101"}"#).unwrap();
        let b: Checkpoint =
            serde_json::from_str(r#"{"ultima_pagina_processada": 20, "ultima_data_processada": 20240101}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.last_date, 20240101);

        let bad = serde_json::from_str::<Checkpoint>(r#"{"ultima_data_processada": "ontem"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_anvisa_config.json");

        let cp = load(&path).unwrap();
        assert_eq!(cp.last_page, 0);
        assert_eq!(cp.last_date, today());
        assert!(path.exists());
        assert_eq!(load(&path).unwrap(), cp);
    }

    #[test]
    fn save_replaces_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cp.json");

        save(&path, &Checkpoint::new(0, 20240101)).unwrap();
        save(&path, &Checkpoint::new(60, 20240301)).unwrap();

        assert_eq!(load(&path).unwrap(), Checkpoint::new(60, 20240301));
        assert!(!tmp_path(&path).exists());
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn advance_is_monotonic() {
        let mut cp = Checkpoint::new(0, 20240301);
        assert!(!cp.advance(20240301, 20));
        assert!(!cp.advance(20240101, 20));
        assert_eq!(cp, Checkpoint::new(0, 20240301));
        assert!(cp.advance(20240415, 40));
        assert_eq!(cp, Checkpoint::new(40, 20240415));
    }
}
