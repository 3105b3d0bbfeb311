//! JSON state files: the sample history and the notification cursor map.
//!
//! Both files are rewritten whole. Writes go to a sibling temp file first and
//! are then renamed over the target.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::fs;

use crate::error::PersistError;
use crate::history::Sample;

pub const DEFAULT_HISTORY_PATH: &str = "./__history.json";
pub const DEFAULT_CURSOR_PATH: &str = "./__cache.json";

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Returns `Ok(None)` when the file does not exist yet.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    match fs::read_to_string(path).await {
        Ok(s) if s.trim().is_empty() => Ok(None),
        Ok(s) => Ok(Some(serde_json::from_str(&s)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Whole-collection store for observed samples.
#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<Sample>, PersistError> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    pub async fn save(&self, samples: &[Sample]) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec(samples)?;
        write_atomic(&self.path, &bytes).await
    }
}

/// Small key/value JSON object on disk. Keys it does not know about survive rewrites.
#[derive(Debug, Clone)]
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load_all(&self) -> Result<Map<String, Value>, PersistError> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistError> {
        let all = self.load_all().await?;
        match all.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
        }
    }

    /// Set several keys in one read-modify-write.
    pub async fn put_many<T: Serialize>(&self, entries: &[(&str, T)]) -> Result<(), PersistError> {
        // A corrupt file is replaced.
        let mut all = match self.load_all().await {
            Ok(m) => m,
            Err(PersistError::Json(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cursor file unreadable, rewriting");
                Map::new()
            }
            Err(e) => return Err(e),
        };
        for (k, v) in entries {
            all.insert((*k).to_string(), serde_json::to_value(v)?);
        }
        let bytes = serde_json::to_vec_pretty(&all)?;
        write_atomic(&self.path, &bytes).await
    }
}
