//! File-backed, cross-session document store.
//!
//! One JSON file per key. The record keeps the envelope the web editor's
//! storage layer used, so existing dumps can be dropped in directly:
//!
//! ```text
//! {"state":{"css":"body{color:red}"},"version":0}
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::core::{DocumentStore, PERSISTED_RECORD_VERSION, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRecord {
    state: PersistedState,
    #[serde(default)]
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    css: String,
}

/// Document store that survives process restarts.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`.
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

impl DocumentStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let bytes = match fs::read(self.record_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: PersistedRecord = serde_json::from_slice(&bytes)?;
        if record.version != PERSISTED_RECORD_VERSION {
            tracing::debug!(
                key,
                version = record.version,
                "loading record written with a different version"
            );
        }
        Ok(Some(record.state.css))
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let record = PersistedRecord {
            state: PersistedState {
                css: value.to_owned(),
            },
            version: PERSISTED_RECORD_VERSION,
        };
        let encoded = serde_json::to_vec(&record)?;

        // Each write gets its own temp file in the target directory, then
        // replaces the record in one rename. Concurrent writers on the same
        // directory never share a temp path; the last rename wins.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Map a key onto a safe file stem.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
