//! Key-value persistence contract and its two backends.
//!
//! The core never holds process-wide state: callers inject a
//! [`KeyValueStore`] and the typed layer in [`crate::storage`] builds on it.
//! Every record is wrapped in a [`StoredRecord`] carrying its write time so
//! records can be expired by age without decoding the payload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A stored pattern document no longer describes a valid pattern.
    #[error("Stored pattern is invalid: {0}")]
    Pattern(#[from] crate::PatternError),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// A persisted value plus its write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Milliseconds since the Unix epoch at write time.
    pub updated_at: u64,
    /// Payload.
    pub value: serde_json::Value,
}

impl StoredRecord {
    /// Wrap a value stamped with the current time.
    #[must_use]
    pub fn now(value: serde_json::Value) -> Self {
        Self {
            updated_at: current_timestamp_ms(),
            value,
        }
    }
}

/// Read/write/delete/enumerate by key.
///
/// Concurrent writes to one key are last-write-wins.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>>;

    /// Write a record, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn put(&self, key: &str, record: StoredRecord) -> StoreResult<()>;

    /// Delete a record; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Keys starting with `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// In-memory store, cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, StoredRecord>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>> {
        let records = self
            .records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(records.get(key).cloned())
    }

    fn put(&self, key: &str, record: StoredRecord) -> StoreResult<()> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        records.insert(key.to_string(), record);
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(records.remove(key).is_some())
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let records = self
            .records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut keys: Vec<String> = records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// On-disk form: the record plus its original key, since file names are
/// sanitized and cannot be mapped back.
#[derive(Debug, Serialize, Deserialize)]
struct FileEnvelope {
    key: String,
    #[serde(flatten)]
    record: StoredRecord,
}

/// JSON-file store: one `{sanitized key}.json` file per record.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open a store rooted at `data_dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Root directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", sanitize_filename(key)))
    }

    fn read_envelope(path: &Path) -> StoreResult<Option<FileEnvelope>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>> {
        Ok(Self::read_envelope(&self.path_for(key))?
            .filter(|env| env.key == key)
            .map(|env| env.record))
    }

    fn put(&self, key: &str, record: StoredRecord) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(&FileEnvelope {
            key: key.to_string(),
            record,
        })?;
        let path = self.path_for(key);
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Readers only ever see a complete file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key);
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match Self::read_envelope(&path) {
                Ok(Some(env)) if env.key.starts_with(prefix) => keys.push(env.key),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable record {}: {e}", path.display()),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Sanitize a key for use as a filename.
///
/// Replaces any character that is not alphanumeric, `-`, or `_` with `_`.
fn sanitize_filename(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| {
        // Timestamp will not exceed u64 max for millennia
        #[allow(clippy::cast_possible_truncation)]
        {
            d.as_millis() as u64
        }
    })
}
