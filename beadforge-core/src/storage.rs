//! Typed records on top of a [`KeyValueStore`].
//!
//! | Key                              | Record                 |
//! |----------------------------------|------------------------|
//! | `beadforge:autosave`             | [`PatternDto`]         |
//! | `beadforge:tts-settings`         | [`TtsSettings`]        |
//! | `beadforge:events:{pattern id}`  | [`PatternEvents`]      |
//! | `beadforge:mappings:{pattern id}`| user mapping overrides |
//! | `beadforge:checkpoint`           | [`Checkpoint`]         |
//! | `beadforge:progress:{hash}`      | [`ProgressRecord`]     |
//!
//! Progress is keyed by [`Pattern::content_hash`], not by id, so a pattern
//! reloaded under a fresh id still finds its progress.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{CoreConfig, TtsSettings};
use crate::dto::PatternDto;
use crate::events::PatternEvents;
use crate::mapping::ColorMapping;
use crate::pattern::PatternId;
use crate::persist::{
    current_timestamp_ms, FileStore, KeyValueStore, MemoryStore, StoreResult, StoredRecord,
};
use crate::Pattern;

const AUTOSAVE_KEY: &str = "beadforge:autosave";
const SETTINGS_KEY: &str = "beadforge:tts-settings";
const CHECKPOINT_KEY: &str = "beadforge:checkpoint";
const EVENTS_PREFIX: &str = "beadforge:events:";
const MAPPINGS_PREFIX: &str = "beadforge:mappings:";
const PROGRESS_PREFIX: &str = "beadforge:progress:";

/// The single global resume point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Nominal id of the pattern at write time.
    pub pattern_id: String,
    /// Content identity; this is what resuming matches on.
    pub content_hash: String,
    /// 1-based position to resume at.
    pub position: usize,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl Checkpoint {
    /// Checkpoint for `pattern` at `position`, stamped now.
    #[must_use]
    pub fn new(pattern: &Pattern, position: usize) -> Self {
        Self {
            pattern_id: pattern.meta.id.to_string(),
            content_hash: pattern.content_hash(),
            position,
            timestamp: current_timestamp_ms(),
        }
    }
}

/// Per-content playback progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Next position to voice.
    pub position: usize,
    /// Beads already voiced.
    pub completed: usize,
    /// Total positions.
    pub total: usize,
    /// Milliseconds since the Unix epoch.
    pub last_updated: u64,
}

/// Typed access to every persisted record.
#[derive(Debug, Clone)]
pub struct BeadforgeStorage {
    store: Arc<dyn KeyValueStore>,
    progress_expiry_ms: u64,
}

impl BeadforgeStorage {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, config: &CoreConfig) -> Self {
        Self {
            store,
            progress_expiry_ms: config.progress_expiry_ms(),
        }
    }

    /// In-memory storage with default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), &CoreConfig::default())
    }

    /// File-backed storage when `config.data_dir` is set, in-memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Io`] if the data directory cannot be created.
    pub fn from_config(config: &CoreConfig) -> StoreResult<Self> {
        let store: Arc<dyn KeyValueStore> = match &config.data_dir {
            Some(dir) => {
                tracing::info!("Using file store at {}", dir.display());
                Arc::new(FileStore::open(dir)?)
            }
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(store, config))
    }

    /// Underlying key-value store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.store
            .put(key, StoredRecord::now(serde_json::to_value(value)?))
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.store
            .get(key)?
            .map(|record| serde_json::from_value(record.value))
            .transpose()
            .map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Autosave
    // -----------------------------------------------------------------------

    /// Save the working pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save_autosave(&self, pattern: &Pattern) -> StoreResult<()> {
        self.put_json(AUTOSAVE_KEY, &PatternDto::from(pattern))
    }

    /// Load the working pattern, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unreadable or no longer a valid pattern.
    pub fn load_autosave(&self) -> StoreResult<Option<Pattern>> {
        match self.get_json::<PatternDto>(AUTOSAVE_KEY)? {
            Some(dto) => Ok(Some(dto.into_pattern()?)),
            None => Ok(None),
        }
    }

    /// Forget the working pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear_autosave(&self) -> StoreResult<()> {
        self.store.delete(AUTOSAVE_KEY).map(|_| ())
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Save playback settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save_settings(&self, settings: &TtsSettings) -> StoreResult<()> {
        self.put_json(SETTINGS_KEY, settings)
    }

    /// Playback settings; defaults when missing or unreadable.
    #[must_use]
    pub fn load_settings(&self) -> TtsSettings {
        match self.get_json(SETTINGS_KEY) {
            Ok(Some(settings)) => settings,
            Ok(None) => TtsSettings::default(),
            Err(e) => {
                tracing::warn!("Falling back to default playback settings: {e}");
                TtsSettings::default()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Events and mapping overrides
    // -----------------------------------------------------------------------

    /// Save the event map of a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save_events(&self, pattern_id: &PatternId, events: &PatternEvents) -> StoreResult<()> {
        self.put_json(&format!("{EVENTS_PREFIX}{pattern_id}"), events)
    }

    /// Event map of a pattern; empty when none was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unreadable.
    pub fn load_events(&self, pattern_id: &PatternId) -> StoreResult<PatternEvents> {
        Ok(self
            .get_json(&format!("{EVENTS_PREFIX}{pattern_id}"))?
            .unwrap_or_default())
    }

    /// Delete the event map of a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn delete_events(&self, pattern_id: &PatternId) -> StoreResult<bool> {
        self.store.delete(&format!("{EVENTS_PREFIX}{pattern_id}"))
    }

    /// Save the user overrides among `mappings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save_mapping_overrides<'a>(
        &self,
        pattern_id: &PatternId,
        mappings: impl IntoIterator<Item = &'a ColorMapping>,
    ) -> StoreResult<()> {
        let overrides: Vec<&ColorMapping> =
            mappings.into_iter().filter(|m| !m.is_auto_mapped).collect();
        self.put_json(&format!("{MAPPINGS_PREFIX}{pattern_id}"), &overrides)
    }

    /// Saved overrides of a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unreadable.
    pub fn load_mapping_overrides(&self, pattern_id: &PatternId) -> StoreResult<Vec<ColorMapping>> {
        Ok(self
            .get_json(&format!("{MAPPINGS_PREFIX}{pattern_id}"))?
            .unwrap_or_default())
    }

    // -----------------------------------------------------------------------
    // Checkpoint and progress
    // -----------------------------------------------------------------------

    /// Replace the global resume checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        tracing::debug!(
            "Checkpoint at position {} for {}",
            checkpoint.position,
            checkpoint.content_hash
        );
        self.put_json(CHECKPOINT_KEY, checkpoint)
    }

    /// The global resume checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unreadable.
    pub fn load_checkpoint(&self) -> StoreResult<Option<Checkpoint>> {
        self.get_json(CHECKPOINT_KEY)
    }

    /// Delete the global resume checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear_checkpoint(&self) -> StoreResult<()> {
        self.store.delete(CHECKPOINT_KEY).map(|_| ())
    }

    /// Save progress for a content hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save_progress(&self, content_hash: &str, progress: &ProgressRecord) -> StoreResult<()> {
        self.put_json(&format!("{PROGRESS_PREFIX}{content_hash}"), progress)
    }

    /// Progress for a content hash; expired records read as missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unreadable.
    pub fn load_progress(&self, content_hash: &str) -> StoreResult<Option<ProgressRecord>> {
        let key = format!("{PROGRESS_PREFIX}{content_hash}");
        let Some(record) = self.store.get(&key)? else {
            return Ok(None);
        };
        if self.is_expired(&record, current_timestamp_ms()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(record.value)?))
    }

    /// Delete progress for a content hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear_progress(&self, content_hash: &str) -> StoreResult<bool> {
        self.store.delete(&format!("{PROGRESS_PREFIX}{content_hash}"))
    }

    /// Delete progress records older than the configured expiry as of `now_ms`.
    /// Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated or written.
    pub fn expire_progress(&self, now_ms: u64) -> StoreResult<usize> {
        let mut expired = 0;
        for key in self.store.list(PROGRESS_PREFIX)? {
            let Some(record) = self.store.get(&key)? else {
                continue;
            };
            if self.is_expired(&record, now_ms) && self.store.delete(&key)? {
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!("Expired {expired} progress records");
        }
        Ok(expired)
    }

    fn is_expired(&self, record: &StoredRecord, now_ms: u64) -> bool {
        now_ms.saturating_sub(record.updated_at) > self.progress_expiry_ms
    }
}
