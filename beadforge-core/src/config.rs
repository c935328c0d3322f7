//! Core configuration and user-facing playback settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::BallSizeTable;
use crate::vocabulary::{Language, DEFAULT_VOICE_FOLDER, MAX_NUMBER_CLIP};

/// Default age after which progress records are expired.
pub const DEFAULT_PROGRESS_EXPIRY_DAYS: u32 = 30;

/// Default upper bound on beads announced as one group.
pub const DEFAULT_MAX_GROUP_SIZE: usize = MAX_NUMBER_CLIP;

/// Process-level configuration for the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Directory for the file-backed store; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Progress records untouched for this many days are deleted.
    pub progress_expiry_days: u32,
    /// Supported ball sizes.
    pub ball_sizes: BallSizeTable,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            progress_expiry_days: DEFAULT_PROGRESS_EXPIRY_DAYS,
            ball_sizes: BallSizeTable::default(),
        }
    }
}

impl CoreConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `BEADFORGE_DATA_DIR`: file store directory (default: in-memory)
    /// - `BEADFORGE_PROGRESS_EXPIRY_DAYS`: progress expiry (default: 30)
    /// - `BEADFORGE_BALL_SIZES`: path to a JSON ball size table (default: built-in)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("BEADFORGE_DATA_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let progress_expiry_days = lookup("BEADFORGE_PROGRESS_EXPIRY_DAYS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PROGRESS_EXPIRY_DAYS);
        let ball_sizes = lookup("BEADFORGE_BALL_SIZES")
            .and_then(|path| match load_ball_sizes(&path) {
                Ok(table) => Some(table),
                Err(e) => {
                    tracing::warn!("Ignoring ball size table {path}: {e}");
                    None
                }
            })
            .unwrap_or_default();
        Self {
            data_dir,
            progress_expiry_days,
            ball_sizes,
        }
    }

    /// Progress expiry in milliseconds.
    #[must_use]
    pub fn progress_expiry_ms(&self) -> u64 {
        u64::from(self.progress_expiry_days) * 24 * 60 * 60 * 1000
    }
}

fn load_ball_sizes(path: &str) -> Result<BallSizeTable, String> {
    let json = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    BallSizeTable::from_json(&json).map_err(|e| e.to_string())
}

/// Individual or run-length grouped announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// One announcement per bead.
    #[default]
    Individual,
    /// Consecutive identical beads are announced as "N of color".
    Grouped,
}

/// Persisted playback preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TtsSettings {
    /// Announcement mode.
    pub mode: PlaybackMode,
    /// Spoken language.
    pub language: Language,
    /// Folder of pre-recorded clips.
    pub voice_folder: String,
    /// Speech rate multiplier.
    pub rate: f32,
    /// Output volume, 0.0 to 1.0.
    pub volume: f32,
    /// Whether modifiers are spoken before the color.
    pub announce_modifiers: bool,
    /// Upper bound on beads per group.
    pub max_group_size: usize,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::default(),
            language: Language::default(),
            voice_folder: DEFAULT_VOICE_FOLDER.to_string(),
            rate: 1.0,
            volume: 1.0,
            announce_modifiers: true,
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
        }
    }
}

impl TtsSettings {
    /// Effective group cap: 1 in individual mode, at least 1 otherwise.
    #[must_use]
    pub fn group_limit(&self) -> usize {
        match self.mode {
            PlaybackMode::Individual => 1,
            PlaybackMode::Grouped => self.max_group_size.max(1),
        }
    }
}
