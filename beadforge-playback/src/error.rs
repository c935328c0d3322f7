//! Error types for playback.

use beadforge_core::{PatternError, StoreError};
use thiserror::Error;

/// Result type for playback operations.
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Errors that can occur during playback.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The voice backend failed to announce a bead.
    #[error("Voice output failed: {0}")]
    Voice(String),

    /// A sound cue could not be played.
    #[error("Sound cue {sound_id} failed: {reason}")]
    Sound {
        /// Cue identifier.
        sound_id: String,
        /// Backend message.
        reason: String,
    },

    /// Progress or checkpoint persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// The pattern was resized or re-created while playing.
    #[error("Pattern structure changed during playback")]
    StructureChanged,

    /// No pattern has been loaded with `initialize`.
    #[error("No pattern loaded")]
    NotInitialized,

    /// Playback needs a running tokio runtime.
    #[error("No async runtime available")]
    NoRuntime,

    /// Pattern access failed.
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),
}
