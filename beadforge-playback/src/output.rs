//! Collaborator traits for speech and sound cues.
//!
//! Both are awaited to completion by the controller. A backend that never
//! completes stalls playback; cancellation happens by dropping the future.

use async_trait::async_trait;
use beadforge_core::vocabulary::{color_clip_path, number_clip_path, voiced_color};
use beadforge_core::{TtsSettings, VoiceToken};

use crate::PlaybackResult;

/// One thing for the voice to say: a token, optionally run-length counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Color and modifiers.
    pub token: VoiceToken,
    /// Beads covered, at least 1.
    pub count: usize,
    /// First position covered.
    pub position: usize,
    /// Localized text, e.g. "3 dark blue".
    pub phrase: String,
    /// Pre-recorded clips to play in order; empty clips mean synthesis only.
    pub clips: Vec<String>,
}

impl Announcement {
    /// Build an announcement using the language and voice folder of `settings`.
    #[must_use]
    pub fn new(token: VoiceToken, count: usize, position: usize, settings: &TtsSettings) -> Self {
        let count = count.max(1);
        let spoken = token.phrase(settings.language, settings.announce_modifiers);
        let phrase = if count > 1 {
            format!("{count} {spoken}")
        } else {
            spoken
        };
        let mut clips = Vec::with_capacity(2);
        if count > 1 {
            if let Some(path) = number_clip_path(settings.language, &settings.voice_folder, count) {
                clips.push(path);
            }
        }
        if let Some(color) = voiced_color(token.color) {
            clips.push(color_clip_path(settings.language, &settings.voice_folder, color));
        }
        Self {
            token,
            count,
            position,
            phrase,
            clips,
        }
    }

    /// Whether every word has a pre-recorded clip.
    #[must_use]
    pub fn fully_recorded(&self) -> bool {
        let needs_count = self.count > 1;
        let has_modifiers = !self.token.modifiers.words().is_empty();
        self.clips.len() == 1 + usize::from(needs_count) && !has_modifiers
    }
}

/// Speech backend.
#[async_trait]
pub trait VoiceOutput: Send + Sync {
    /// Say the announcement; resolves when it has finished playing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PlaybackError::Voice`] if the backend fails.
    async fn speak(&self, announcement: &Announcement) -> PlaybackResult<()>;
}

/// Sound-cue backend.
#[async_trait]
pub trait SoundPlayer: Send + Sync {
    /// Play a cue; resolves when it has finished.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PlaybackError::Sound`] if the cue cannot be played.
    async fn play(&self, sound_id: &str) -> PlaybackResult<()>;
}

/// Backend that completes immediately without output, for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentOutput;

#[async_trait]
impl VoiceOutput for SilentOutput {
    async fn speak(&self, announcement: &Announcement) -> PlaybackResult<()> {
        tracing::trace!("(silent) {}", announcement.phrase);
        Ok(())
    }
}

#[async_trait]
impl SoundPlayer for SilentOutput {
    async fn play(&self, sound_id: &str) -> PlaybackResult<()> {
        tracing::trace!("(silent) sound {sound_id}");
        Ok(())
    }
}
