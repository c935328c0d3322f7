//! Playback states and the status updates the controller publishes.

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Not playing; position may be anywhere.
    #[default]
    Idle,
    /// Advancing through the stringing order.
    Playing,
    /// Suspended mid-pattern; `play` resumes at the same position.
    Paused,
}

/// Update published on the controller's broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackStatus {
    /// The state machine moved.
    StateChanged(PlaybackState),
    /// The current position changed; `cells` are the beads to highlight.
    Position {
        /// 1-based position, 0 before the first bead.
        position: usize,
        /// Total positions.
        total: usize,
        /// Cells covered by the current announcement.
        cells: Vec<(usize, usize)>,
    },
    /// A bead or group was announced.
    Announced {
        /// First position of the group.
        position: usize,
        /// Beads in the group.
        count: usize,
        /// Spoken text.
        phrase: String,
    },
    /// A text event fired.
    Text {
        /// Position of the event.
        position: usize,
        /// Toast text.
        message: String,
        /// Display time in milliseconds.
        duration: u64,
    },
    /// A pause event suspended playback.
    EventPaused {
        /// Position playback is parked at.
        position: usize,
    },
    /// Beads without a voice were passed over.
    Unvoiced {
        /// First position of the run.
        position: usize,
        /// Beads in the run.
        count: usize,
    },
    /// The global resume checkpoint was written.
    Checkpoint {
        /// Position stored in the checkpoint.
        position: usize,
    },
    /// The last position was voiced.
    Completed {
        /// Beads passed over without a voice during this run.
        unvoiced: usize,
    },
    /// A backend or storage failure; playback keeps its position.
    Error {
        /// Position at the time of failure.
        position: usize,
        /// Description.
        message: String,
    },
}

/// Point-in-time view of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackSnapshot {
    /// State.
    pub state: PlaybackState,
    /// 1-based position, 0 before the first bead.
    pub position: usize,
    /// Total positions.
    pub total: usize,
    /// Beads before the current position; the total once playback completes.
    pub completed: usize,
    /// Beads passed over without a voice.
    pub unvoiced: usize,
}

impl PlaybackSnapshot {
    /// Fraction of the pattern completed, 0.0 to 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed.min(self.total) as f64) / (self.total as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
        assert_eq!(PlaybackSnapshot::default().position, 0);
    }

    #[test]
    fn test_progress() {
        let snapshot = PlaybackSnapshot {
            total: 8,
            completed: 2,
            ..PlaybackSnapshot::default()
        };
        assert!((snapshot.progress() - 0.25).abs() < f64::EPSILON);
        assert!(PlaybackSnapshot::default().progress().abs() < f64::EPSILON);
    }
}
