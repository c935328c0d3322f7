//! Runs the scripted events attached to a position.

use beadforge_core::{ActionType, CellEvent, PatternEvents};

use crate::output::SoundPlayer;
use crate::PlaybackError;

/// Receives the side effects of event execution.
pub trait EventSink: Send {
    /// A pause action fired at `position`.
    fn on_pause(&mut self, position: usize);

    /// A text event fired; never blocks playback.
    fn on_text(&mut self, position: usize, message: &str, duration: u64);

    /// A checkpoint marker was reached.
    fn on_checkpoint(&mut self, _position: usize) {}

    /// The event at `index` finished; a pause action is reported through
    /// [`EventRun::Paused`] instead.
    fn on_event_done(&mut self, _index: usize) {}

    /// A sound cue failed; execution continues with the next event.
    fn on_sound_error(&mut self, position: usize, error: &PlaybackError) {
        tracing::warn!("Sound cue at position {position} failed: {error}");
    }
}

/// How a run of events ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRun {
    /// Every event ran; playback continues.
    Continue,
    /// A pause action stopped the run. `resume_at` is the index of the event
    /// after the pause.
    Paused {
        /// Index to resume from.
        resume_at: usize,
    },
}

/// Run `events[start..]` in order.
///
/// Sound cues are awaited to completion. Text events and checkpoint markers
/// go to the sink without blocking. A pause action notifies the sink and
/// stops the run.
pub async fn run_events(
    events: &[CellEvent],
    start: usize,
    position: usize,
    sounds: &dyn SoundPlayer,
    sink: &mut dyn EventSink,
) -> EventRun {
    for (index, event) in events.iter().enumerate().skip(start) {
        match event {
            CellEvent::Sound { sound_id, .. } => {
                if let Err(e) = sounds.play(sound_id).await {
                    sink.on_sound_error(position, &e);
                }
            }
            CellEvent::Action {
                action_type: ActionType::Pause,
                ..
            } => {
                sink.on_pause(position);
                return EventRun::Paused {
                    resume_at: index + 1,
                };
            }
            CellEvent::Action {
                action_type: ActionType::Checkpoint,
                ..
            } => sink.on_checkpoint(position),
            CellEvent::Text {
                message, duration, ..
            } => sink.on_text(position, message, *duration),
        }
        sink.on_event_done(index);
    }
    EventRun::Continue
}

/// Run every event at `position`; returns `false` if a pause action fired.
pub async fn execute_events_at_position(
    events: &PatternEvents,
    position: usize,
    sounds: &dyn SoundPlayer,
    sink: &mut dyn EventSink,
) -> bool {
    run_events(events.at(position), 0, position, sounds, sink).await == EventRun::Continue
}
