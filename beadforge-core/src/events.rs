//! Scripted per-position events.
//!
//! Events are attached to 1-based stringing positions and fire before or
//! after the bead at that position is announced. Execution lives in the
//! playback crate; this module only owns the data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{PatternError, PatternResult};

/// When an event fires relative to the announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventTiming {
    /// Before the bead is voiced.
    #[default]
    Before,
    /// After the bead is voiced.
    After,
}

/// Control action carried by [`CellEvent::Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Suspend playback until the user resumes.
    Pause,
    /// Mark a resume checkpoint.
    Checkpoint,
}

/// A scripted event at one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CellEvent {
    /// Play a sound cue and wait for it to finish.
    #[serde(rename_all = "camelCase")]
    Sound {
        /// Cue identifier understood by the sound player.
        sound_id: String,
        /// Firing time.
        #[serde(default)]
        timing: EventTiming,
    },
    /// Control action.
    #[serde(rename_all = "camelCase")]
    Action {
        /// What to do.
        action_type: ActionType,
        /// Firing time.
        #[serde(default)]
        timing: EventTiming,
    },
    /// Show a toast.
    #[serde(rename_all = "camelCase")]
    Text {
        /// Toast text.
        message: String,
        /// Display time in milliseconds.
        duration: u64,
        /// Firing time.
        #[serde(default)]
        timing: EventTiming,
    },
}

impl CellEvent {
    /// Sound cue event.
    #[must_use]
    pub fn sound(sound_id: impl Into<String>, timing: EventTiming) -> Self {
        Self::Sound {
            sound_id: sound_id.into(),
            timing,
        }
    }

    /// Pause action.
    #[must_use]
    pub const fn pause(timing: EventTiming) -> Self {
        Self::Action {
            action_type: ActionType::Pause,
            timing,
        }
    }

    /// Checkpoint marker.
    #[must_use]
    pub const fn checkpoint(timing: EventTiming) -> Self {
        Self::Action {
            action_type: ActionType::Checkpoint,
            timing,
        }
    }

    /// Toast message.
    #[must_use]
    pub fn text(message: impl Into<String>, duration: u64, timing: EventTiming) -> Self {
        Self::Text {
            message: message.into(),
            duration,
            timing,
        }
    }

    /// Firing time.
    #[must_use]
    pub const fn timing(&self) -> EventTiming {
        match self {
            Self::Sound { timing, .. } | Self::Action { timing, .. } | Self::Text { timing, .. } => *timing,
        }
    }
}

/// Events of one pattern, keyed by 1-based position, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternEvents {
    events: BTreeMap<usize, Vec<CellEvent>>,
}

impl PatternEvents {
    /// Create an empty event map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event at a position.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidPosition`] for position 0.
    pub fn add(&mut self, position: usize, event: CellEvent) -> PatternResult<()> {
        if position == 0 {
            return Err(PatternError::InvalidPosition(position));
        }
        self.events.entry(position).or_default().push(event);
        Ok(())
    }

    /// Remove the `index`-th event at a position.
    pub fn remove(&mut self, position: usize, index: usize) -> Option<CellEvent> {
        let list = self.events.get_mut(&position)?;
        if index >= list.len() {
            return None;
        }
        let removed = list.remove(index);
        if list.is_empty() {
            self.events.remove(&position);
        }
        Some(removed)
    }

    /// Replace the `index`-th event at a position, returning the previous one.
    pub fn update(&mut self, position: usize, index: usize, event: CellEvent) -> Option<CellEvent> {
        self.events
            .get_mut(&position)
            .and_then(|list| list.get_mut(index))
            .map(|slot| std::mem::replace(slot, event))
    }

    /// Drop every event at a position.
    pub fn clear_position(&mut self, position: usize) -> Vec<CellEvent> {
        self.events.remove(&position).unwrap_or_default()
    }

    /// Drop every event.
    pub fn clear_all(&mut self) {
        self.events.clear();
    }

    /// Events at a position, in insertion order.
    #[must_use]
    pub fn at(&self, position: usize) -> &[CellEvent] {
        self.events.get(&position).map_or(&[], Vec::as_slice)
    }

    /// Events at a position with the given timing.
    pub fn with_timing(&self, position: usize, timing: EventTiming) -> impl Iterator<Item = &CellEvent> {
        self.at(position).iter().filter(move |e| e.timing() == timing)
    }

    /// Whether a position has any event.
    #[must_use]
    pub fn has_events(&self, position: usize) -> bool {
        self.events.contains_key(&position)
    }

    /// Whether a position has an event of the given timing.
    #[must_use]
    pub fn has_timing(&self, position: usize, timing: EventTiming) -> bool {
        self.with_timing(position, timing).next().is_some()
    }

    /// Positions with events, ascending.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.events.keys().copied()
    }

    /// Total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    /// `true` when no position has events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize to a JSON object keyed by position.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is not an event map.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_insertion_order() {
        let mut events = PatternEvents::new();
        events
            .add(5, CellEvent::sound("bell", EventTiming::Before))
            .expect("add");
        events.add(5, CellEvent::pause(EventTiming::After)).expect("add");
        events
            .add(5, CellEvent::text("halfway", 2000, EventTiming::Before))
            .expect("add");

        assert_eq!(events.at(5).len(), 3);
        assert!(matches!(events.at(5)[0], CellEvent::Sound { .. }));
        assert_eq!(events.with_timing(5, EventTiming::Before).count(), 2);
        assert!(events.has_timing(5, EventTiming::After));
        assert!(!events.has_timing(4, EventTiming::After));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_position_zero_rejected() {
        let mut events = PatternEvents::new();
        assert!(matches!(
            events.add(0, CellEvent::pause(EventTiming::Before)),
            Err(PatternError::InvalidPosition(0))
        ));
    }

    #[test]
    fn test_remove_and_update() {
        let mut events = PatternEvents::new();
        events.add(2, CellEvent::pause(EventTiming::Before)).expect("add");

        let previous = events.update(2, 0, CellEvent::checkpoint(EventTiming::After));
        assert_eq!(previous, Some(CellEvent::pause(EventTiming::Before)));
        assert!(events.update(2, 1, CellEvent::pause(EventTiming::Before)).is_none());

        assert!(events.remove(2, 3).is_none());
        assert_eq!(events.remove(2, 0), Some(CellEvent::checkpoint(EventTiming::After)));
        assert!(!events.has_events(2));
        assert!(events.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut events = PatternEvents::new();
        events.add(1, CellEvent::pause(EventTiming::Before)).expect("add");
        events.add(9, CellEvent::pause(EventTiming::Before)).expect("add");
        assert_eq!(events.clear_position(1).len(), 1);
        assert_eq!(events.positions().collect::<Vec<_>>(), vec![9]);
        events.clear_all();
        assert!(events.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let mut events = PatternEvents::new();
        events
            .add(12, CellEvent::sound("chime", EventTiming::After))
            .expect("add");
        let value = serde_json::to_value(&events).expect("serialize");
        assert_eq!(value["12"][0]["type"], "sound");
        assert_eq!(value["12"][0]["soundId"], "chime");
        assert_eq!(value["12"][0]["timing"], "after");

        let json = r#"{"3":[{"type":"action","actionType":"pause"}]}"#;
        let parsed = PatternEvents::from_json(json).expect("parse");
        assert_eq!(parsed.at(3), &[CellEvent::pause(EventTiming::Before)]);
        assert_eq!(
            PatternEvents::from_json(&events.to_json().expect("json")).expect("parse"),
            events
        );
    }
}
