//! # Playback Controller
//!
//! Reads a pattern aloud in stringing order.
//!
//! ```text
//!  initialize ──► Idle ──play──► Playing ──pause / pause event / error──► Paused
//!                  ▲               │   ▲                                   │
//!                  │               │   └───────────────play────────────────┘
//!                  └──stop / done──┘
//! ```
//!
//! A step runs the `before` events of its first bead, voices the bead (or
//! the whole group in grouped mode), runs the `after` events of its last
//! bead and advances. The step cursor records which of these has finished,
//! so a pause never skips or repeats part of a step.
//!
//! Every await is raced against a generation counter. `pause`, `stop` and
//! seeks bump it, which drops the in-flight request; a completion from an
//! older generation is discarded and never moves the position.

use std::future::Future;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use beadforge_core::persist::current_timestamp_ms;
use beadforge_core::{
    BeadforgeStorage, CellEvent, Checkpoint, ColorMappingStore, EventTiming, Modifiers, Pattern,
    PatternEvents, PatternId, ProgressRecord, Resolution, StringingOrder, TtsSettings,
};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

use crate::executor::{run_events, EventRun, EventSink};
use crate::grouping::{group_length, resolve_position};
use crate::output::{Announcement, SilentOutput, SoundPlayer, VoiceOutput};
use crate::state::{PlaybackSnapshot, PlaybackState, PlaybackStatus};
use crate::{PlaybackError, PlaybackResult};

/// Buffered status updates per subscriber.
const STATUS_CHANNEL_CAPACITY: usize = 100;

/// How far the current step has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepPhase {
    Before { next_event: usize },
    Voice,
    After { next_event: usize, group_len: usize },
}

impl StepPhase {
    const START: Self = Self::Before { next_event: 0 };
}

struct ControllerState {
    state: PlaybackState,
    generation: u64,
    position: usize,
    total: usize,
    completed: usize,
    unvoiced: usize,
    phase: StepPhase,
    order: Option<Arc<StringingOrder>>,
}

struct Shared {
    state: Mutex<ControllerState>,
    pattern: RwLock<Option<Pattern>>,
    mappings: RwLock<ColorMappingStore>,
    events: RwLock<PatternEvents>,
    settings: RwLock<TtsSettings>,
    voice: Arc<dyn VoiceOutput>,
    sounds: Arc<dyn SoundPlayer>,
    storage: BeadforgeStorage,
    status_tx: broadcast::Sender<PlaybackStatus>,
    cancel_tx: watch::Sender<u64>,
}

// Lock order: state, pattern, mappings, events, settings.
impl Shared {
    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pattern(&self) -> RwLockReadGuard<'_, Option<Pattern>> {
        self.pattern.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn pattern_mut(&self) -> RwLockWriteGuard<'_, Option<Pattern>> {
        self.pattern.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn mappings(&self) -> RwLockReadGuard<'_, ColorMappingStore> {
        self.mappings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn mappings_mut(&self) -> RwLockWriteGuard<'_, ColorMappingStore> {
        self.mappings.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn events(&self) -> RwLockReadGuard<'_, PatternEvents> {
        self.events.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn events_mut(&self) -> RwLockWriteGuard<'_, PatternEvents> {
        self.events.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings(&self) -> RwLockReadGuard<'_, TtsSettings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, status: PlaybackStatus) {
        // No subscribers is fine.
        let _ = self.status_tx.send(status);
    }

    fn cancel(&self, generation: u64) {
        self.cancel_tx.send_replace(generation);
    }

    fn pattern_id(&self) -> PlaybackResult<PatternId> {
        self.pattern()
            .as_ref()
            .map(|p| p.meta.id)
            .ok_or(PlaybackError::NotInitialized)
    }

    fn content_hash(&self) -> Option<String> {
        self.pattern().as_ref().map(Pattern::content_hash)
    }
}

/// Forwards event side effects to the status channel.
struct StepSink<'a> {
    shared: &'a Shared,
    checkpoint: bool,
    /// Index of the first event that has not finished.
    reached: usize,
}

impl EventSink for StepSink<'_> {
    fn on_pause(&mut self, position: usize) {
        self.shared.emit(PlaybackStatus::EventPaused { position });
    }

    fn on_text(&mut self, position: usize, message: &str, duration: u64) {
        self.shared.emit(PlaybackStatus::Text {
            position,
            message: message.to_string(),
            duration,
        });
    }

    fn on_checkpoint(&mut self, _position: usize) {
        self.checkpoint = true;
    }

    fn on_event_done(&mut self, index: usize) {
        self.reached = index + 1;
    }

    fn on_sound_error(&mut self, position: usize, error: &PlaybackError) {
        tracing::warn!("Sound cue at position {position} failed: {error}");
        self.shared.emit(PlaybackStatus::Error {
            position,
            message: error.to_string(),
        });
    }
}

/// What the voice step will say.
struct VoicePlan {
    resolution: Resolution,
    group_len: usize,
    cells: Vec<(usize, usize)>,
    settings: TtsSettings,
}

enum Flow {
    Next,
    Halt,
}

/// Plays one pattern at a time. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl PlaybackController {
    /// Create a controller. Settings are loaded from `storage`.
    #[must_use]
    pub fn new(
        voice: Arc<dyn VoiceOutput>,
        sounds: Arc<dyn SoundPlayer>,
        storage: BeadforgeStorage,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let (cancel_tx, _) = watch::channel(0);
        let settings = storage.load_settings();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState {
                    state: PlaybackState::Idle,
                    generation: 0,
                    position: 0,
                    total: 0,
                    completed: 0,
                    unvoiced: 0,
                    phase: StepPhase::START,
                    order: None,
                }),
                pattern: RwLock::new(None),
                mappings: RwLock::new(ColorMappingStore::default()),
                events: RwLock::new(PatternEvents::new()),
                settings: RwLock::new(settings),
                voice,
                sounds,
                storage,
                status_tx,
                cancel_tx,
            }),
        }
    }

    /// Controller with silent backends and in-memory storage.
    #[must_use]
    pub fn headless() -> Self {
        Self::new(
            Arc::new(SilentOutput),
            Arc::new(SilentOutput),
            BeadforgeStorage::in_memory(),
        )
    }

    /// Subscribe to status updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Current state, position and counters.
    #[must_use]
    pub fn snapshot(&self) -> PlaybackSnapshot {
        let st = self.shared.state();
        PlaybackSnapshot {
            state: st.state,
            position: st.position,
            total: st.total,
            completed: st.completed,
            unvoiced: st.unvoiced,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.shared.state().state
    }

    /// Current 1-based position, 0 before the first bead.
    #[must_use]
    pub fn position(&self) -> usize {
        self.shared.state().position
    }

    /// Copy of the loaded pattern.
    #[must_use]
    pub fn pattern(&self) -> Option<Pattern> {
        self.shared.pattern().clone()
    }

    /// Load a pattern with its saved events and mapping overrides.
    ///
    /// Stops any playback and resets to `Idle` at position 0.
    pub fn initialize(&self, pattern: Pattern) {
        let storage = &self.shared.storage;
        if let Err(e) = storage.expire_progress(current_timestamp_ms()) {
            tracing::warn!("Failed to expire old progress records: {e}");
        }
        let events = storage.load_events(&pattern.meta.id).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable events for {}: {e}", pattern.meta.id);
            PatternEvents::new()
        });
        let overrides = storage
            .load_mapping_overrides(&pattern.meta.id)
            .unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable mappings for {}: {e}", pattern.meta.id);
                Vec::new()
            });
        let mut mappings = ColorMappingStore::from_palette(pattern.colors());
        mappings.apply_overrides(&overrides);
        if !mappings.all_voiced() {
            tracing::debug!("{} palette colors have no voice", mappings.unmapped_count());
        }

        let order = Arc::new(StringingOrder::for_pattern(&pattern));
        let total = order.total();
        tracing::info!("Loaded pattern {} with {total} positions", pattern.meta.id);

        let mut st = self.shared.state();
        *self.shared.pattern_mut() = Some(pattern);
        *self.shared.mappings_mut() = mappings;
        *self.shared.events_mut() = events;
        st.total = total;
        st.order = Some(order);
        st.unvoiced = 0;
        self.halt(st, None);
    }

    /// Start or resume playback at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::NotInitialized`] without a pattern and
    /// [`PlaybackError::NoRuntime`] outside a tokio runtime.
    pub fn play(&self) -> PlaybackResult<()> {
        let runtime = Handle::try_current().map_err(|_| PlaybackError::NoRuntime)?;
        let generation = {
            let mut st = self.shared.state();
            if st.order.is_none() {
                return Err(PlaybackError::NotInitialized);
            }
            if st.state == PlaybackState::Playing {
                return Ok(());
            }
            if st.position == 0 {
                st.position = 1;
                st.completed = 0;
                st.unvoiced = 0;
                st.phase = StepPhase::START;
            }
            st.state = PlaybackState::Playing;
            st.generation += 1;
            tracing::info!("Playback started at position {}", st.position);
            st.generation
        };
        self.shared.cancel(generation);
        self.shared
            .emit(PlaybackStatus::StateChanged(PlaybackState::Playing));
        self.spawn_loop(&runtime, generation);
        Ok(())
    }

    /// Suspend playback, dropping any in-flight announcement or cue.
    ///
    /// `play` resumes at the same position.
    pub fn pause(&self) {
        let generation = {
            let mut st = self.shared.state();
            if st.state != PlaybackState::Playing {
                return;
            }
            st.state = PlaybackState::Paused;
            st.generation += 1;
            tracing::debug!("Paused at position {}", st.position);
            st.generation
        };
        self.shared.cancel(generation);
        self.shared
            .emit(PlaybackStatus::StateChanged(PlaybackState::Paused));
    }

    /// Stop playback and return to position 0.
    pub fn stop(&self) {
        let st = self.shared.state();
        if st.order.is_some() {
            self.halt(st, None);
        }
    }

    /// Step one bead forward.
    ///
    /// # Errors
    ///
    /// See [`Self::go_to_position`].
    pub fn next(&self) -> PlaybackResult<()> {
        self.seek(|position| position + 1)
    }

    /// Step one bead back.
    ///
    /// # Errors
    ///
    /// See [`Self::go_to_position`].
    pub fn previous(&self) -> PlaybackResult<()> {
        self.seek(|position| position.saturating_sub(1))
    }

    /// Move to `position`, clamped to `[1, total]`.
    ///
    /// While playing, playback continues from there. Otherwise the bead is
    /// voiced once, without its events.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::NotInitialized`] without a pattern and
    /// [`PlaybackError::NoRuntime`] when playing outside a tokio runtime.
    pub fn go_to_position(&self, position: usize) -> PlaybackResult<()> {
        self.seek(|_| position)
    }

    /// Seek to the saved resume point if it belongs to the loaded pattern.
    ///
    /// The global checkpoint wins over per-pattern progress. Returns the
    /// position sought to, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is loaded or the records are unreadable.
    pub fn resume_from_checkpoint(&self) -> PlaybackResult<Option<usize>> {
        let hash = self
            .shared
            .content_hash()
            .ok_or(PlaybackError::NotInitialized)?;
        let storage = &self.shared.storage;
        let target = match storage.load_checkpoint()? {
            Some(checkpoint) if checkpoint.content_hash == hash => Some(checkpoint.position),
            _ => storage.load_progress(&hash)?.map(|p| p.position),
        };
        if let Some(position) = target {
            tracing::info!("Resuming at position {position}");
            self.go_to_position(position)?;
        }
        Ok(target)
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Edit the loaded pattern.
    ///
    /// Color edits are picked up by the next step. An edit that changes the
    /// shape or dimensions rebuilds the order and stops playback.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::NotInitialized`] if no pattern is loaded.
    pub fn edit_pattern<R>(&self, edit: impl FnOnce(&mut Pattern) -> R) -> PlaybackResult<R> {
        let mut st = self.shared.state();
        let mut guard = self.shared.pattern_mut();
        let pattern = guard.as_mut().ok_or(PlaybackError::NotInitialized)?;
        let out = edit(pattern);
        pattern.touch();
        self.shared.mappings_mut().sync_palette(pattern.colors());

        let unchanged = st.order.as_ref().is_some_and(|o| o.matches(pattern));
        if !unchanged {
            let order = Arc::new(StringingOrder::for_pattern(pattern));
            tracing::info!("Pattern structure changed; {} positions", order.total());
            st.total = order.total();
            st.order = Some(order);
            drop(guard);
            let error =
                (st.state == PlaybackState::Playing).then_some(PlaybackError::StructureChanged);
            self.halt(st, error);
        }
        Ok(out)
    }

    /// Current color mappings.
    #[must_use]
    pub fn mappings(&self) -> ColorMappingStore {
        self.shared.mappings().clone()
    }

    /// Override the voice of a palette color and save the overrides.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown palette index or a storage failure.
    pub fn update_mapping(
        &self,
        index: u8,
        voiced_color: usize,
        modifiers: Modifiers,
    ) -> PlaybackResult<()> {
        let id = self.shared.pattern_id()?;
        let mut mappings = self.shared.mappings_mut();
        mappings.update_mapping(index, voiced_color, modifiers)?;
        self.shared
            .storage
            .save_mapping_overrides(&id, mappings.mappings())?;
        Ok(())
    }

    /// Return a palette color to its automatic voice.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown palette index or a storage failure.
    pub fn reset_mapping(&self, index: u8) -> PlaybackResult<()> {
        let id = self.shared.pattern_id()?;
        let mut mappings = self.shared.mappings_mut();
        mappings.reset_mapping(index)?;
        self.shared
            .storage
            .save_mapping_overrides(&id, mappings.mappings())?;
        Ok(())
    }

    /// Current event map.
    #[must_use]
    pub fn events(&self) -> PatternEvents {
        self.shared.events().clone()
    }

    /// Attach an event to a position.
    ///
    /// # Errors
    ///
    /// Returns an error for position 0 or a storage failure.
    pub fn add_event(&self, position: usize, event: CellEvent) -> PlaybackResult<()> {
        self.with_events(|events| Ok(events.add(position, event)?))
    }

    /// Remove the `index`-th event at a position.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn remove_event(&self, position: usize, index: usize) -> PlaybackResult<Option<CellEvent>> {
        self.with_events(|events| Ok(events.remove(position, index)))
    }

    /// Replace the `index`-th event at a position.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn update_event(
        &self,
        position: usize,
        index: usize,
        event: CellEvent,
    ) -> PlaybackResult<Option<CellEvent>> {
        self.with_events(|events| Ok(events.update(position, index, event)))
    }

    /// Remove every event at a position.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn clear_events_at(&self, position: usize) -> PlaybackResult<Vec<CellEvent>> {
        self.with_events(|events| Ok(events.clear_position(position)))
    }

    /// Remove every event of the pattern.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn clear_all_events(&self) -> PlaybackResult<()> {
        self.with_events(|events| {
            events.clear_all();
            Ok(())
        })
    }

    fn with_events<R>(
        &self,
        change: impl FnOnce(&mut PatternEvents) -> PlaybackResult<R>,
    ) -> PlaybackResult<R> {
        let id = self.shared.pattern_id()?;
        let mut events = self.shared.events_mut();
        let out = change(&mut events)?;
        self.shared.storage.save_events(&id, &events)?;
        Ok(out)
    }

    /// Current playback settings.
    #[must_use]
    pub fn settings(&self) -> TtsSettings {
        self.shared.settings().clone()
    }

    /// Replace and save the playback settings. Takes effect at the next step.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be saved.
    pub fn set_settings(&self, settings: TtsSettings) -> PlaybackResult<()> {
        self.shared.storage.save_settings(&settings)?;
        *self
            .shared
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Go to `Idle` at position 0, optionally reporting why.
    fn halt(&self, mut st: MutexGuard<'_, ControllerState>, error: Option<PlaybackError>) {
        let position = st.position;
        st.state = PlaybackState::Idle;
        st.position = 0;
        st.completed = 0;
        st.phase = StepPhase::START;
        st.generation += 1;
        let (generation, total) = (st.generation, st.total);
        drop(st);

        self.shared.cancel(generation);
        if let Some(error) = error {
            tracing::warn!("Playback stopped at position {position}: {error}");
            self.shared.emit(PlaybackStatus::Error {
                position,
                message: error.to_string(),
            });
        }
        self.shared
            .emit(PlaybackStatus::StateChanged(PlaybackState::Idle));
        self.shared.emit(PlaybackStatus::Position {
            position: 0,
            total,
            cells: Vec::new(),
        });
    }

    /// Go to `Paused` without moving.
    fn park(&self, mut st: MutexGuard<'_, ControllerState>) {
        st.state = PlaybackState::Paused;
        st.generation += 1;
        let generation = st.generation;
        drop(st);
        self.shared.cancel(generation);
        self.shared
            .emit(PlaybackStatus::StateChanged(PlaybackState::Paused));
    }

    fn finish(&self, mut st: MutexGuard<'_, ControllerState>) -> Flow {
        let unvoiced = st.unvoiced;
        let total = st.total;
        st.state = PlaybackState::Idle;
        st.position = 0;
        st.completed = total;
        st.phase = StepPhase::START;
        st.generation += 1;
        let generation = st.generation;
        drop(st);

        self.shared.cancel(generation);
        if let Some(hash) = self.shared.content_hash() {
            if let Err(e) = self.shared.storage.clear_progress(&hash) {
                tracing::warn!("Failed to clear progress: {e}");
            }
        }
        tracing::info!("Playback complete: {total} positions, {unvoiced} unvoiced");
        self.shared.emit(PlaybackStatus::Completed { unvoiced });
        self.shared
            .emit(PlaybackStatus::StateChanged(PlaybackState::Idle));
        self.shared.emit(PlaybackStatus::Position {
            position: 0,
            total,
            cells: Vec::new(),
        });
        Flow::Halt
    }

    fn seek(&self, target: impl FnOnce(usize) -> usize) -> PlaybackResult<()> {
        let (state, position, total, generation, order) = {
            let mut st = self.shared.state();
            let order = st.order.clone().ok_or(PlaybackError::NotInitialized)?;
            if st.total == 0 {
                return Ok(());
            }
            let position = target(st.position).clamp(1, st.total);
            st.position = position;
            st.completed = position - 1;
            st.phase = StepPhase::START;
            st.generation += 1;
            (st.state, position, st.total, st.generation, order)
        };
        self.shared.cancel(generation);
        tracing::debug!("Seek to position {position}");
        self.shared.emit(PlaybackStatus::Position {
            position,
            total,
            cells: order.cells_in_position_range(position, 1),
        });

        if state == PlaybackState::Playing {
            let runtime = Handle::try_current().map_err(|_| PlaybackError::NoRuntime)?;
            self.spawn_loop(&runtime, generation);
        } else {
            self.spawn_preview(generation, position, &order);
        }
        Ok(())
    }

    /// Voice a single bead after a manual seek.
    fn spawn_preview(&self, generation: u64, position: usize, order: &StringingOrder) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!("No runtime; position {position} not voiced");
            return;
        };
        let resolution = {
            let pattern = self.shared.pattern();
            let mappings = self.shared.mappings();
            pattern
                .as_ref()
                .and_then(|p| resolve_position(p, order, &mappings, position))
        };
        let Some(Resolution::Voiced(token)) = resolution else {
            return;
        };
        let settings = self.settings();
        let announcement = Announcement::new(token, 1, position, &settings);
        let controller = self.clone();
        runtime.spawn(async move {
            let spoken = controller
                .guarded(generation, controller.shared.voice.speak(&announcement))
                .await;
            match spoken {
                Some(Ok(())) => controller.shared.emit(PlaybackStatus::Announced {
                    position,
                    count: 1,
                    phrase: announcement.phrase,
                }),
                Some(Err(e)) => controller.shared.emit(PlaybackStatus::Error {
                    position,
                    message: e.to_string(),
                }),
                None => {}
            }
        });
    }

    // -----------------------------------------------------------------------
    // Step loop
    // -----------------------------------------------------------------------

    fn spawn_loop(&self, runtime: &Handle, generation: u64) {
        let controller = self.clone();
        runtime.spawn(async move {
            tracing::debug!("Playback loop {generation} started");
            while let Flow::Next = controller.step(generation).await {}
            tracing::debug!("Playback loop {generation} ended");
        });
    }

    async fn step(&self, generation: u64) -> Flow {
        let Some((position, phase, order)) = self.current_step(generation) else {
            return Flow::Halt;
        };
        match phase {
            StepPhase::Before { next_event } => {
                self.run_before(generation, position, next_event).await
            }
            StepPhase::Voice => self.run_voice(generation, position, &order).await,
            StepPhase::After {
                next_event,
                group_len,
            } => {
                self.run_after(generation, position, next_event, group_len)
                    .await
            }
        }
    }

    fn current_step(&self, generation: u64) -> Option<(usize, StepPhase, Arc<StringingOrder>)> {
        let st = self.shared.state();
        if st.generation != generation || st.state != PlaybackState::Playing {
            return None;
        }
        let order = st.order.clone()?;
        let unchanged = self
            .shared
            .pattern()
            .as_ref()
            .is_some_and(|p| order.matches(p));
        if !unchanged {
            self.halt(st, Some(PlaybackError::StructureChanged));
            return None;
        }
        if st.position > st.total {
            self.finish(st);
            return None;
        }
        Some((st.position, st.phase, order))
    }

    /// Lock the state if `generation` is still current.
    fn commit(&self, generation: u64) -> Option<MutexGuard<'_, ControllerState>> {
        let st = self.shared.state();
        if st.generation == generation {
            Some(st)
        } else {
            tracing::trace!("Discarding stale completion for generation {generation}");
            None
        }
    }

    async fn run_before(&self, generation: u64, position: usize, next_event: usize) -> Flow {
        let events: Vec<CellEvent> = self
            .shared
            .events()
            .with_timing(position, EventTiming::Before)
            .cloned()
            .collect();
        let mut sink = StepSink {
            shared: self.shared.as_ref(),
            checkpoint: false,
            reached: next_event,
        };
        let run = self
            .guarded(
                generation,
                run_events(&events, next_event, position, self.shared.sounds.as_ref(), &mut sink),
            )
            .await;
        let Some(run) = run else {
            let kept = self.keep_event_progress(
                generation,
                position,
                StepPhase::Before { next_event },
                StepPhase::Before {
                    next_event: sink.reached,
                },
            );
            if kept && sink.checkpoint {
                self.write_checkpoint(position);
            }
            return Flow::Halt;
        };
        if sink.checkpoint {
            self.write_checkpoint(position);
        }

        let Some(mut st) = self.commit(generation) else {
            return Flow::Halt;
        };
        match run {
            EventRun::Continue => {
                st.phase = StepPhase::Voice;
                Flow::Next
            }
            EventRun::Paused { resume_at } => {
                st.phase = StepPhase::Before {
                    next_event: resume_at,
                };
                tracing::info!("Paused by event at position {position}");
                self.park(st);
                Flow::Halt
            }
        }
    }

    fn plan_voice(&self, position: usize, order: &StringingOrder) -> Option<VoicePlan> {
        let pattern = self.shared.pattern();
        let pattern = pattern.as_ref()?;
        let mappings = self.shared.mappings();
        let events = self.shared.events();
        let settings = self.shared.settings().clone();
        let resolution = resolve_position(pattern, order, &mappings, position)?;
        let group_len = group_length(
            pattern,
            order,
            &mappings,
            &events,
            position,
            settings.group_limit(),
        )
        .max(1);
        Some(VoicePlan {
            resolution,
            group_len,
            cells: order.cells_in_position_range(position, group_len),
            settings,
        })
    }

    async fn run_voice(&self, generation: u64, position: usize, order: &StringingOrder) -> Flow {
        let Some(plan) = self.plan_voice(position, order) else {
            return Flow::Halt;
        };
        self.shared.emit(PlaybackStatus::Position {
            position,
            total: order.total(),
            cells: plan.cells,
        });
        let after = StepPhase::After {
            next_event: 0,
            group_len: plan.group_len,
        };

        match plan.resolution {
            Resolution::Voiced(token) => {
                let announcement = Announcement::new(token, plan.group_len, position, &plan.settings);
                let spoken = self
                    .guarded(generation, self.shared.voice.speak(&announcement))
                    .await;
                let Some(spoken) = spoken else {
                    return Flow::Halt;
                };
                let Some(mut st) = self.commit(generation) else {
                    return Flow::Halt;
                };
                match spoken {
                    Ok(()) => {
                        self.shared.emit(PlaybackStatus::Announced {
                            position,
                            count: announcement.count,
                            phrase: announcement.phrase,
                        });
                        st.phase = after;
                        Flow::Next
                    }
                    Err(e) => {
                        tracing::warn!("Voice failed at position {position}: {e}");
                        self.shared.emit(PlaybackStatus::Error {
                            position,
                            message: e.to_string(),
                        });
                        self.park(st);
                        Flow::Halt
                    }
                }
            }
            Resolution::Skip => {
                let Some(mut st) = self.commit(generation) else {
                    return Flow::Halt;
                };
                st.phase = after;
                Flow::Next
            }
            Resolution::Unvoiced => {
                let Some(mut st) = self.commit(generation) else {
                    return Flow::Halt;
                };
                st.unvoiced += plan.group_len;
                st.phase = after;
                self.shared.emit(PlaybackStatus::Unvoiced {
                    position,
                    count: plan.group_len,
                });
                Flow::Next
            }
        }
    }

    async fn run_after(
        &self,
        generation: u64,
        position: usize,
        next_event: usize,
        group_len: usize,
    ) -> Flow {
        let last = position + group_len - 1;
        let events: Vec<CellEvent> = self
            .shared
            .events()
            .with_timing(last, EventTiming::After)
            .cloned()
            .collect();
        let mut sink = StepSink {
            shared: self.shared.as_ref(),
            checkpoint: false,
            reached: next_event,
        };
        let run = self
            .guarded(
                generation,
                run_events(&events, next_event, last, self.shared.sounds.as_ref(), &mut sink),
            )
            .await;
        let Some(run) = run else {
            let kept = self.keep_event_progress(
                generation,
                position,
                StepPhase::After {
                    next_event,
                    group_len,
                },
                StepPhase::After {
                    next_event: sink.reached,
                    group_len,
                },
            );
            if kept && sink.checkpoint {
                self.write_checkpoint(last + 1);
            }
            return Flow::Halt;
        };
        if sink.checkpoint {
            self.write_checkpoint(last + 1);
        }

        let Some(mut st) = self.commit(generation) else {
            return Flow::Halt;
        };
        match run {
            EventRun::Continue => self.advance(st, position + group_len),
            EventRun::Paused { resume_at } => {
                st.phase = StepPhase::After {
                    next_event: resume_at,
                    group_len,
                };
                tracing::info!("Paused by event after position {last}");
                self.park(st);
                Flow::Halt
            }
        }
    }

    /// Move a paused step past the events that finished before `pause()`
    /// cut the run short.
    ///
    /// Only applies when the pause was the very next state change, so a stop,
    /// seek or resume in between keeps its own phase.
    fn keep_event_progress(
        &self,
        generation: u64,
        position: usize,
        started: StepPhase,
        reached: StepPhase,
    ) -> bool {
        let mut st = self.shared.state();
        let paused_here = st.state == PlaybackState::Paused
            && st.generation == generation + 1
            && st.position == position
            && st.phase == started;
        if paused_here && reached != started {
            tracing::debug!("Keeping event progress at position {position}: {reached:?}");
            st.phase = reached;
        }
        paused_here
    }

    fn advance(&self, mut st: MutexGuard<'_, ControllerState>, next: usize) -> Flow {
        st.position = next;
        st.completed = next - 1;
        st.phase = StepPhase::START;
        if st.position > st.total {
            return self.finish(st);
        }
        let record = ProgressRecord {
            position: st.position,
            completed: st.completed,
            total: st.total,
            last_updated: current_timestamp_ms(),
        };
        drop(st);

        if let Some(hash) = self.shared.content_hash() {
            if let Err(e) = self.shared.storage.save_progress(&hash, &record) {
                tracing::warn!("Failed to save progress: {e}");
            }
        }
        Flow::Next
    }

    fn write_checkpoint(&self, position: usize) {
        let checkpoint = match self.shared.pattern().as_ref() {
            Some(pattern) => Checkpoint::new(pattern, position),
            None => return,
        };
        match self.shared.storage.save_checkpoint(&checkpoint) {
            Ok(()) => {
                tracing::info!("Checkpoint saved at position {position}");
                self.shared.emit(PlaybackStatus::Checkpoint { position });
            }
            Err(e) => {
                tracing::warn!("Failed to save checkpoint: {e}");
                self.shared.emit(PlaybackStatus::Error {
                    position,
                    message: e.to_string(),
                });
            }
        }
    }

    /// Run `operation` unless `generation` is superseded first.
    async fn guarded<F: Future>(&self, generation: u64, operation: F) -> Option<F::Output> {
        let mut cancel = self.shared.cancel_tx.subscribe();
        tokio::select! {
            out = operation => Some(out),
            () = superseded(&mut cancel, generation) => {
                tracing::trace!("Dropped in-flight request of generation {generation}");
                None
            }
        }
    }
}

/// Resolves once the published generation differs from `generation`.
async fn superseded(cancel: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        let current = *cancel.borrow_and_update();
        if current != generation {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
