//! # BeadForge Playback
//!
//! Reads a bead pattern aloud in stringing order so a crafter can thread
//! without looking at the chart.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               PlaybackController             │
//! │  Idle ⇄ Playing ⇄ Paused   (generation-gated)│
//! ├──────────────┬───────────────┬───────────────┤
//! │   Grouping   │   Executor    │    Status     │
//! │  run-length  │ before/after  │   broadcast   │
//! │  tokens      │ cell events   │   channel     │
//! ├──────────────┴───────────────┴───────────────┤
//! │   VoiceOutput / SoundPlayer (async traits)   │
//! ├──────────────────────────────────────────────┤
//! │   beadforge-core: order, mapping, storage    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Voice and sound backends are supplied by the host. [`SilentOutput`]
//! completes immediately and suits headless use.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod controller;
pub mod error;
pub mod executor;
pub mod grouping;
pub mod output;
pub mod state;

pub use controller::PlaybackController;
pub use error::{PlaybackError, PlaybackResult};
pub use executor::{execute_events_at_position, run_events, EventRun, EventSink};
pub use grouping::{group_length, resolve_position};
pub use output::{Announcement, SilentOutput, SoundPlayer, VoiceOutput};
pub use state::{PlaybackSnapshot, PlaybackState, PlaybackStatus};

/// BeadForge playback version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
