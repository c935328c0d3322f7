//! # BeadForge Core
//!
//! Pattern geometry and stringing-order engine for bead crochet ropes and
//! bead balls.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               beadforge-core                │
//! ├─────────────────────────────────────────────┤
//! │  Pattern         │  Geometry                │
//! │  - GridStore     │  - Wedge predicate       │
//! │  - Palette       │  - Ball size table       │
//! │  - Drawing ops   │  - Stringing order       │
//! ├─────────────────────────────────────────────┤
//! │  Voice           │  Interchange             │
//! │  - Vocabulary    │  - Pattern DTO (JSON)    │
//! │  - Color mapping │  - JBB (S-expression)    │
//! ├─────────────────────────────────────────────┤
//! │  Events          │  Persistence             │
//! │  - Cell events   │  - Key-value contract    │
//! │                  │  - Checkpoint / progress │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Playback lives in `beadforge-playback`, which drives this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod color;
pub mod config;
pub mod drawing;
pub mod dto;
pub mod error;
pub mod events;
pub mod geometry;
pub mod grid;
pub mod jbb;
pub mod mapping;
pub mod order;
pub mod pattern;
pub mod persist;
pub mod storage;
pub mod vocabulary;

pub use color::{Color, EMPTY, SKIP};
pub use config::{CoreConfig, PlaybackMode, TtsSettings};
pub use dto::{dto_to_pattern, pattern_to_dto, PatternDto, PatternKind};
pub use error::{PatternError, PatternResult};
pub use events::{ActionType, CellEvent, EventTiming, PatternEvents};
pub use geometry::{BallGeometry, BallSize, BallSizeTable, WedgeBounds, WedgeCoord};
pub use grid::GridStore;
pub use jbb::{export_jbb, import_jbb, import_jbb_bytes};
pub use mapping::{
    active_modifier_keys, are_all_mappings_voiced, create_auto_mappings, ColorMapping,
    ColorMappingStore, Modifiers, Resolution, VoiceToken,
};
pub use order::{OrderCache, StringingOrder, StructureKey};
pub use pattern::{Pattern, PatternId, PatternMeta, Shape};
pub use persist::{FileStore, KeyValueStore, MemoryStore, StoreError, StoreResult, StoredRecord};
pub use storage::{BeadforgeStorage, Checkpoint, ProgressRecord};
pub use vocabulary::{Language, VoicedColor, VOICED_COLORS};

/// BeadForge core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
