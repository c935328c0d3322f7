//! Rope and ball patterns.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::color::{is_reserved, Color, EMPTY, MAX_PALETTE_LEN, SKIP};
use crate::geometry::{BallGeometry, BallSize};
use crate::{GridStore, PatternError, PatternResult};

/// Allowed rope widths.
pub const ROPE_WIDTH_RANGE: std::ops::RangeInclusive<usize> = 3..=50;

/// Allowed rope heights.
pub const ROPE_HEIGHT_RANGE: std::ops::RangeInclusive<usize> = 1..=1000;

/// Field bytes fed into [`Pattern::content_hash`].
const HASH_SAMPLE_LEN: usize = 512;

/// Unique identifier for a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(Uuid);

impl PatternId {
    /// Create a new unique pattern ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptive fields shared by both pattern kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMeta {
    /// Identifier; not stable across reconstruction.
    pub id: PatternId,
    /// Display name.
    pub name: String,
    /// Author credit.
    pub author: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last edit time.
    pub updated_at: DateTime<Utc>,
    /// Listed in the public gallery.
    pub is_public: bool,
    /// Asking price, if sold.
    pub price: Option<f64>,
    /// Preview image location.
    pub preview_url: Option<String>,
}

impl PatternMeta {
    /// Fresh metadata stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PatternId::new(),
            name: name.into(),
            author: None,
            notes: None,
            created_at: now,
            updated_at: now,
            is_public: false,
            price: None,
            preview_url: None,
        }
    }
}

/// Which of the two geometries a pattern uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    /// Flat rectangular grid; every cell is a bead.
    Rope,
    /// Six wedges per hemisphere folded into a sphere.
    Ball {
        /// Finished diameter in centimetres.
        diameter: u8,
        /// Wedge layout.
        geometry: BallGeometry,
    },
}

/// A bead pattern: geometry, cell buffer and palette.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    /// Descriptive fields.
    pub meta: PatternMeta,
    shape: Shape,
    grid: GridStore,
    colors: Vec<Color>,
}

impl Pattern {
    /// Create a rope pattern filled with color 0 and a one-color white palette.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidDimensions`] outside 3..=50 x 1..=1000.
    pub fn rope(name: impl Into<String>, width: usize, height: usize) -> PatternResult<Self> {
        validate_rope_dimensions(width, height)?;
        Ok(Self {
            meta: PatternMeta::new(name),
            shape: Shape::Rope,
            grid: GridStore::new(width, height),
            colors: vec![Color::default()],
        })
    }

    /// Create a ball pattern for one row of the size table.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidDimensions`] if the row is inconsistent.
    pub fn ball(name: impl Into<String>, size: &BallSize) -> PatternResult<Self> {
        Ok(Self::ball_with_geometry(name, size.diameter, size.geometry()?))
    }

    /// Create a ball pattern from an explicit geometry.
    #[must_use]
    pub fn ball_with_geometry(name: impl Into<String>, diameter: u8, geometry: BallGeometry) -> Self {
        Self {
            meta: PatternMeta::new(name),
            shape: Shape::Ball { diameter, geometry },
            grid: GridStore::new(geometry.width(), geometry.height()),
            colors: vec![Color::default()],
        }
    }

    /// Assemble a pattern from parts, validating the invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidDimensions`] when the grid does not match
    /// the shape, or [`PatternError::InvalidColorIndex`] for a cell outside the palette.
    pub fn from_parts(
        meta: PatternMeta,
        shape: Shape,
        grid: GridStore,
        colors: Vec<Color>,
    ) -> PatternResult<Self> {
        match shape {
            Shape::Rope => validate_rope_dimensions(grid.width(), grid.height())?,
            Shape::Ball { geometry, .. } => {
                if grid.width() != geometry.width() || grid.height() != geometry.height() {
                    return Err(PatternError::dimensions(format!(
                        "ball grid must be {}x{}, got {}x{}",
                        geometry.width(),
                        geometry.height(),
                        grid.width(),
                        grid.height()
                    )));
                }
            }
        }
        let pattern = Self {
            meta,
            shape,
            grid,
            colors,
        };
        pattern.validate()?;
        Ok(pattern)
    }

    /// Geometry kind.
    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Ball geometry, `None` for ropes.
    #[must_use]
    pub const fn ball_geometry(&self) -> Option<&BallGeometry> {
        match &self.shape {
            Shape::Rope => None,
            Shape::Ball { geometry, .. } => Some(geometry),
        }
    }

    /// Whether this is a ball pattern.
    #[must_use]
    pub const fn is_ball(&self) -> bool {
        matches!(self.shape, Shape::Ball { .. })
    }

    /// Grid width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.grid.width()
    }

    /// Grid height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.grid.height()
    }

    /// Cell storage.
    #[must_use]
    pub const fn grid(&self) -> &GridStore {
        &self.grid
    }

    pub(crate) fn grid_mut(&mut self) -> &mut GridStore {
        &mut self.grid
    }

    /// Palette.
    #[must_use]
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// Whether a cell takes part in stringing, filling and counting.
    #[must_use]
    pub fn is_active(&self, x: usize, y: usize) -> bool {
        match &self.shape {
            Shape::Rope => self.grid.contains(x, y),
            Shape::Ball { geometry, .. } => geometry.is_active(x, y),
        }
    }

    /// Number of active cells, i.e. beads to string.
    #[must_use]
    pub fn active_count(&self) -> usize {
        match &self.shape {
            Shape::Rope => self.width() * self.height(),
            Shape::Ball { geometry, .. } => geometry.active_count(),
        }
    }

    /// Read a cell.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::OutOfBounds`] outside the grid.
    pub fn get(&self, x: usize, y: usize) -> PatternResult<u8> {
        self.grid.get(x, y)
    }

    /// Palette entry at a cell; `None` for reserved values.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::OutOfBounds`] outside the grid.
    pub fn color_at(&self, x: usize, y: usize) -> PatternResult<Option<&Color>> {
        let index = self.grid.get(x, y)?;
        Ok(self.colors.get(usize::from(index)))
    }

    /// Paint one bead.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::OutOfBounds`] outside the grid or
    /// [`PatternError::InvalidColorIndex`] for an index outside the palette.
    pub fn set_bead(&mut self, x: usize, y: usize, color_index: u8) -> PatternResult<()> {
        self.check_color_index(color_index)?;
        self.grid.set(x, y, color_index)?;
        self.touch();
        Ok(())
    }

    /// Fill every cell with one value.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidColorIndex`] for an index outside the palette.
    pub fn clear(&mut self, fill_index: u8) -> PatternResult<()> {
        self.check_color_index(fill_index)?;
        self.grid.clear(fill_index);
        self.touch();
        Ok(())
    }

    /// Resize a rope pattern, keeping the overlapping region.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidDimensions`] for ball patterns (their size
    /// follows the geometry) or dimensions outside the rope limits.
    pub fn resize(&mut self, new_width: usize, new_height: usize) -> PatternResult<()> {
        if self.is_ball() {
            return Err(PatternError::dimensions(
                "ball patterns are resized by choosing another ball size",
            ));
        }
        validate_rope_dimensions(new_width, new_height)?;
        self.grid.resize(new_width, new_height);
        self.touch();
        Ok(())
    }

    /// Append a palette color and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidColorIndex`] when the palette is full.
    pub fn add_color(&mut self, color: Color) -> PatternResult<u8> {
        let index = u8::try_from(self.colors.len())
            .ok()
            .filter(|&i| usize::from(i) < MAX_PALETTE_LEN)
            .ok_or(PatternError::InvalidColorIndex {
                index: SKIP,
                palette_len: self.colors.len(),
            })?;
        self.colors.push(color);
        self.touch();
        Ok(index)
    }

    /// Replace a palette entry in place.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidColorIndex`] for an unknown index.
    pub fn replace_color(&mut self, index: u8, color: Color) -> PatternResult<()> {
        let palette_len = self.colors.len();
        let slot = self
            .colors
            .get_mut(usize::from(index))
            .ok_or(PatternError::InvalidColorIndex { index, palette_len })?;
        *slot = color;
        self.touch();
        Ok(())
    }

    /// Remove a palette entry. Cells using it become `EMPTY`; higher indices shift down.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidColorIndex`] for an unknown index.
    pub fn remove_color(&mut self, index: u8) -> PatternResult<Color> {
        self.check_palette_index(index)?;
        let removed = self.colors.remove(usize::from(index));
        self.grid.map_values(|v| {
            if is_reserved(v) {
                v
            } else if v == index {
                EMPTY
            } else if v > index {
                v - 1
            } else {
                v
            }
        });
        self.touch();
        Ok(removed)
    }

    /// Verify every non-reserved cell references the palette.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidColorIndex`] for the first offending cell.
    pub fn validate(&self) -> PatternResult<()> {
        match self
            .grid
            .field()
            .iter()
            .find(|&&v| !is_reserved(v) && usize::from(v) >= self.colors.len())
        {
            Some(&index) => Err(PatternError::InvalidColorIndex {
                index,
                palette_len: self.colors.len(),
            }),
            None => Ok(()),
        }
    }

    /// Bead counts per cell value over active cells.
    #[must_use]
    pub fn count_by_color(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        let width = self.width();
        for (i, &value) in self.grid.field().iter().enumerate() {
            if width > 0 && self.is_active(i % width, i / width) {
                *counts.entry(value).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Active cells holding `EMPTY`.
    #[must_use]
    pub fn empty_cell_count(&self) -> usize {
        self.count_by_color().get(&EMPTY).copied().unwrap_or(0)
    }

    /// Identity of the pattern content, stable across reloads.
    ///
    /// Covers the shape, the dimensions and up to 512 field bytes taken at a
    /// fixed stride; the nominal [`PatternId`] is not part of it.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        match &self.shape {
            Shape::Rope => hasher.update(b"rope"),
            Shape::Ball { geometry, .. } => {
                hasher.update(b"ball");
                hasher.update((geometry.wedge_base() as u64).to_le_bytes());
                hasher.update((geometry.wedge_height() as u64).to_le_bytes());
            }
        }
        hasher.update((self.width() as u64).to_le_bytes());
        hasher.update((self.height() as u64).to_le_bytes());
        let field = self.grid.field();
        let stride = (field.len() / HASH_SAMPLE_LEN).max(1);
        let sample: Vec<u8> = field
            .iter()
            .step_by(stride)
            .take(HASH_SAMPLE_LEN)
            .copied()
            .collect();
        hasher.update(&sample);
        hasher
            .finalize()
            .iter()
            .take(16)
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Mark the pattern as edited now.
    pub fn touch(&mut self) {
        self.meta.updated_at = Utc::now();
    }

    fn check_palette_index(&self, index: u8) -> PatternResult<()> {
        if usize::from(index) < self.colors.len() {
            Ok(())
        } else {
            Err(PatternError::InvalidColorIndex {
                index,
                palette_len: self.colors.len(),
            })
        }
    }

    pub(crate) fn check_color_index(&self, index: u8) -> PatternResult<()> {
        if is_reserved(index) {
            Ok(())
        } else {
            self.check_palette_index(index)
        }
    }

    /// Replace the palette wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidColorIndex`] if a cell would fall outside
    /// the new palette; the pattern is left untouched in that case.
    pub fn set_colors(&mut self, colors: Vec<Color>) -> PatternResult<()> {
        let previous = std::mem::replace(&mut self.colors, colors);
        if let Err(e) = self.validate() {
            self.colors = previous;
            return Err(e);
        }
        self.touch();
        Ok(())
    }
}

fn validate_rope_dimensions(width: usize, height: usize) -> PatternResult<()> {
    if !ROPE_WIDTH_RANGE.contains(&width) || !ROPE_HEIGHT_RANGE.contains(&height) {
        return Err(PatternError::dimensions(format!(
            "rope must be 3..=50 wide and 1..=1000 high, got {width}x{height}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BallSizeTable;

    fn palette_pattern() -> Pattern {
        let mut p = Pattern::rope("test", 8, 4).expect("valid rope");
        p.add_color(Color::rgb(0, 0, 0)).expect("add");
        p.add_color(Color::rgb(255, 0, 0)).expect("add");
        p
    }

    #[test]
    fn test_rope_limits() {
        assert!(Pattern::rope("a", 2, 10).is_err());
        assert!(Pattern::rope("a", 51, 10).is_err());
        assert!(Pattern::rope("a", 3, 0).is_err());
        assert!(Pattern::rope("a", 3, 1001).is_err());
        assert!(Pattern::rope("a", 50, 1000).is_ok());
    }

    #[test]
    fn test_set_bead_validates_palette() {
        let mut p = palette_pattern();
        p.set_bead(1, 1, 2).expect("valid");
        assert_eq!(p.get(1, 1).expect("in bounds"), 2);
        assert!(matches!(
            p.set_bead(1, 1, 3),
            Err(PatternError::InvalidColorIndex { index: 3, .. })
        ));
        p.set_bead(0, 0, SKIP).expect("reserved is allowed");
        p.set_bead(0, 1, EMPTY).expect("reserved is allowed");
    }

    #[test]
    fn test_ball_from_size_table() {
        let table = BallSizeTable::default();
        let p = Pattern::ball("ball", table.get(4).expect("4 cm")).expect("valid");
        assert_eq!(p.width(), 86);
        assert_eq!(p.height(), 50);
        assert!(p.is_ball());
        assert!(!p.is_active(85, 24));
    }

    #[test]
    fn test_ball_resize_is_rejected() {
        let p = Pattern::ball("ball", &BallSizeTable::default().sizes()[0]);
        let mut p = p.expect("valid");
        assert!(matches!(
            p.resize(10, 10),
            Err(PatternError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_remove_color_shifts_indices() {
        let mut p = palette_pattern();
        p.set_bead(0, 0, 1).expect("set");
        p.set_bead(1, 0, 2).expect("set");
        p.set_bead(2, 0, SKIP).expect("set");

        let removed = p.remove_color(1).expect("remove");
        assert_eq!(removed, Color::rgb(0, 0, 0));
        assert_eq!(p.get(0, 0).expect("cell"), EMPTY);
        assert_eq!(p.get(1, 0).expect("cell"), 1);
        assert_eq!(p.get(2, 0).expect("cell"), SKIP);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_set_colors_rolls_back_on_invalid() {
        let mut p = palette_pattern();
        p.set_bead(0, 0, 2).expect("set");
        assert!(p.set_colors(vec![Color::rgb(1, 1, 1)]).is_err());
        assert_eq!(p.colors().len(), 3);
    }

    #[test]
    fn test_count_by_color_ignores_inactive() {
        let geometry = BallGeometry::new(86, 14, 25).expect("valid");
        let p = Pattern::ball_with_geometry("ball", 4, geometry);
        let counts = p.count_by_color();
        assert_eq!(counts.get(&0).copied(), Some(geometry.active_count()));
    }

    #[test]
    fn test_content_hash_ignores_id() {
        let a = palette_pattern();
        let mut b = a.clone();
        b.meta.id = PatternId::new();
        b.meta.name = "renamed".to_string();
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 32);
    }

    #[test]
    fn test_content_hash_tracks_content() {
        let a = palette_pattern();
        let mut b = a.clone();
        b.set_bead(0, 0, 1).expect("set");
        assert_ne!(a.content_hash(), b.content_hash());

        let c = Pattern::rope("other", 8, 5).expect("valid");
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn test_from_parts_rejects_mismatched_grid() {
        let geometry = BallGeometry::from_wedges(6, 4).expect("valid");
        let result = Pattern::from_parts(
            PatternMeta::new("x"),
            Shape::Ball {
                diameter: 2,
                geometry,
            },
            GridStore::new(10, 8),
            vec![Color::default()],
        );
        assert!(result.is_err());
    }
}
