//! # Wedge Geometry
//!
//! The ball development is a `circumference x 2*wedge_height` rectangle.
//! Rows `[0, wedge_height)` hold six bottom wedges, rows
//! `[wedge_height, 2*wedge_height)` hold six top wedges.
//!
//! ```text
//!  y = 2h-1  .  #  .  .  #  .       pole (narrowest row)
//!            .####.  .####.
//!  y = h     ######  ######  ...    equator, top hemisphere
//!  y = h-1   ######  ######  ...    equator, bottom hemisphere
//!            .####.  .####.
//!  y = 0     .  #  .  .  #  .       pole
//!            wedge 0 wedge 1        (wedge_base columns each)
//! ```
//!
//! Every other module asks this one whether a cell is active; nothing else
//! re-derives the taper.

use serde::{Deserialize, Serialize};

use crate::{PatternError, PatternResult};

/// Wedges per hemisphere.
pub const WEDGES_PER_HEMISPHERE: usize = 6;

/// Total wedges on a ball (bottom `0..6`, top `6..12`).
pub const WEDGE_COUNT: usize = 2 * WEDGES_PER_HEMISPHERE;

/// Wedge-local coordinate of an active or inactive cell inside a wedge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WedgeCoord {
    /// Wedge index in `[0, 12)`; `>= 6` is the top hemisphere.
    pub wedge: usize,
    /// Column inside the wedge, `[0, wedge_base)`.
    pub local_x: usize,
    /// Distance from the equator, 0 = equator row.
    pub local_y: usize,
}

/// Rectangle a wedge occupies in the storage grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WedgeBounds {
    /// First column.
    pub start_x: usize,
    /// First row.
    pub start_y: usize,
    /// Columns (always `wedge_base`).
    pub width: usize,
    /// Rows (always `wedge_height`).
    pub height: usize,
}

/// Shape of a ball development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawGeometry")]
pub struct BallGeometry {
    circumference: usize,
    wedge_base: usize,
    wedge_height: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGeometry {
    circumference: usize,
    wedge_base: usize,
    wedge_height: usize,
}

impl TryFrom<RawGeometry> for BallGeometry {
    type Error = PatternError;

    fn try_from(raw: RawGeometry) -> PatternResult<Self> {
        Self::new(raw.circumference, raw.wedge_base, raw.wedge_height)
    }
}

impl BallGeometry {
    /// Validate and build a geometry.
    ///
    /// `circumference` may carry up to five seam columns past the six wedges.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidDimensions`] when the wedge base or height
    /// is zero or `circumference / 6 != wedge_base`.
    pub fn new(circumference: usize, wedge_base: usize, wedge_height: usize) -> PatternResult<Self> {
        if wedge_base == 0 || wedge_height == 0 {
            return Err(PatternError::dimensions(
                "wedge base and wedge height must be positive",
            ));
        }
        if circumference / WEDGES_PER_HEMISPHERE != wedge_base {
            return Err(PatternError::dimensions(format!(
                "circumference {circumference} does not hold six wedges of {wedge_base} columns"
            )));
        }
        Ok(Self {
            circumference,
            wedge_base,
            wedge_height,
        })
    }

    /// Geometry with no seam: `circumference = 6 * wedge_base`.
    ///
    /// # Errors
    ///
    /// Same as [`BallGeometry::new`].
    pub fn from_wedges(wedge_base: usize, wedge_height: usize) -> PatternResult<Self> {
        Self::new(wedge_base * WEDGES_PER_HEMISPHERE, wedge_base, wedge_height)
    }

    /// Number of columns around the ball.
    #[must_use]
    pub const fn circumference(&self) -> usize {
        self.circumference
    }

    /// Columns per wedge at the equator.
    #[must_use]
    pub const fn wedge_base(&self) -> usize {
        self.wedge_base
    }

    /// Rows per wedge, equator to pole.
    #[must_use]
    pub const fn wedge_height(&self) -> usize {
        self.wedge_height
    }

    /// Storage grid width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.circumference
    }

    /// Storage grid height.
    #[must_use]
    pub const fn height(&self) -> usize {
        2 * self.wedge_height
    }

    /// Columns occupied by the six wedges (excludes the seam).
    #[must_use]
    pub const fn wedge_span(&self) -> usize {
        self.wedge_base * WEDGES_PER_HEMISPHERE
    }

    /// Distance of row `y` from the equator.
    #[must_use]
    pub const fn local_y(&self, y: usize) -> usize {
        if y >= self.wedge_height {
            y - self.wedge_height
        } else {
            self.wedge_height - 1 - y
        }
    }

    /// Active beads per wedge at a given distance from the equator.
    #[must_use]
    pub fn row_width(&self, local_y: usize) -> usize {
        self.wedge_base.saturating_sub(local_y).max(1)
    }

    /// First active wedge-local column at a given distance from the equator.
    ///
    /// Past the point where the taper reaches one bead the offset stops
    /// moving, so the pole column stays 4-connected.
    #[must_use]
    pub fn row_offset(&self, local_y: usize) -> usize {
        local_y.min(self.wedge_base - 1) / 2
    }

    /// Whether `(x, y)` lies inside one of the twelve wedges.
    #[must_use]
    pub fn is_active(&self, x: usize, y: usize) -> bool {
        if x >= self.wedge_span() || y >= self.height() {
            return false;
        }
        let local_x = x % self.wedge_base;
        let local_y = self.local_y(y);
        let offset = self.row_offset(local_y);
        local_x >= offset && local_x < offset + self.row_width(local_y)
    }

    /// Active cells in row `y` across the whole circumference.
    #[must_use]
    pub fn active_in_row(&self, y: usize) -> usize {
        if y >= self.height() {
            return 0;
        }
        self.row_width(self.local_y(y)) * WEDGES_PER_HEMISPHERE
    }

    /// Total active cells on the ball.
    #[must_use]
    pub fn active_count(&self) -> usize {
        (0..self.height()).map(|y| self.active_in_row(y)).sum()
    }

    /// Map a grid cell to wedge-local coordinates; `None` for seam or out-of-grid cells.
    #[must_use]
    pub fn to_local(&self, x: usize, y: usize) -> Option<WedgeCoord> {
        if x >= self.wedge_span() || y >= self.height() {
            return None;
        }
        let top = y >= self.wedge_height;
        let wedge = x / self.wedge_base + if top { WEDGES_PER_HEMISPHERE } else { 0 };
        Some(WedgeCoord {
            wedge,
            local_x: x % self.wedge_base,
            local_y: self.local_y(y),
        })
    }

    /// Map wedge-local coordinates back to the grid.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidWedgeIndex`] for `wedge >= 12` and
    /// [`PatternError::OutOfBounds`] when the local coordinate leaves the wedge.
    pub fn to_grid(&self, coord: WedgeCoord) -> PatternResult<(usize, usize)> {
        let bounds = self.wedge_bounds(coord.wedge)?;
        if coord.local_x >= self.wedge_base || coord.local_y >= self.wedge_height {
            return Err(PatternError::OutOfBounds {
                x: coord.local_x,
                y: coord.local_y,
                width: self.wedge_base,
                height: self.wedge_height,
            });
        }
        let y = if coord.wedge >= WEDGES_PER_HEMISPHERE {
            self.wedge_height + coord.local_y
        } else {
            self.wedge_height - 1 - coord.local_y
        };
        Ok((bounds.start_x + coord.local_x, y))
    }

    /// Storage rectangle of wedge `index` in `[0, 12)`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidWedgeIndex`] outside `[0, 12)`.
    pub fn wedge_bounds(&self, index: usize) -> PatternResult<WedgeBounds> {
        if index >= WEDGE_COUNT {
            return Err(PatternError::InvalidWedgeIndex(index));
        }
        let top = index >= WEDGES_PER_HEMISPHERE;
        Ok(WedgeBounds {
            start_x: (index % WEDGES_PER_HEMISPHERE) * self.wedge_base,
            start_y: if top { self.wedge_height } else { 0 },
            width: self.wedge_base,
            height: self.wedge_height,
        })
    }
}

/// One row of the ball size table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallSize {
    /// Finished ball diameter in centimetres.
    pub diameter: u8,
    /// Columns around the ball.
    pub circumference: usize,
    /// Columns per wedge.
    pub wedge_base: usize,
    /// Rows per wedge.
    pub wedge_height: usize,
    /// `false` when the numbers were interpolated rather than measured.
    #[serde(default)]
    pub measured: bool,
}

impl BallSize {
    /// Geometry described by this row.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidDimensions`] if the row is inconsistent.
    pub fn geometry(&self) -> PatternResult<BallGeometry> {
        BallGeometry::new(self.circumference, self.wedge_base, self.wedge_height)
    }
}

/// Supported ball sizes. Loaded from configuration, with a built-in default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallSizeTable {
    sizes: Vec<BallSize>,
}

impl BallSizeTable {
    /// Build a table, validating every row.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidDimensions`] for an inconsistent row or a
    /// duplicated diameter.
    pub fn new(mut sizes: Vec<BallSize>) -> PatternResult<Self> {
        sizes.sort_by_key(|s| s.diameter);
        for pair in sizes.windows(2) {
            if pair[0].diameter == pair[1].diameter {
                return Err(PatternError::dimensions(format!(
                    "duplicate ball size {} cm",
                    pair[0].diameter
                )));
            }
        }
        for size in &sizes {
            size.geometry()?;
        }
        Ok(Self { sizes })
    }

    /// Parse a JSON array of sizes.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Serialization`] or a validation error.
    pub fn from_json(json: &str) -> PatternResult<Self> {
        let sizes: Vec<BallSize> = serde_json::from_str(json)?;
        Self::new(sizes)
    }

    /// All rows, smallest first.
    #[must_use]
    pub fn sizes(&self) -> &[BallSize] {
        &self.sizes
    }

    /// Row for a diameter.
    #[must_use]
    pub fn get(&self, diameter: u8) -> Option<&BallSize> {
        self.sizes.iter().find(|s| s.diameter == diameter)
    }

    /// Row whose geometry matches, if any.
    #[must_use]
    pub fn find_geometry(&self, geometry: &BallGeometry) -> Option<&BallSize> {
        self.sizes.iter().find(|s| {
            s.circumference == geometry.circumference()
                && s.wedge_base == geometry.wedge_base()
                && s.wedge_height == geometry.wedge_height()
        })
    }
}

impl Default for BallSizeTable {
    fn default() -> Self {
        Self {
            sizes: vec![
                BallSize {
                    diameter: 3,
                    circumference: 66,
                    wedge_base: 11,
                    wedge_height: 19,
                    measured: false,
                },
                BallSize {
                    diameter: 4,
                    circumference: 86,
                    wedge_base: 14,
                    wedge_height: 25,
                    measured: true,
                },
                BallSize {
                    diameter: 5,
                    circumference: 108,
                    wedge_base: 18,
                    wedge_height: 31,
                    measured: false,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_cm() -> BallGeometry {
        BallGeometry::new(86, 14, 25).expect("valid geometry")
    }

    #[test]
    fn test_dimensions() {
        let g = four_cm();
        assert_eq!(g.width(), 86);
        assert_eq!(g.height(), 50);
        assert_eq!(g.wedge_span(), 84);
    }

    #[test]
    fn test_rejects_inconsistent_circumference() {
        assert!(BallGeometry::new(90, 14, 25).is_err());
        assert!(BallGeometry::new(83, 14, 25).is_err());
        assert!(BallGeometry::new(84, 0, 25).is_err());
        assert!(BallGeometry::new(84, 14, 0).is_err());
    }

    #[test]
    fn test_equator_rows_are_widest() {
        let g = four_cm();
        assert_eq!(g.local_y(24), 0);
        assert_eq!(g.local_y(25), 0);
        assert_eq!(g.active_in_row(24), 14 * 6);
        assert_eq!(g.active_in_row(25), 14 * 6);
        for x in 0..14 {
            assert!(g.is_active(x, 24));
            assert!(g.is_active(x, 25));
        }
    }

    #[test]
    fn test_pole_rows_are_narrowest() {
        let g = four_cm();
        let min = (0..g.height()).map(|y| g.active_in_row(y)).min();
        assert_eq!(min, Some(g.active_in_row(0)));
        assert_eq!(g.active_in_row(0), g.active_in_row(49));
        assert_eq!(g.row_width(g.local_y(0)), 1);
    }

    #[test]
    fn test_seam_columns_are_inactive() {
        let g = four_cm();
        for y in 0..g.height() {
            assert!(!g.is_active(84, y));
            assert!(!g.is_active(85, y));
        }
    }

    #[test]
    fn test_taper_is_centered() {
        let g = BallGeometry::from_wedges(10, 6).expect("valid");
        // local_y 2: width 8, offset 1 -> columns 1..9
        let y = g.wedge_height() + 2;
        assert!(!g.is_active(0, y));
        assert!(g.is_active(1, y));
        assert!(g.is_active(8, y));
        assert!(!g.is_active(9, y));
    }

    #[test]
    fn test_pole_column_is_vertical_past_the_taper() {
        let g = four_cm();
        let pole = g.row_offset(13);
        for local_y in 13..g.wedge_height() {
            assert_eq!(g.row_width(local_y), 1);
            assert_eq!(g.row_offset(local_y), pole);
        }
        assert_eq!(pole, 6);
    }

    #[test]
    fn test_active_count_matches_scan() {
        let g = four_cm();
        let scanned = (0..g.height())
            .flat_map(|y| (0..g.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| g.is_active(x, y))
            .count();
        assert_eq!(g.active_count(), scanned);
    }

    #[test]
    fn test_local_round_trip() {
        let g = four_cm();
        for y in 0..g.height() {
            for x in 0..g.wedge_span() {
                let coord = g.to_local(x, y).expect("inside wedges");
                assert_eq!(g.to_grid(coord).expect("valid coord"), (x, y));
            }
        }
        assert!(g.to_local(85, 0).is_none());
    }

    #[test]
    fn test_low_wedge_indices_are_bottom_hemisphere() {
        let g = four_cm();
        // Row 0 is the bottom pole
        assert_eq!(g.to_local(0, 0).expect("inside").wedge, 0);
        assert_eq!(g.to_local(83, 24).expect("inside").wedge, 5);
        assert_eq!(g.to_local(0, 25).expect("inside").wedge, 6);
        assert_eq!(g.to_local(83, 49).expect("inside").wedge, 11);
        let pole = WedgeCoord {
            wedge: 0,
            local_x: 6,
            local_y: 24,
        };
        assert_eq!(g.to_grid(pole).expect("valid coord"), (6, 0));
    }

    #[test]
    fn test_wedge_bounds() {
        let g = four_cm();
        let b = g.wedge_bounds(7).expect("valid index");
        assert_eq!(b.start_x, 14);
        assert_eq!(b.start_y, 25);
        assert_eq!(b.width, 14);
        assert_eq!(b.height, 25);
        assert!(matches!(
            g.wedge_bounds(12),
            Err(PatternError::InvalidWedgeIndex(12))
        ));
    }

    #[test]
    fn test_default_size_table() {
        let table = BallSizeTable::default();
        let four = table.get(4).expect("4 cm present");
        assert!(four.measured);
        assert_eq!(four.geometry().expect("valid").width(), 86);
        for size in table.sizes() {
            assert!(size.geometry().is_ok(), "{} cm row is valid", size.diameter);
        }
        assert_eq!(table.find_geometry(&four_cm()).map(|s| s.diameter), Some(4));
    }

    #[test]
    fn test_size_table_from_json() {
        let json = r#"[{"diameter": 6, "circumference": 126, "wedgeBase": 21, "wedgeHeight": 36}]"#;
        let table = BallSizeTable::from_json(json).expect("parse");
        assert!(!table.get(6).expect("present").measured);

        let bad = r#"[{"diameter": 6, "circumference": 100, "wedgeBase": 21, "wedgeHeight": 36}]"#;
        assert!(BallSizeTable::from_json(bad).is_err());
    }
}
