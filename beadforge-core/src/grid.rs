//! Raw cell storage shared by rope and ball patterns.

use serde::{Deserialize, Serialize};

use crate::{PatternError, PatternResult};

/// Row-major cell buffer, one color-index byte per cell.
///
/// Row 0 is the first strung row. The store does not copy on write;
/// callers that need history clone the whole grid before mutating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridStore {
    width: usize,
    height: usize,
    field: Vec<u8>,
}

impl GridStore {
    /// Create a grid filled with color index 0.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            field: vec![0; width * height],
        }
    }

    /// Wrap an existing buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidDimensions`] if `field.len() != width * height`.
    pub fn from_field(width: usize, height: usize, field: Vec<u8>) -> PatternResult<Self> {
        if field.len() != width * height {
            return Err(PatternError::dimensions(format!(
                "field has {} cells, expected {width}x{height} = {}",
                field.len(),
                width * height
            )));
        }
        Ok(Self {
            width,
            height,
            field,
        })
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// The raw buffer.
    #[must_use]
    pub fn field(&self) -> &[u8] {
        &self.field
    }

    /// Whether `(x, y)` addresses a cell.
    #[must_use]
    pub const fn contains(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    fn index(&self, x: usize, y: usize) -> PatternResult<usize> {
        if self.contains(x, y) {
            Ok(y * self.width + x)
        } else {
            Err(PatternError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// Read a cell.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::OutOfBounds`] outside the grid.
    pub fn get(&self, x: usize, y: usize) -> PatternResult<u8> {
        let i = self.index(x, y)?;
        Ok(self.field[i])
    }

    /// Write a cell.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::OutOfBounds`] outside the grid.
    pub fn set(&mut self, x: usize, y: usize, color_index: u8) -> PatternResult<()> {
        let i = self.index(x, y)?;
        self.field[i] = color_index;
        Ok(())
    }

    /// Fill every cell with `fill_index`.
    pub fn clear(&mut self, fill_index: u8) {
        self.field.fill(fill_index);
    }

    /// Change dimensions, keeping the overlapping region. New cells get 0.
    pub fn resize(&mut self, new_width: usize, new_height: usize) {
        let mut field = vec![0; new_width * new_height];
        let keep_w = self.width.min(new_width);
        for y in 0..self.height.min(new_height) {
            let src = y * self.width;
            let dst = y * new_width;
            field[dst..dst + keep_w].copy_from_slice(&self.field[src..src + keep_w]);
        }
        tracing::debug!(
            "Resized grid {}x{} -> {new_width}x{new_height}",
            self.width,
            self.height
        );
        self.width = new_width;
        self.height = new_height;
        self.field = field;
    }

    /// Replace every occurrence of `from` with `to`.
    pub fn replace_value(&mut self, from: u8, to: u8) {
        for cell in &mut self.field {
            if *cell == from {
                *cell = to;
            }
        }
    }

    /// Apply `f` to every cell value.
    pub fn map_values(&mut self, mut f: impl FnMut(u8) -> u8) {
        for cell in &mut self.field {
            *cell = f(*cell);
        }
    }

    /// Reverse each row in place (left/right mirror).
    pub fn mirror_horizontal(&mut self) {
        if self.width == 0 {
            return;
        }
        for row in self.field.chunks_mut(self.width) {
            row.reverse();
        }
    }

    /// Reverse the row order in place (top/bottom mirror).
    pub fn mirror_vertical(&mut self) {
        let w = self.width;
        for y in 0..self.height / 2 {
            let top = self.height - 1 - y;
            for x in 0..w {
                self.field.swap(y * w + x, top * w + x);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_fills_zero() {
        let grid = GridStore::new(4, 3);
        assert_eq!(grid.field().len(), 12);
        assert!(grid.field().iter().all(|&c| c == 0));
    }

    #[test]
    fn test_set_and_get() {
        let mut grid = GridStore::new(4, 3);
        grid.set(3, 2, 7).expect("in bounds");
        assert_eq!(grid.get(3, 2).expect("in bounds"), 7);
        assert_eq!(grid.field()[2 * 4 + 3], 7);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut grid = GridStore::new(4, 3);
        assert!(matches!(
            grid.get(4, 0),
            Err(PatternError::OutOfBounds { x: 4, y: 0, .. })
        ));
        assert!(matches!(
            grid.set(0, 3, 1),
            Err(PatternError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_from_field_rejects_wrong_length() {
        assert!(GridStore::from_field(3, 3, vec![0; 8]).is_err());
        assert!(GridStore::from_field(3, 3, vec![0; 9]).is_ok());
    }

    #[test]
    fn test_clear() {
        let mut grid = GridStore::new(2, 2);
        grid.clear(5);
        assert_eq!(grid.field(), &[5, 5, 5, 5]);
    }

    #[test]
    fn test_resize_preserves_overlap() {
        let mut grid = GridStore::from_field(3, 2, vec![1, 2, 3, 4, 5, 6]).expect("valid");
        grid.resize(2, 3);
        assert_eq!(grid.field(), &[1, 2, 4, 5, 0, 0]);

        grid.resize(4, 1);
        assert_eq!(grid.field(), &[1, 2, 0, 0]);
    }

    #[test]
    fn test_mirror_horizontal() {
        let mut grid = GridStore::from_field(3, 2, vec![1, 2, 3, 4, 5, 6]).expect("valid");
        grid.mirror_horizontal();
        assert_eq!(grid.field(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_mirror_vertical() {
        let mut grid = GridStore::from_field(2, 3, vec![1, 2, 3, 4, 5, 6]).expect("valid");
        grid.mirror_vertical();
        assert_eq!(grid.field(), &[5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn test_replace_value() {
        let mut grid = GridStore::from_field(2, 2, vec![1, 2, 1, 3]).expect("valid");
        grid.replace_value(1, 9);
        assert_eq!(grid.field(), &[9, 2, 9, 3]);
    }
}
