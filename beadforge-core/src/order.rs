//! # Stringing Order
//!
//! Bijection between active grid cells and 1-based bead positions, in the
//! order a crafter threads them: rows bottom to top, columns left to right.
//!
//! Ropes use plain arithmetic. Balls have no closed form because the active
//! width varies per row, so both directions are tabulated once per structure
//! and reused until the pattern is re-created with another shape.

use crate::{Pattern, Shape};

/// The parts of a pattern that determine position assignment.
///
/// Color edits never change it; re-creating or resizing the pattern does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructureKey {
    shape: Shape,
    width: usize,
    height: usize,
}

impl StructureKey {
    /// Key for a pattern's current structure.
    #[must_use]
    pub fn of(pattern: &Pattern) -> Self {
        Self {
            shape: *pattern.shape(),
            width: pattern.width(),
            height: pattern.height(),
        }
    }
}

#[derive(Debug, Clone)]
enum Layout {
    Rope,
    Ball {
        /// Position per cell (row-major), 0 for inactive cells.
        positions: Vec<usize>,
        /// Cell per position, index `position - 1`.
        cells: Vec<(usize, usize)>,
    },
}

/// Position lookups for one pattern structure.
#[derive(Debug, Clone)]
pub struct StringingOrder {
    key: StructureKey,
    total: usize,
    layout: Layout,
}

impl StringingOrder {
    /// Build the order for a pattern. O(width * height) for balls.
    #[must_use]
    pub fn for_pattern(pattern: &Pattern) -> Self {
        let key = StructureKey::of(pattern);
        match pattern.shape() {
            Shape::Rope => Self {
                key,
                total: key.width * key.height,
                layout: Layout::Rope,
            },
            Shape::Ball { geometry, .. } => {
                let mut positions = vec![0; key.width * key.height];
                let mut cells = Vec::with_capacity(geometry.active_count());
                for y in 0..key.height {
                    for x in 0..key.width {
                        if geometry.is_active(x, y) {
                            cells.push((x, y));
                            positions[y * key.width + x] = cells.len();
                        }
                    }
                }
                tracing::debug!(
                    "Built ball stringing order: {} positions over {}x{}",
                    cells.len(),
                    key.width,
                    key.height
                );
                Self {
                    key,
                    total: cells.len(),
                    layout: Layout::Ball { positions, cells },
                }
            }
        }
    }

    /// Structure this order was built for.
    #[must_use]
    pub const fn key(&self) -> &StructureKey {
        &self.key
    }

    /// Whether this order is still valid for `pattern`.
    #[must_use]
    pub fn matches(&self, pattern: &Pattern) -> bool {
        self.key == StructureKey::of(pattern)
    }

    /// Number of positions (active cells).
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// 1-based position of a cell; `None` for inactive or out-of-grid cells.
    #[must_use]
    pub fn position_of(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.key.width || y >= self.key.height {
            return None;
        }
        match &self.layout {
            Layout::Rope => Some(y * self.key.width + x + 1),
            Layout::Ball { positions, .. } => {
                Some(positions[y * self.key.width + x]).filter(|&p| p > 0)
            }
        }
    }

    /// Cell at a 1-based position; `None` outside `[1, total]`.
    #[must_use]
    pub fn cell_at_position(&self, position: usize) -> Option<(usize, usize)> {
        if position == 0 || position > self.total {
            return None;
        }
        match &self.layout {
            Layout::Rope => {
                let i = position - 1;
                Some((i % self.key.width, i / self.key.width))
            }
            Layout::Ball { cells, .. } => cells.get(position - 1).copied(),
        }
    }

    /// Up to `count` cells starting at `start`, stopping at the last position.
    #[must_use]
    pub fn cells_in_position_range(&self, start: usize, count: usize) -> Vec<(usize, usize)> {
        (start..start.saturating_add(count))
            .map_while(|p| self.cell_at_position(p))
            .collect()
    }
}

/// Memoized [`StringingOrder`] that rebuilds only on structural change.
#[derive(Debug, Clone, Default)]
pub struct OrderCache {
    order: Option<StringingOrder>,
    rebuilds: usize,
}

impl OrderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Order for `pattern`, rebuilding if its structure changed.
    pub fn get(&mut self, pattern: &Pattern) -> &StringingOrder {
        let stale = self.order.as_ref().map_or(true, |o| !o.matches(pattern));
        if stale {
            self.rebuilds += 1;
            self.order = Some(StringingOrder::for_pattern(pattern));
        }
        self.order.get_or_insert_with(|| StringingOrder::for_pattern(pattern))
    }

    /// Drop the cached order.
    pub fn invalidate(&mut self) {
        self.order = None;
    }

    /// How many times the order has been built.
    #[must_use]
    pub const fn rebuilds(&self) -> usize {
        self.rebuilds
    }
}
