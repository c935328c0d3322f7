//! Geometry-aware editing primitives.
//!
//! Fill, rasterization and wedge mirroring never write inactive ball cells.
//! Wedge copy moves whole wedge rectangles; wedges are congruent, so the
//! active shape lines up.

use crate::geometry::{WedgeCoord, WEDGES_PER_HEMISPHERE, WEDGE_COUNT};
use crate::{Pattern, PatternError, PatternResult};

/// 4-connected flood fill from `(x, y)` over active cells sharing the seed's color.
///
/// Returns the number of cells changed. An inactive seed or a seed already
/// holding `new_color` is a no-op.
///
/// # Errors
///
/// Returns [`PatternError::OutOfBounds`] for a seed outside the grid and
/// [`PatternError::InvalidColorIndex`] for a color outside the palette.
pub fn flood_fill(pattern: &mut Pattern, x: usize, y: usize, new_color: u8) -> PatternResult<usize> {
    let target = pattern.get(x, y)?;
    pattern.check_color_index(new_color)?;
    if !pattern.is_active(x, y) || target == new_color {
        return Ok(0);
    }

    let (width, height) = (pattern.width(), pattern.height());
    let mut changed = 0;
    let mut stack = vec![(x, y)];
    while let Some((cx, cy)) = stack.pop() {
        if !pattern.is_active(cx, cy) || pattern.get(cx, cy)? != target {
            continue;
        }
        pattern.grid_mut().set(cx, cy, new_color)?;
        changed += 1;

        if cx > 0 {
            stack.push((cx - 1, cy));
        }
        if cx + 1 < width {
            stack.push((cx + 1, cy));
        }
        if cy > 0 {
            stack.push((cx, cy - 1));
        }
        if cy + 1 < height {
            stack.push((cx, cy + 1));
        }
    }

    if changed > 0 {
        pattern.touch();
    }
    tracing::debug!("Flood fill at ({x}, {y}) changed {changed} cells");
    Ok(changed)
}

/// Rasterize a line between two cells (Bresenham), skipping inactive cells.
///
/// Returns the number of cells painted.
///
/// # Errors
///
/// Returns [`PatternError::InvalidColorIndex`] for a color outside the palette.
pub fn draw_line(
    pattern: &mut Pattern,
    from: (usize, usize),
    to: (usize, usize),
    color: u8,
) -> PatternResult<usize> {
    pattern.check_color_index(color)?;
    let mut painted = 0;
    for (x, y) in line_cells(from, to) {
        painted += paint(pattern, x, y, color)?;
    }
    if painted > 0 {
        pattern.touch();
    }
    Ok(painted)
}

/// Rasterize an axis-aligned rectangle spanned by two corners.
///
/// `filled = false` paints only the outline. Cells outside the grid or
/// inactive are skipped. Returns the number of cells painted.
///
/// # Errors
///
/// Returns [`PatternError::InvalidColorIndex`] for a color outside the palette.
pub fn draw_rectangle(
    pattern: &mut Pattern,
    a: (usize, usize),
    b: (usize, usize),
    color: u8,
    filled: bool,
) -> PatternResult<usize> {
    pattern.check_color_index(color)?;
    let (x0, x1) = (a.0.min(b.0), a.0.max(b.0));
    let (y0, y1) = (a.1.min(b.1), a.1.max(b.1));
    let mut painted = 0;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let edge = x == x0 || x == x1 || y == y0 || y == y1;
            if filled || edge {
                painted += paint(pattern, x, y, color)?;
            }
        }
    }
    if painted > 0 {
        pattern.touch();
    }
    Ok(painted)
}

/// Reverse every row of a rope pattern.
///
/// # Errors
///
/// Returns [`PatternError::InvalidDimensions`] for ball patterns; use
/// [`mirror_wedge_horizontally`] there.
pub fn mirror_horizontal(pattern: &mut Pattern) -> PatternResult<()> {
    require_rope(pattern)?;
    pattern.grid_mut().mirror_horizontal();
    pattern.touch();
    Ok(())
}

/// Reverse the row order of a rope pattern.
///
/// # Errors
///
/// Returns [`PatternError::InvalidDimensions`] for ball patterns.
pub fn mirror_vertical(pattern: &mut Pattern) -> PatternResult<()> {
    require_rope(pattern)?;
    pattern.grid_mut().mirror_vertical();
    pattern.touch();
    Ok(())
}

/// Copy wedge `source` onto wedge `target` at identical local coordinates.
///
/// Works across hemispheres: local row 0 is the equator row in both.
///
/// # Errors
///
/// Returns [`PatternError::InvalidWedgeIndex`] for indices outside `[0, 12)`
/// and [`PatternError::InvalidDimensions`] for rope patterns.
pub fn copy_wedge(pattern: &mut Pattern, source: usize, target: usize) -> PatternResult<()> {
    let cells = read_wedge(pattern, source)?;
    check_wedge_index(target)?;
    if source != target {
        write_wedge(pattern, target, &cells)?;
        pattern.touch();
    }
    Ok(())
}

/// Copy one wedge to every wedge of its hemisphere, or to all twelve.
///
/// # Errors
///
/// Returns [`PatternError::InvalidWedgeIndex`] for `source` outside `[0, 12)`
/// and [`PatternError::InvalidDimensions`] for rope patterns.
pub fn copy_wedge_to_all(
    pattern: &mut Pattern,
    source: usize,
    same_orientation: bool,
) -> PatternResult<()> {
    let cells = read_wedge(pattern, source)?;
    let targets = if same_orientation {
        let first = source / WEDGES_PER_HEMISPHERE * WEDGES_PER_HEMISPHERE;
        first..first + WEDGES_PER_HEMISPHERE
    } else {
        0..WEDGE_COUNT
    };
    for target in targets.filter(|&t| t != source) {
        write_wedge(pattern, target, &cells)?;
    }
    pattern.touch();
    Ok(())
}

/// Reflect a wedge left/right in place.
///
/// Each local row is reflected within its own active span
/// (`local_x -> 2 * row_offset + row_width - 1 - local_x`); inactive cells
/// are left as they are.
///
/// # Errors
///
/// Returns [`PatternError::InvalidWedgeIndex`] outside `[0, 12)` and
/// [`PatternError::InvalidDimensions`] for rope patterns.
pub fn mirror_wedge_horizontally(pattern: &mut Pattern, wedge: usize) -> PatternResult<()> {
    let geometry = ball_geometry(pattern)?;
    check_wedge_index(wedge)?;
    for local_y in 0..geometry.wedge_height() {
        let offset = geometry.row_offset(local_y);
        let width = geometry.row_width(local_y);
        for i in 0..width / 2 {
            let left = geometry.to_grid(WedgeCoord {
                wedge,
                local_x: offset + i,
                local_y,
            })?;
            let right = geometry.to_grid(WedgeCoord {
                wedge,
                local_x: offset + width - 1 - i,
                local_y,
            })?;
            let (a, b) = (pattern.get(left.0, left.1)?, pattern.get(right.0, right.1)?);
            pattern.grid_mut().set(left.0, left.1, b)?;
            pattern.grid_mut().set(right.0, right.1, a)?;
        }
    }
    pattern.touch();
    Ok(())
}

fn paint(pattern: &mut Pattern, x: usize, y: usize, color: u8) -> PatternResult<usize> {
    if !pattern.is_active(x, y) {
        return Ok(0);
    }
    pattern.grid_mut().set(x, y, color)?;
    Ok(1)
}

fn line_cells(from: (usize, usize), to: (usize, usize)) -> Vec<(usize, usize)> {
    let (mut x0, mut y0) = (as_signed(from.0), as_signed(from.1));
    let (x1, y1) = (as_signed(to.0), as_signed(to.1));
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut cells = Vec::new();
    loop {
        // Both coordinates stay between the two non-negative endpoints.
        cells.push((x0.unsigned_abs() as usize, y0.unsigned_abs() as usize));
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    cells
}

#[allow(clippy::cast_possible_wrap)]
const fn as_signed(v: usize) -> i64 {
    v as i64
}

fn require_rope(pattern: &Pattern) -> PatternResult<()> {
    if pattern.is_ball() {
        Err(PatternError::dimensions(
            "whole-grid mirroring applies to rope patterns only",
        ))
    } else {
        Ok(())
    }
}

fn ball_geometry(pattern: &Pattern) -> PatternResult<crate::BallGeometry> {
    pattern
        .ball_geometry()
        .copied()
        .ok_or_else(|| PatternError::dimensions("wedge operations need a ball pattern"))
}

fn check_wedge_index(index: usize) -> PatternResult<()> {
    if index < WEDGE_COUNT {
        Ok(())
    } else {
        Err(PatternError::InvalidWedgeIndex(index))
    }
}

/// Wedge cells in local row-major order (`local_y` outer, `local_x` inner).
fn read_wedge(pattern: &Pattern, wedge: usize) -> PatternResult<Vec<u8>> {
    let geometry = ball_geometry(pattern)?;
    check_wedge_index(wedge)?;
    let mut cells = Vec::with_capacity(geometry.wedge_base() * geometry.wedge_height());
    for local_y in 0..geometry.wedge_height() {
        for local_x in 0..geometry.wedge_base() {
            let (x, y) = geometry.to_grid(WedgeCoord {
                wedge,
                local_x,
                local_y,
            })?;
            cells.push(pattern.get(x, y)?);
        }
    }
    Ok(cells)
}

fn write_wedge(pattern: &mut Pattern, wedge: usize, cells: &[u8]) -> PatternResult<()> {
    let geometry = ball_geometry(pattern)?;
    check_wedge_index(wedge)?;
    let base = geometry.wedge_base();
    for (i, &value) in cells.iter().enumerate() {
        let (x, y) = geometry.to_grid(WedgeCoord {
            wedge,
            local_x: i % base,
            local_y: i / base,
        })?;
        pattern.grid_mut().set(x, y, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::BallGeometry;

    fn rope() -> Pattern {
        let mut p = Pattern::rope("rope", 5, 4).expect("valid");
        p.add_color(Color::rgb(0, 0, 0)).expect("add");
        p.add_color(Color::rgb(255, 0, 0)).expect("add");
        p
    }

    fn ball() -> Pattern {
        let mut p = Pattern::ball_with_geometry(
            "ball",
            2,
            BallGeometry::from_wedges(6, 4).expect("valid"),
        );
        p.add_color(Color::rgb(0, 0, 0)).expect("add");
        p.add_color(Color::rgb(255, 0, 0)).expect("add");
        p
    }

    #[test]
    fn test_flood_fill_bounded_by_color() {
        let mut p = rope();
        // Vertical wall of color 1 at x = 2
        for y in 0..4 {
            p.set_bead(2, y, 1).expect("set");
        }
        let changed = flood_fill(&mut p, 0, 0, 2).expect("fill");
        assert_eq!(changed, 8);
        assert_eq!(p.get(1, 3).expect("cell"), 2);
        assert_eq!(p.get(3, 0).expect("cell"), 0);
        assert_eq!(p.get(2, 0).expect("cell"), 1);
    }

    #[test]
    fn test_flood_fill_same_color_is_noop() {
        let mut p = rope();
        let before = p.grid().clone();
        assert_eq!(flood_fill(&mut p, 1, 1, 0).expect("fill"), 0);
        assert_eq!(p.grid(), &before);
    }

    #[test]
    fn test_flood_fill_out_of_bounds() {
        let mut p = rope();
        assert!(matches!(
            flood_fill(&mut p, 5, 0, 1),
            Err(PatternError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_flood_fill_skips_inactive_ball_cells() {
        let mut p = ball();
        let geometry = *p.ball_geometry().expect("ball");
        let changed = flood_fill(&mut p, 0, geometry.wedge_height(), 1).expect("fill");
        assert_eq!(changed, geometry.active_count());
        for y in 0..p.height() {
            for x in 0..p.width() {
                let expected = u8::from(geometry.is_active(x, y));
                assert_eq!(p.get(x, y).expect("cell"), expected, "cell ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_flood_fill_inactive_seed_is_noop() {
        let mut p = ball();
        // local_y 3 at the bottom pole: offset 1, so local_x 0 is inactive
        assert!(!p.is_active(0, 0));
        assert_eq!(flood_fill(&mut p, 0, 0, 1).expect("fill"), 0);
    }

    #[test]
    fn test_draw_line_diagonal() {
        let mut p = rope();
        let painted = draw_line(&mut p, (0, 0), (3, 3), 1).expect("line");
        assert_eq!(painted, 4);
        for i in 0..4 {
            assert_eq!(p.get(i, i).expect("cell"), 1);
        }
    }

    #[test]
    fn test_draw_line_reversed_direction() {
        let mut p = rope();
        let painted = draw_line(&mut p, (4, 1), (0, 1), 2).expect("line");
        assert_eq!(painted, 5);
    }

    #[test]
    fn test_draw_rectangle_outline_and_filled() {
        let mut p = rope();
        assert_eq!(draw_rectangle(&mut p, (0, 0), (4, 3), 1, false).expect("rect"), 14);
        assert_eq!(p.get(2, 1).expect("cell"), 0);

        let mut q = rope();
        assert_eq!(draw_rectangle(&mut q, (3, 2), (1, 0), 1, true).expect("rect"), 9);
    }

    #[test]
    fn test_draw_rectangle_clips_to_grid() {
        let mut p = rope();
        assert_eq!(draw_rectangle(&mut p, (3, 2), (9, 9), 1, true).expect("rect"), 4);
    }

    #[test]
    fn test_mirror_rope_only() {
        let mut p = rope();
        p.set_bead(0, 0, 1).expect("set");
        mirror_horizontal(&mut p).expect("mirror");
        assert_eq!(p.get(4, 0).expect("cell"), 1);
        mirror_vertical(&mut p).expect("mirror");
        assert_eq!(p.get(4, 3).expect("cell"), 1);

        let mut b = ball();
        assert!(mirror_horizontal(&mut b).is_err());
    }

    #[test]
    fn test_copy_wedge_across_hemispheres() {
        let mut p = ball();
        let g = *p.ball_geometry().expect("ball");
        // bottom wedge 0, equator row (y = 3), local_x 2
        p.set_bead(2, 3, 1).expect("set");
        copy_wedge(&mut p, 0, 8).expect("copy");
        // top wedge 8 = third top wedge, equator row y = 4
        assert_eq!(p.get(2 * g.wedge_base() + 2, 4).expect("cell"), 1);
    }

    #[test]
    fn test_copy_wedge_invalid_index() {
        let mut p = ball();
        assert!(matches!(
            copy_wedge(&mut p, 12, 0),
            Err(PatternError::InvalidWedgeIndex(12))
        ));
        assert!(matches!(
            copy_wedge(&mut p, 0, 13),
            Err(PatternError::InvalidWedgeIndex(13))
        ));
    }

    #[test]
    fn test_copy_wedge_to_hemisphere() {
        let mut p = ball();
        p.set_bead(1, 3, 2).expect("set");
        copy_wedge_to_all(&mut p, 0, true).expect("copy");
        for w in 0..6 {
            assert_eq!(p.get(w * 6 + 1, 3).expect("cell"), 2);
        }
        assert_eq!(p.get(1, 4).expect("top untouched"), 0);
    }

    #[test]
    fn test_copy_wedge_to_all_twelve() {
        let mut p = ball();
        p.set_bead(1, 3, 2).expect("set");
        copy_wedge_to_all(&mut p, 0, false).expect("copy");
        for w in 0..6 {
            assert_eq!(p.get(w * 6 + 1, 3).expect("bottom"), 2);
            assert_eq!(p.get(w * 6 + 1, 4).expect("top"), 2);
        }
    }

    #[test]
    fn test_mirror_wedge_twice_is_identity() {
        let mut p = ball();
        p.set_bead(0, 3, 1).expect("set");
        p.set_bead(2, 2, 2).expect("set");
        let before = p.grid().clone();
        mirror_wedge_horizontally(&mut p, 0).expect("mirror");
        assert_eq!(p.get(5, 3).expect("cell"), 1);
        assert_ne!(p.grid(), &before);
        mirror_wedge_horizontally(&mut p, 0).expect("mirror");
        assert_eq!(p.grid(), &before);
    }

    #[test]
    fn test_mirror_wedge_stays_inside_active_span() {
        let mut p = ball();
        let geometry = *p.ball_geometry().expect("ball");
        let at = |local_x, local_y| {
            geometry
                .to_grid(WedgeCoord {
                    wedge: 0,
                    local_x,
                    local_y,
                })
                .expect("inside wedge")
        };
        for local_y in 0..geometry.wedge_height() {
            let (x, y) = at(geometry.row_offset(local_y), local_y);
            p.set_bead(x, y, 1).expect("set");
        }
        let before = p.grid().clone();
        assert_eq!(p.count_by_color().get(&1), Some(&4));

        mirror_wedge_horizontally(&mut p, 0).expect("mirror");
        assert_eq!(p.count_by_color().get(&1), Some(&4));
        for local_y in 0..geometry.wedge_height() {
            let last = geometry.row_offset(local_y) + geometry.row_width(local_y) - 1;
            let (x, y) = at(last, local_y);
            assert_eq!(p.get(x, y).expect("cell"), 1, "local row {local_y}");
        }
        for y in 0..p.height() {
            for x in 0..p.width() {
                if !geometry.is_active(x, y) {
                    assert_eq!(
                        p.get(x, y).expect("cell"),
                        before.get(x, y).expect("cell"),
                        "inactive ({x}, {y})"
                    );
                }
            }
        }
    }

    #[test]
    fn test_wedge_ops_reject_rope() {
        let mut p = rope();
        assert!(copy_wedge(&mut p, 0, 1).is_err());
        assert!(mirror_wedge_horizontally(&mut p, 0).is_err());
    }
}
