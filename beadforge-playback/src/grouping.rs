//! Greedy run-length grouping of consecutive identical announcements.

use beadforge_core::{
    ColorMappingStore, EventTiming, Pattern, PatternEvents, Resolution, StringingOrder,
};

/// Resolve the bead at a 1-based position; `None` outside `[1, total]`.
#[must_use]
pub fn resolve_position(
    pattern: &Pattern,
    order: &StringingOrder,
    mappings: &ColorMappingStore,
    position: usize,
) -> Option<Resolution> {
    let (x, y) = order.cell_at_position(position)?;
    pattern.get(x, y).ok().map(|cell| mappings.resolve(cell))
}

/// Number of beads the step starting at `start` covers.
///
/// A group only grows over beads with the same voiced token. It ends before
/// any bead that carries events, after a bead with `after` events, and at
/// `limit` beads. Skipped and unvoiced beads are always their own step.
/// Returns 0 when `start` is outside the order.
#[must_use]
pub fn group_length(
    pattern: &Pattern,
    order: &StringingOrder,
    mappings: &ColorMappingStore,
    events: &PatternEvents,
    start: usize,
    limit: usize,
) -> usize {
    let Some(first) = resolve_position(pattern, order, mappings, start) else {
        return 0;
    };
    let Resolution::Voiced(token) = first else {
        return 1;
    };

    let limit = limit.max(1);
    let mut len = 1;
    while len < limit {
        let last = start + len - 1;
        let next = last + 1;
        if events.has_timing(last, EventTiming::After) || events.has_events(next) {
            break;
        }
        match resolve_position(pattern, order, mappings, next) {
            Some(Resolution::Voiced(t)) if t == token => len += 1,
            _ => break,
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use beadforge_core::{CellEvent, Color, SKIP};

    fn rope(cells: &[u8]) -> (Pattern, ColorMappingStore) {
        let mut p = Pattern::rope("group", cells.len(), 1).expect("valid");
        p.add_color(Color::rgb(0, 0, 255)).expect("add");
        for (x, &c) in cells.iter().enumerate() {
            p.set_bead(x, 0, c).expect("set");
        }
        let mappings = ColorMappingStore::from_palette(p.colors());
        (p, mappings)
    }

    fn length(cells: &[u8], events: &PatternEvents, start: usize, limit: usize) -> usize {
        let (p, m) = rope(cells);
        let order = StringingOrder::for_pattern(&p);
        group_length(&p, &order, &m, events, start, limit)
    }

    #[test]
    fn test_identical_run_groups() {
        assert_eq!(length(&[1, 1, 1], &PatternEvents::new(), 1, 20), 3);
        assert_eq!(length(&[1, 1, 0, 0], &PatternEvents::new(), 1, 20), 2);
        assert_eq!(length(&[1, 1, 0, 0], &PatternEvents::new(), 3, 20), 2);
    }

    #[test]
    fn test_individual_limit() {
        assert_eq!(length(&[1, 1, 1], &PatternEvents::new(), 1, 1), 1);
        assert_eq!(length(&[1, 1, 1, 1, 1], &PatternEvents::new(), 1, 2), 2);
    }

    #[test]
    fn test_event_inside_run_splits_group() {
        let mut events = PatternEvents::new();
        events
            .add(3, CellEvent::text("halfway", 1000, EventTiming::Before))
            .expect("add");
        assert_eq!(length(&[1, 1, 1, 1], &events, 1, 20), 2);
        assert_eq!(length(&[1, 1, 1, 1], &events, 3, 20), 2);
    }

    #[test]
    fn test_after_event_ends_group() {
        let mut events = PatternEvents::new();
        events
            .add(2, CellEvent::sound("bell", EventTiming::After))
            .expect("add");
        assert_eq!(length(&[1, 1, 1, 1], &events, 1, 20), 2);
    }

    #[test]
    fn test_skip_is_its_own_step() {
        assert_eq!(length(&[SKIP, SKIP, 1], &PatternEvents::new(), 1, 20), 1);
        assert_eq!(length(&[1, SKIP, 1], &PatternEvents::new(), 1, 20), 1);
    }

    #[test]
    fn test_out_of_range_is_zero() {
        assert_eq!(length(&[1, 1, 1], &PatternEvents::new(), 0, 20), 0);
        assert_eq!(length(&[1, 1, 1], &PatternEvents::new(), 4, 20), 0);
    }
}
