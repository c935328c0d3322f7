//! Property tests for geometry, stringing order, drawing and documents.

use beadforge_core::drawing::{flood_fill, mirror_wedge_horizontally};
use beadforge_core::{
    dto_to_pattern, pattern_to_dto, BallGeometry, Color, Pattern, StringingOrder, EMPTY, SKIP,
};
use proptest::prelude::*;

fn arb_geometry() -> impl Strategy<Value = BallGeometry> {
    (1usize..16, 1usize..20, 0usize..6).prop_map(|(base, height, seam)| {
        BallGeometry::new(base * 6 + seam, base, height).expect("generated geometry is valid")
    })
}

fn arb_cell_value(palette_len: u8) -> impl Strategy<Value = u8> {
    prop_oneof![
        8 => 0..palette_len,
        1 => Just(SKIP),
        1 => Just(EMPTY),
    ]
}

fn arb_rope() -> impl Strategy<Value = Pattern> {
    (3usize..12, 1usize..12, 1u8..5).prop_flat_map(|(w, h, colors)| {
        prop::collection::vec(arb_cell_value(colors), w * h).prop_map(move |field| {
            let mut p = Pattern::rope("prop", w, h).expect("valid");
            for i in 1..colors {
                p.add_color(Color::rgb(i, 0, 255 - i)).expect("add");
            }
            for (i, v) in field.into_iter().enumerate() {
                p.set_bead(i % w, i / w, v).expect("set");
            }
            p
        })
    })
}

fn arb_ball() -> impl Strategy<Value = Pattern> {
    arb_geometry().prop_flat_map(|g| {
        prop::collection::vec(arb_cell_value(3), g.width() * g.height()).prop_map(move |field| {
            let mut p = Pattern::ball_with_geometry("prop", 2, g);
            p.add_color(Color::rgb(0, 0, 0)).expect("add");
            p.add_color(Color::rgba(9, 9, 9, 100)).expect("add");
            for (i, v) in field.into_iter().enumerate() {
                p.set_bead(i % g.width(), i / g.width(), v).expect("set");
            }
            p
        })
    })
}

proptest! {
    #[test]
    fn prop_wedges_are_congruent(g in arb_geometry(), k in 0usize..6) {
        let span = g.wedge_span();
        for y in 0..g.height() {
            for x in 0..span {
                let shifted = (x + k * g.wedge_base()) % span;
                prop_assert_eq!(
                    g.is_active(x, y),
                    g.is_active(shifted, y),
                    "({}, {}) vs ({}, {})", x, y, shifted, y
                );
            }
        }
    }

    #[test]
    fn prop_ball_order_is_a_bijection(g in arb_geometry()) {
        let p = Pattern::ball_with_geometry("prop", 2, g);
        let order = StringingOrder::for_pattern(&p);
        prop_assert_eq!(order.total(), g.active_count());

        let mut last = 0;
        for y in 0..g.height() {
            for x in 0..g.width() {
                match order.position_of(x, y) {
                    Some(pos) => {
                        prop_assert!(pos > last);
                        last = pos;
                        prop_assert_eq!(order.cell_at_position(pos), Some((x, y)));
                    }
                    None => prop_assert!(!g.is_active(x, y)),
                }
            }
        }
        prop_assert_eq!(last, order.total());
    }

    #[test]
    fn prop_rope_order_is_a_bijection(w in 3usize..51, h in 1usize..40) {
        let p = Pattern::rope("prop", w, h).expect("valid");
        let order = StringingOrder::for_pattern(&p);
        for pos in 1..=order.total() {
            let (x, y) = order.cell_at_position(pos).expect("in range");
            prop_assert_eq!(order.position_of(x, y), Some(pos));
        }
    }

    #[test]
    fn prop_flood_fill_is_idempotent(p in arb_ball(), x in 0usize..96, y in 0usize..40) {
        let (x, y) = (x % p.width(), y % p.height());
        let mut filled = p.clone();
        let before = filled.grid().clone();
        let color = filled.get(x, y).expect("in grid");
        prop_assert_eq!(flood_fill(&mut filled, x, y, color).expect("fill"), 0);
        prop_assert_eq!(filled.grid(), &before);
    }

    #[test]
    fn prop_flood_fill_never_touches_inactive(p in arb_ball(), x in 0usize..96, y in 0usize..40) {
        let (x, y) = (x % p.width(), y % p.height());
        let mut filled = p.clone();
        flood_fill(&mut filled, x, y, 2).expect("fill");
        for cy in 0..p.height() {
            for cx in 0..p.width() {
                if !p.is_active(cx, cy) {
                    prop_assert_eq!(filled.get(cx, cy).expect("cell"), p.get(cx, cy).expect("cell"));
                }
            }
        }
    }

    #[test]
    fn prop_mirror_wedge_is_an_involution(p in arb_ball(), wedge in 0usize..12) {
        let mut mirrored = p.clone();
        mirror_wedge_horizontally(&mut mirrored, wedge).expect("mirror");
        mirror_wedge_horizontally(&mut mirrored, wedge).expect("mirror");
        prop_assert_eq!(mirrored.grid(), p.grid());
    }

    #[test]
    fn prop_mirror_wedge_keeps_active_color_counts(p in arb_ball(), wedge in 0usize..12) {
        let mut mirrored = p.clone();
        mirror_wedge_horizontally(&mut mirrored, wedge).expect("mirror");
        prop_assert_eq!(mirrored.count_by_color(), p.count_by_color());
        for cy in 0..p.height() {
            for cx in 0..p.width() {
                if !p.is_active(cx, cy) {
                    prop_assert_eq!(mirrored.get(cx, cy).expect("cell"), p.get(cx, cy).expect("cell"));
                }
            }
        }
    }

    #[test]
    fn prop_dto_round_trip_rope(p in arb_rope()) {
        let json = pattern_to_dto(&p).to_json().expect("serialize");
        let back = dto_to_pattern(serde_json::from_str(&json).expect("parse")).expect("load");
        prop_assert_eq!(back, p);
    }

    #[test]
    fn prop_dto_round_trip_ball(p in arb_ball()) {
        let back = dto_to_pattern(pattern_to_dto(&p)).expect("load");
        prop_assert_eq!(back, p);
    }
}
