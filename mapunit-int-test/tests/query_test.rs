use mapunit::feature::{RawFeature, RawRecordDecoder};
use mapunit::errors::MapResult;
use mapunit::{BoundingRect, CoveringMode, FeatureId, QueryOutcome, UnitCategory};
use mapunit_int_test::test_util::{
    cleanup, collect_ids, create_file_test_context, create_test_context, run_test, square,
    UnitFixture,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

#[ctor::ctor]
fn init() {
    colog::init();
}

const MODES: [CoveringMode; 3] = [
    CoveringMode::ViewportWithLowLevels,
    CoveringMode::LowLevelsOnly,
    CoveringMode::FullCover,
];

fn random_unit(rng: &mut StdRng, name: &str, bounds: BoundingRect, count: usize) -> UnitFixture {
    let mut unit = UnitFixture::new(name, UnitCategory::Country, bounds);
    for _ in 0..count {
        let x = rng.gen_range(bounds.min_x..bounds.max_x);
        let y = rng.gen_range(bounds.min_y..bounds.max_y);
        let w = rng.gen_range(0.0..(bounds.max_x - x));
        let h = rng.gen_range(0.0..(bounds.max_y - y));
        unit = unit.feature(BoundingRect::new(x, y, x + w, y + h), rng.gen_range(1..=10));
    }
    unit
}

/// Tier index answering `scale` for tiers 3, 6, 10.
fn bucket(scale: u32) -> usize {
    [3, 6, 10].iter().position(|&s| s >= scale).unwrap_or(2)
}

#[test]
fn test_country_then_world_scenario() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            // World registered first on purpose.
            let w = UnitFixture::new("W", UnitCategory::World, BoundingRect::world())
                .feature(square(-100.0, -50.0, 120.0), 1)
                .feature(square(2.0, 2.0, 1.0), 4);
            let a = UnitFixture::new("A", UnitCategory::Country, square(0.0, 0.0, 10.0))
                .feature(square(1.0, 1.0, 2.0), 1)
                .feature(square(4.0, 4.0, 0.0), 5)
                .feature(square(0.0, 0.0, 10.0), 2)
                .feature(square(7.0, 7.0, 1.0), 9);
            ctx.publish(&w)?;
            let a_offsets = ctx.publish(&a)?;
            let w_id = index.register_unit("W")?;
            let a_id = index.register_unit("A")?;

            let ids = collect_ids(&index, &square(0.0, 0.0, 10.0), 5, CoveringMode::ViewportWithLowLevels);
            let first_world = ids.iter().position(|id| id.unit_id == w_id).unwrap();
            assert!(ids[..first_world].iter().all(|id| id.unit_id == a_id));
            assert!(ids[first_world..].iter().all(|id| id.unit_id == w_id));

            // Features first visible at 9 stay hidden at scale 5 (tier 6 answers it).
            let visited: HashSet<u32> = ids.iter().filter(|id| id.unit_id == a_id).map(|id| id.offset).collect();
            let expected: HashSet<u32> = a_offsets[..3].iter().copied().collect();
            assert_eq!(visited, expected);
            assert_eq!(ids.iter().filter(|id| id.unit_id == w_id).count(), 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_coasts_before_world() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            for (name, category) in [
                ("W1", UnitCategory::World),
                ("C1", UnitCategory::Coasts),
                ("A", UnitCategory::Country),
                ("W2", UnitCategory::World),
                ("C2", UnitCategory::Coasts),
                ("B", UnitCategory::Country),
            ] {
                let unit = UnitFixture::new(name, category, square(-20.0, -20.0, 40.0))
                    .feature(square(-1.0, -1.0, 2.0), 1);
                ctx.publish(&unit)?;
                index.register_unit(name)?;
            }

            let snapshot = index.snapshot();
            let name_of = |id: &FeatureId| snapshot[id.unit_id].name.clone();
            for mode in MODES {
                let names: Vec<String> = collect_ids(&index, &square(-5.0, -5.0, 10.0), 4, mode)
                    .iter()
                    .map(name_of)
                    .collect();
                assert_eq!(names, vec!["A", "B", "C1", "C2", "W1", "W2"], "{:?}", mode);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_each_indexed_feature_visited_once() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let mut rng = StdRng::seed_from_u64(42);
            let bounds = BoundingRect::new(-30.0, 10.0, 5.0, 40.0);
            let unit = random_unit(&mut rng, "R", bounds, 300);
            let offsets = ctx.publish(&unit)?;
            let id = index.register_unit("R")?;

            for tier in [3u32, 6, 10] {
                let expected: HashSet<u32> = unit
                    .features
                    .iter()
                    .zip(&offsets)
                    .filter(|((_, min_scale), _)| bucket(*min_scale) <= bucket(tier))
                    .map(|(_, offset)| *offset)
                    .collect();

                for mode in MODES {
                    let ids = collect_ids(&index, &bounds, tier, mode);
                    let mut counts: HashMap<u32, usize> = HashMap::new();
                    for fid in &ids {
                        assert_eq!(fid.unit_id, id);
                        *counts.entry(fid.offset).or_default() += 1;
                    }
                    assert!(counts.values().all(|&c| c == 1), "duplicate visit in {:?}", mode);
                    let visited: HashSet<u32> = counts.into_keys().collect();
                    assert_eq!(visited, expected, "tier {} mode {:?}", tier, mode);
                }
            }
            Ok(())
        },
        cleanup,
    )
}

fn point(x: f64, y: f64) -> BoundingRect {
    BoundingRect::new(x, y, x, y)
}

#[test]
fn test_features_on_query_boundary_visited() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let mut rng = StdRng::seed_from_u64(11);
            let bounds = BoundingRect::new(-10.0, -10.0, 0.0, 0.0);
            let mut unit = UnitFixture::new("E", UnitCategory::Country, bounds)
                .feature(point(0.0, 0.0), 1)
                .feature(point(-10.0, -10.0), 1)
                .feature(point(-10.0, 0.0), 2)
                .feature(point(0.0, -10.0), 5)
                .feature(BoundingRect::new(-5.0, 0.0, 0.0, 0.0), 1)
                .feature(BoundingRect::new(0.0, -5.0, 0.0, 0.0), 8);
            for _ in 0..50 {
                let t = rng.gen_range(-10.0..0.0);
                let min_scale = rng.gen_range(1..=10);
                unit = unit
                    .feature(point(t, 0.0), min_scale)
                    .feature(point(0.0, t), min_scale);
            }
            let offsets = ctx.publish(&unit)?;
            index.register_unit("E")?;

            for tier in [3u32, 6, 10] {
                let expected: HashSet<u32> = unit
                    .features
                    .iter()
                    .zip(&offsets)
                    .filter(|((_, min_scale), _)| bucket(*min_scale) <= bucket(tier))
                    .map(|(_, offset)| *offset)
                    .collect();
                for mode in MODES {
                    let visited: HashSet<u32> = collect_ids(&index, &bounds, tier, mode)
                        .iter()
                        .map(|id| id.offset)
                        .collect();
                    assert_eq!(visited, expected, "tier {} mode {:?}", tier, mode);
                }
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_unit_touching_query_edge() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let unit = UnitFixture::new("T", UnitCategory::Country, square(0.0, 0.0, 10.0))
                .feature(point(0.0, 0.0), 1)
                .feature(BoundingRect::new(0.0, 2.0, 0.0, 6.0), 1)
                .feature(square(4.0, 4.0, 2.0), 1);
            let offsets = ctx.publish(&unit)?;
            let id = index.register_unit("T")?;

            for mode in [CoveringMode::ViewportWithLowLevels, CoveringMode::LowLevelsOnly] {
                // Shares only the unit's min corner.
                let ids = collect_ids(&index, &BoundingRect::new(-10.0, -10.0, 0.0, 0.0), 10, mode);
                assert!(ids.iter().all(|fid| fid.unit_id == id));
                let visited: HashSet<u32> = ids.iter().map(|fid| fid.offset).collect();
                assert!(visited.contains(&offsets[0]), "corner point missed in {:?}", mode);

                // Shares the unit's left edge.
                let ids = collect_ids(&index, &BoundingRect::new(-10.0, 0.0, 0.0, 10.0), 10, mode);
                let visited: HashSet<u32> = ids.iter().map(|fid| fid.offset).collect();
                assert!(visited.contains(&offsets[0]), "corner point missed in {:?}", mode);
                assert!(visited.contains(&offsets[1]), "edge segment missed in {:?}", mode);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_non_intersecting_units_never_visited() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let mut rng = StdRng::seed_from_u64(7);
            let left = random_unit(&mut rng, "L", square(-60.0, -60.0, 40.0), 100);
            let right = random_unit(&mut rng, "R", square(30.0, 30.0, 40.0), 100);
            ctx.publish(&left)?;
            ctx.publish(&right)?;
            let l = index.register_unit("L")?;
            index.register_unit("R")?;

            for _ in 0..50 {
                let x = rng.gen_range(-60.0..-25.0);
                let y = rng.gen_range(-60.0..-25.0);
                let rect = square(x, y, rng.gen_range(0.1..5.0));
                for mode in MODES {
                    let ids = collect_ids(&index, &rect, rng.gen_range(1..=10), mode);
                    assert!(ids.iter().all(|id| id.unit_id == l));
                }
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_repeated_queries_agree() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let mut rng = StdRng::seed_from_u64(99);
            for i in 0..4 {
                let unit = random_unit(&mut rng, &format!("U{}", i), square(i as f64 * 10.0, 0.0, 10.0), 80);
                ctx.publish(&unit)?;
                index.register_unit(&unit.name)?;
            }

            let rect = BoundingRect::new(5.0, 2.0, 32.0, 8.0);
            for mode in MODES {
                let first = collect_ids(&index, &rect, 6, mode);
                let second = collect_ids(&index, &rect, 6, mode);
                assert_eq!(first, second);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_visitor_stops_query() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            for name in ["A", "B"] {
                let unit = UnitFixture::new(name, UnitCategory::Country, square(0.0, 0.0, 10.0))
                    .feature(square(1.0, 1.0, 1.0), 1)
                    .feature(square(2.0, 2.0, 1.0), 1)
                    .feature(square(3.0, 3.0, 1.0), 1);
                ctx.publish(&unit)?;
                index.register_unit(name)?;
            }

            let mut seen = Vec::new();
            let outcome = index.for_each_feature_id_in_rect(
                |id| {
                    seen.push(id);
                    if seen.len() == 4 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                },
                &square(0.0, 0.0, 10.0),
                5,
                CoveringMode::ViewportWithLowLevels,
            );
            assert_eq!(outcome, QueryOutcome::Stopped);
            assert_eq!(seen.len(), 4);

            let all = collect_ids(&index, &square(0.0, 0.0, 10.0), 5, CoveringMode::ViewportWithLowLevels);
            assert_eq!(all.len(), 6);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_broken_units_skipped() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            for name in ["A", "B", "C"] {
                let unit = UnitFixture::new(name, UnitCategory::Country, square(0.0, 0.0, 10.0))
                    .feature(square(1.0, 1.0, 1.0), 1);
                ctx.publish(&unit)?;
                index.register_unit(name)?;
            }
            ctx.unpublish("B")?;

            let names: Vec<String> = collect_ids(&index, &square(0.0, 0.0, 10.0), 5, CoveringMode::ViewportWithLowLevels)
                .iter()
                .map(|id| index.registry().unit_info(id.unit_id).unwrap().name)
                .collect();
            assert_eq!(names, vec!["A", "C"]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_removed_unit_not_queried() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            for name in ["A", "B"] {
                let unit = UnitFixture::new(name, UnitCategory::Country, square(0.0, 0.0, 10.0))
                    .feature(square(1.0, 1.0, 1.0), 1);
                ctx.publish(&unit)?;
                index.register_unit(name)?;
            }
            let b = index.registry().id_by_name("B").unwrap();
            let lock = index.lock_unit(b);
            index.remove_unit("B")?;

            let ids = collect_ids(&index, &square(0.0, 0.0, 10.0), 5, CoveringMode::ViewportWithLowLevels);
            assert!(ids.iter().all(|id| id.unit_id != b));
            assert!(lock.is_valid());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_file_backed_decoding() {
    run_test(
        create_file_test_context,
        |ctx| {
            let index = ctx.index();
            let unit = UnitFixture::new("Island", UnitCategory::Country, square(10.0, 10.0, 5.0))
                .feature(square(11.0, 11.0, 1.0), 1)
                .feature(square(13.0, 13.0, 0.5), 7);
            let offsets = ctx.publish(&unit)?;
            let id = index.register_unit("Island")?;

            let mut payloads = Vec::new();
            let outcome = index.for_each_in_rect(
                &RawRecordDecoder,
                |feature: MapResult<RawFeature>| {
                    payloads.push(feature);
                    ControlFlow::Continue(())
                },
                &square(10.0, 10.0, 5.0),
                10,
                CoveringMode::ViewportWithLowLevels,
            );
            assert_eq!(outcome, QueryOutcome::Completed);
            let mut payloads: Vec<String> = payloads
                .into_iter()
                .map(|f| String::from_utf8(f.unwrap().payload).unwrap())
                .collect();
            payloads.sort();
            assert_eq!(payloads, vec!["Island#0", "Island#1"]);

            let guard = index.features_loader(id, RawRecordDecoder);
            assert_eq!(guard.file_name(), "Island");
            assert!(!guard.is_world());
            assert_eq!(guard.get_feature(offsets[1])?.payload, b"Island#1");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_scale_query_covers_everything_visible() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let mut rng = StdRng::seed_from_u64(3);
            let a = random_unit(&mut rng, "A", square(-170.0, -80.0, 30.0), 50);
            let b = random_unit(&mut rng, "B", square(120.0, 40.0, 30.0), 50);
            ctx.publish(&a)?;
            ctx.publish(&b)?;
            index.register_unit("A")?;
            index.register_unit("B")?;

            let visible = |unit: &UnitFixture| {
                unit.features
                    .iter()
                    .filter(|(_, min_scale)| bucket(*min_scale) <= bucket(6))
                    .count()
            };
            let mut count = 0;
            index.for_each_feature_id_in_scale(
                |_| {
                    count += 1;
                    ControlFlow::Continue(())
                },
                6,
            );
            assert_eq!(count, visible(&a) + visible(&b));
            Ok(())
        },
        cleanup,
    )
}
