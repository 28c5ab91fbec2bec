//! Covering and query benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mapunit::builder::UnitBuilder;
use mapunit::container::MemoryOpener;
use mapunit::covering::{cover, DEFAULT_VIEWPORT_MAX_CELLS};
use mapunit::{BoundingRect, CoveringMode, MapIndex, UnitCategory};
use std::hint::black_box;
use std::ops::ControlFlow;
use std::sync::Arc;

fn bench_cover(c: &mut Criterion) {
    let mut group = c.benchmark_group("Cover");
    let rect = BoundingRect::new(12.5, 41.0, 14.0, 42.5);

    for scale in [5u32, 10, 17].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(scale), scale, |b, &scale| {
            b.iter(|| {
                black_box(cover(
                    &rect,
                    scale,
                    CoveringMode::ViewportWithLowLevels,
                    DEFAULT_VIEWPORT_MAX_CELLS,
                ))
            });
        });
    }

    group.finish();
}

fn populated_index(units: usize, features: usize) -> MapIndex {
    let opener = Arc::new(MemoryOpener::new());
    for u in 0..units {
        let x0 = (u % 10) as f64 * 10.0;
        let y0 = (u / 10) as f64 * 10.0;
        let bounds = BoundingRect::new(x0, y0, x0 + 10.0, y0 + 10.0);
        let mut builder = UnitBuilder::new(UnitCategory::Country, bounds, 1, 17, vec![4, 10, 17]);
        for i in 0..features {
            let x = x0 + (i % 100) as f64 * 0.1;
            let y = y0 + (i / 100 % 100) as f64 * 0.1;
            builder
                .add_feature(b"feature", &BoundingRect::new(x, y, x + 0.05, y + 0.05), 1 + (i % 17) as u32)
                .unwrap();
        }
        opener.insert(builder.into_memory_container(&format!("unit-{}", u)).unwrap());
    }

    let index = MapIndex::new(opener);
    for u in 0..units {
        index.register_unit(&format!("unit-{}", u)).unwrap();
    }
    index
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("Query");
    let index = populated_index(20, 10000);

    for scale in [4u32, 10, 17].iter() {
        group.bench_with_input(BenchmarkId::new("viewport", scale), scale, |b, &scale| {
            b.iter(|| {
                let mut count = 0usize;
                index.for_each_feature_id_in_rect(
                    |_| {
                        count += 1;
                        ControlFlow::Continue(())
                    },
                    &BoundingRect::new(25.0, 5.0, 55.0, 15.0),
                    scale,
                    CoveringMode::ViewportWithLowLevels,
                );
                black_box(count)
            });
        });
    }

    group.bench_function("full_cover_17", |b| {
        b.iter(|| {
            let mut count = 0usize;
            index.for_each_feature_id_in_scale(
                |_| {
                    count += 1;
                    ControlFlow::Continue(())
                },
                17,
            );
            black_box(count)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_cover, bench_query);
criterion_main!(benches);
