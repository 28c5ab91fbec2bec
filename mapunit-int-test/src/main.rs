use mapunit::errors::MapResult;
use mapunit::{BoundingRect, CoveringMode, UnitCategory};
use mapunit_int_test::test_util::{cleanup, collect_ids, create_file_test_context, square, UnitFixture};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> MapResult<()> {
    println!("Starting stress test...");
    let ctx = create_file_test_context()?;
    let index = ctx.index();
    let mut rng = StdRng::seed_from_u64(7);

    let units = 50;
    let features = 20000;

    let start = std::time::Instant::now();
    for u in 0..units {
        let x0 = (u % 10) as f64 * 15.0 - 75.0;
        let y0 = (u / 10) as f64 * 15.0 - 40.0;
        let mut unit = UnitFixture::new(&format!("unit-{}", u), UnitCategory::Country, square(x0, y0, 15.0));
        for _ in 0..features {
            let x = rng.gen_range(x0..x0 + 14.5);
            let y = rng.gen_range(y0..y0 + 14.5);
            let size = rng.gen_range(0.0..0.5);
            unit = unit.feature(square(x, y, size), rng.gen_range(1..=10));
        }
        ctx.publish(&unit)?;
        index.register_unit(&unit.name)?;
    }
    println!("Built and registered {} units in {:?}", units, start.elapsed());

    let start = std::time::Instant::now();
    let mut visited = 0;
    for _ in 0..1000 {
        let x = rng.gen_range(-75.0..60.0);
        let y = rng.gen_range(-40.0..20.0);
        visited += collect_ids(&index, &square(x, y, 5.0), 8, CoveringMode::ViewportWithLowLevels).len();
    }
    println!("Ran 1000 viewport queries ({} features) in {:?}", visited, start.elapsed());

    let start = std::time::Instant::now();
    let all = collect_ids(&index, &BoundingRect::infinite(), 10, CoveringMode::FullCover);
    println!("Full cover visited {} features in {:?}", all.len(), start.elapsed());

    cleanup(ctx)
}
