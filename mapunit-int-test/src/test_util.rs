use mapunit::builder::UnitBuilder;
use mapunit::container::{DirectoryOpener, MemoryOpener};
use mapunit::errors::{ErrorKind, MapError, MapResult};
use mapunit::{BoundingRect, CoveringMode, FeatureId, MapIndex, UnitCategory};
use std::backtrace::Backtrace;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread to avoid thread exhaustion when running many tests in parallel.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> MapResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> MapResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> MapResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx).map_err(|e| {
                        (format!("After run failed: {:?}", e), backtrace.to_string())
                    }),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                eprintln!(
                    "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                    attempt, MAX_RETRIES, elapsed
                );
                eprintln!("Error: {}", e);
                last_error = Some(e);
                last_backtrace = Some(bt);
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                eprintln!(
                    "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                    attempt, MAX_RETRIES, elapsed
                );
                eprintln!("Panic: {}", err_msg);
                last_error = Some(format!("Panic: {}", err_msg));
                last_backtrace = Some(Backtrace::capture().to_string());
            }
        }

        if attempt < MAX_RETRIES {
            eprintln!("Retrying in {}ms...\n", 100 * attempt);
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// Where a context publishes its units.
#[derive(Clone)]
enum Backend {
    Memory(Arc<MemoryOpener>),
    Directory(Arc<DirectoryOpener>),
}

#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
    backend: Backend,
    index: MapIndex,
}

impl TestContext {
    pub fn index(&self) -> MapIndex {
        self.index.clone()
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Publishes (or replaces) a unit; returns the offsets of its features in
    /// the order they were given.
    pub fn publish(&self, unit: &UnitFixture) -> MapResult<Vec<u32>> {
        let mut builder = UnitBuilder::new(
            unit.category,
            unit.bounds,
            unit.min_scale,
            unit.max_scale,
            unit.scales.clone(),
        );
        let mut offsets = Vec::with_capacity(unit.features.len());
        for (i, (rect, min_scale)) in unit.features.iter().enumerate() {
            let payload = format!("{}#{}", unit.name, i);
            offsets.push(builder.add_feature(payload.as_bytes(), rect, *min_scale)?);
        }

        match &self.backend {
            Backend::Memory(opener) => opener.insert(builder.into_memory_container(&unit.name)?),
            Backend::Directory(opener) => builder.write_file(opener.path_for(&unit.name))?,
        }
        Ok(offsets)
    }

    /// Makes `name` unavailable to future opens.
    pub fn unpublish(&self, name: &str) -> MapResult<()> {
        match &self.backend {
            Backend::Memory(opener) => {
                opener.remove(name);
            }
            Backend::Directory(opener) => std::fs::remove_file(opener.path_for(name))?,
        }
        Ok(())
    }
}

fn temp_dir() -> MapResult<TempDir> {
    tempfile::tempdir().map_err(|e| {
        MapError::new(
            &format!("Failed to create temp dir: {}", e),
            ErrorKind::IOError,
        )
    })
}

/// Context whose units live in memory.
pub fn create_test_context() -> MapResult<TestContext> {
    let opener = Arc::new(MemoryOpener::new());
    let index = MapIndex::builder().opener(opener.clone()).build()?;
    Ok(TestContext {
        dir: Arc::new(temp_dir()?),
        backend: Backend::Memory(opener),
        index,
    })
}

/// Context whose units are container files in a temporary directory.
pub fn create_file_test_context() -> MapResult<TestContext> {
    let dir = temp_dir()?;
    let opener = Arc::new(DirectoryOpener::new(dir.path()));
    let index = MapIndex::builder()
        .opener(opener.clone())
        .handle_cache_size(4)
        .build()?;
    Ok(TestContext {
        dir: Arc::new(dir),
        backend: Backend::Directory(opener),
        index,
    })
}

pub fn cleanup(ctx: TestContext) -> MapResult<()> {
    ctx.index.registry().clear_cache();
    Ok(())
}

/// Description of a unit to publish.
#[derive(Clone, Debug)]
pub struct UnitFixture {
    pub name: String,
    pub category: UnitCategory,
    pub bounds: BoundingRect,
    pub min_scale: u32,
    pub max_scale: u32,
    pub scales: Vec<u32>,
    /// Feature extent and first visible scale.
    pub features: Vec<(BoundingRect, u32)>,
}

impl UnitFixture {
    /// Unit visible at scales 1..=10 with tiers 3, 6 and 10.
    pub fn new(name: &str, category: UnitCategory, bounds: BoundingRect) -> Self {
        UnitFixture {
            name: name.to_string(),
            category,
            bounds,
            min_scale: 1,
            max_scale: 10,
            scales: vec![3, 6, 10],
            features: Vec::new(),
        }
    }

    pub fn feature(mut self, rect: BoundingRect, min_scale: u32) -> Self {
        self.features.push((rect, min_scale));
        self
    }

    pub fn bounds(mut self, bounds: BoundingRect) -> Self {
        self.bounds = bounds;
        self
    }
}

pub fn square(x: f64, y: f64, size: f64) -> BoundingRect {
    BoundingRect::new(x, y, x + size, y + size)
}

/// Ids visited by a rectangle query, in visiting order.
pub fn collect_ids(
    index: &MapIndex,
    rect: &BoundingRect,
    scale: u32,
    mode: CoveringMode,
) -> Vec<FeatureId> {
    let mut ids = Vec::new();
    index.for_each_feature_id_in_rect(
        |id| {
            ids.push(id);
            ControlFlow::Continue(())
        },
        rect,
        scale,
        mode,
    );
    ids
}
