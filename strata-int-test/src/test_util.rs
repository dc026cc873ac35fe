use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, fs, thread};

use strata::{CrsToken, Envelope, ErrorKind, StrataError, StrataResult};
use strata_mosaic::{MosaicConfig, MosaicGrid, MosaicStore, TileLayout};
use strata_spatial::{QuadTree, Shape};

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread so a parallel run does not exhaust the
/// worker threads the mosaic scheduler spawns.
pub fn run_test<C, T, B, A>(before: B, test: T, after: A)
where
    C: Clone,
    T: Fn(C) -> StrataResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> StrataResult<C> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(C) -> StrataResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
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

        let failure = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_backtrace = Some(bt);
                e
            }
            Err(panic_err) => {
                let msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_backtrace = Some(Backtrace::capture().to_string());
                format!("Panic: {}", msg)
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("Error: {}", failure);
            eprintln!("Retrying in {}ms...\n", 100 * attempt);
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
        last_error = Some(failure);
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

/// A scratch folder plus, for mosaic tests, the store created inside it.
#[derive(Clone)]
pub struct TestContext {
    path: PathBuf,
    store: Option<MosaicStore>,
}

impl TestContext {
    pub fn new(path: PathBuf, store: Option<MosaicStore>) -> Self {
        Self { path, store }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `name` inside the scratch folder.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn store(&self) -> StrataResult<MosaicStore> {
        self.store.clone().ok_or_else(|| {
            StrataError::new("test context has no mosaic store", ErrorKind::InvalidArgument)
        })
    }
}

pub fn random_path() -> PathBuf {
    env::temp_dir().join(format!("strata-{}", uuid::Uuid::new_v4()))
}

/// A fresh, empty scratch folder.
pub fn create_test_context() -> StrataResult<TestContext> {
    let path = random_path();
    fs::create_dir_all(&path)?;
    Ok(TestContext::new(path, None))
}

/// A scratch folder holding an empty mosaic with the given layout.
pub fn create_mosaic_context(layout: TileLayout) -> StrataResult<TestContext> {
    let path = random_path();
    let config = MosaicConfig::new()
        .with_layout(layout)
        .with_worker_count(4)
        .with_queue_capacity(8);
    match MosaicStore::create(&path, CrsToken::new("EPSG:3857"), config) {
        Ok(store) => Ok(TestContext::new(path, Some(store))),
        Err(e) => {
            let _ = fs::remove_dir_all(&path);
            Err(e.into())
        }
    }
}

pub fn cleanup(ctx: TestContext) -> StrataResult<()> {
    if let Some(store) = &ctx.store {
        if !store.config().read_only {
            if let Err(e) = store.flush() {
                eprintln!("Warning: Failed to flush mosaic: {:?}", e);
            }
        }
    }
    drop(ctx.store);

    let max_retries = 5;
    for retry in 0..max_retries {
        match fs::remove_dir_all(&ctx.path) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if retry < max_retries - 1 => {
                log::debug!("Retrying removal of {:?}: {}", ctx.path, e);
                thread::sleep(Duration::from_millis(50 * (retry as u64 + 1)));
            }
            Err(e) => {
                // leftovers sit in the temp dir and are reclaimed by the OS
                eprintln!(
                    "Warning: Failed to remove test directory {:?} after {} attempts: {:?}",
                    ctx.path, max_retries, e
                );
            }
        }
    }
    Ok(())
}

/// Point shapes on a `side` x `side` lattice spaced `spacing` units apart,
/// numbered row-major from 1.
pub fn lattice_points(side: u32, spacing: f64) -> Vec<Shape> {
    let mut shapes = Vec::with_capacity((side * side) as usize);
    for j in 0..side {
        for i in 0..side {
            let x = i as f64 * spacing;
            let y = j as f64 * spacing;
            shapes.push(Shape::new(j * side + i + 1, Envelope::point(x, y)));
        }
    }
    shapes
}

pub fn build_tree(shapes: &[Shape]) -> StrataResult<QuadTree> {
    let mut tree = QuadTree::new();
    for shape in shapes {
        tree.insert(*shape)?;
    }
    Ok(tree)
}

/// The 3x3 level of 10x10 pixel tiles at scale 1 with its upper left
/// corner at (0, 100).
pub fn small_grid() -> StrataResult<MosaicGrid> {
    Ok(MosaicGrid::new(0.0, 100.0, 3, 3, 10, 10, 1.0)?)
}

/// Payload bytes identifying a tile, handy for checking what came back.
pub fn tile_bytes(col: u32, row: u32) -> Vec<u8> {
    format!("tile-{}-{}", col, row).into_bytes()
}
