use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use strata::Hints;
use strata_int_test::test_util::{cleanup, create_mosaic_context, run_test, small_grid, tile_bytes};
use strata_mosaic::{
    MosaicError, MosaicGrid, MosaicResult, TileFetch, TileHandle, TileLayout, TilePosition,
    TileRequestScheduler, TileResult, TileResultQueue, TileSource,
};

/// Serves every tile from memory, slowly, counting calls.
struct SlowSource {
    fetched: AtomicUsize,
    active: AtomicUsize,
    delay: Duration,
}

impl SlowSource {
    fn new(delay: Duration) -> Self {
        Self {
            fetched: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            delay,
        }
    }
}

impl TileSource for SlowSource {
    fn fetch_tile(&self, _level: &str, position: TilePosition, _hints: &Hints) -> MosaicResult<TileFetch> {
        self.active.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.fetched.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        let bytes = tile_bytes(position.col, position.row);
        Ok(TileFetch::Present(TileHandle::from_bytes(position, bytes)))
    }
}

/// Fails every tile on an odd column.
struct FlakySource;

impl TileSource for FlakySource {
    fn fetch_tile(&self, _level: &str, position: TilePosition, _hints: &Hints) -> MosaicResult<TileFetch> {
        if position.col % 2 == 1 {
            return Err(MosaicError::Io(std::io::Error::other("tile server unavailable")));
        }
        Ok(TileFetch::Present(TileHandle::from_bytes(position, vec![position.row as u8])))
    }
}

fn all_positions(grid: &MosaicGrid) -> Vec<TilePosition> {
    grid.tiles_intersecting(&grid.envelope())
}

fn stream_skips_missing_tiles(layout: TileLayout) {
    run_test(
        || create_mosaic_context(layout),
        |ctx| {
            let store = ctx.store()?;
            let level = store.add_level(small_grid()?)?;
            let written = [(0, 0), (1, 1), (2, 1), (0, 2)];
            for (col, row) in written {
                store.create_tile(level.id(), col, row, &tile_bytes(col, row))?;
            }

            let mut positions = all_positions(level.grid());
            // outside the grid, so missing as well
            positions.push(TilePosition::new(7, 7));

            let mut queue = store.get_tiles(level.id(), positions)?;
            let mut seen = HashSet::new();
            loop {
                match TileResultQueue::take(&mut queue) {
                    TileResult::Payload(payload) => {
                        assert_eq!(payload.bytes, tile_bytes(payload.position.col, payload.position.row));
                        assert!(seen.insert(payload.position), "{} delivered twice", payload.position);
                    }
                    TileResult::Failure { position, error } => {
                        panic!("tile {} failed: {}", position, error)
                    }
                    TileResult::EndOfStream => break,
                }
            }

            let expected: HashSet<_> = written.iter().map(|&(c, r)| TilePosition::new(c, r)).collect();
            assert_eq!(seen, expected);

            // the sentinel is sticky
            assert!(TileResultQueue::take(&mut queue).is_end_of_stream());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_stream_skips_missing_tiles_file_per_tile() {
    stream_skips_missing_tiles(TileLayout::FilePerTile);
}

#[test]
fn test_stream_skips_missing_tiles_packed() {
    stream_skips_missing_tiles(TileLayout::Packed);
}

#[test]
fn test_stream_over_a_large_request() {
    let grid = MosaicGrid::new(0.0, 0.0, 40, 25, 256, 256, 1.0).unwrap();
    let source = Arc::new(SlowSource::new(Duration::ZERO));
    let scheduler = TileRequestScheduler::new(6, 4).unwrap();

    let queue = scheduler
        .submit(source.clone(), "1", all_positions(&grid), Hints::new())
        .unwrap();
    let delivered: Vec<_> = queue.collect();

    assert_eq!(delivered.len(), 1000);
    let unique: HashSet<_> = delivered.iter().filter_map(|r| r.position()).collect();
    assert_eq!(unique.len(), 1000);
    assert_eq!(source.fetched.load(Ordering::SeqCst), 1000);
}

#[test]
fn test_failures_are_reported_in_the_stream() {
    let grid = MosaicGrid::new(0.0, 0.0, 4, 3, 256, 256, 1.0).unwrap();
    let scheduler = TileRequestScheduler::new(3, 2).unwrap();
    let mut queue = scheduler
        .submit(Arc::new(FlakySource), "1", all_positions(&grid), Hints::new())
        .unwrap();

    let (mut payloads, mut failures) = (0, 0);
    loop {
        match TileResultQueue::take(&mut queue) {
            TileResult::Payload(payload) => {
                assert_eq!(payload.position.col % 2, 0);
                payloads += 1;
            }
            TileResult::Failure { position, .. } => {
                assert_eq!(position.col % 2, 1);
                failures += 1;
            }
            TileResult::EndOfStream => break,
        }
    }
    assert_eq!((payloads, failures), (6, 6));
}

#[test]
fn test_cancel_stops_workers_and_never_blocks() {
    let grid = MosaicGrid::new(0.0, 0.0, 50, 50, 256, 256, 1.0).unwrap();
    let source = Arc::new(SlowSource::new(Duration::from_millis(2)));
    let scheduler = TileRequestScheduler::new(4, 2).unwrap();
    let mut queue = scheduler
        .submit(source.clone(), "1", all_positions(&grid), Hints::new())
        .unwrap();

    assert!(!TileResultQueue::take(&mut queue).is_end_of_stream());
    let started = Instant::now();
    queue.cancel();
    assert!(TileResultQueue::take(&mut queue).is_end_of_stream());
    assert!(started.elapsed() < Duration::from_secs(1));

    awaitility::at_most(Duration::from_secs(5)).until(|| source.active.load(Ordering::SeqCst) == 0);
    let fetched = source.fetched.load(Ordering::SeqCst);
    assert!(fetched < 2500, "cancelled request fetched every tile");

    thread::sleep(Duration::from_millis(200));
    // workers may finish the fetch they were in, nothing more
    assert!(source.fetched.load(Ordering::SeqCst) <= fetched + 4);
}

#[test]
fn test_abandoned_queue_releases_workers() {
    let grid = MosaicGrid::new(0.0, 0.0, 30, 30, 256, 256, 1.0).unwrap();
    let source = Arc::new(SlowSource::new(Duration::from_millis(1)));
    let scheduler = TileRequestScheduler::new(3, 1).unwrap();
    let queue = scheduler
        .submit(source.clone(), "1", all_positions(&grid), Hints::new())
        .unwrap();
    drop(queue);

    awaitility::at_most(Duration::from_secs(5)).until(|| source.active.load(Ordering::SeqCst) == 0);
    assert!(source.fetched.load(Ordering::SeqCst) < 900);
}
