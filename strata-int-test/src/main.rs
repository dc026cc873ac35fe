use rand::Rng;
use strata::{Envelope, StrataResult};
use strata_int_test::test_util::{cleanup, create_mosaic_context, create_test_context};
use strata_mosaic::{MosaicGrid, TileLayout, TileResult};
use strata_spatial::{QuadTree, SharedQuadTree, Shape, SpatialTree};

fn main() -> StrataResult<()> {
    println!("Starting stress test...");
    quadtree_stress()?;
    mosaic_stress()?;
    Ok(())
}

fn quadtree_stress() -> StrataResult<()> {
    let ctx = create_test_context()?;
    let count = 1_000_000u32;
    let tree = SharedQuadTree::new(QuadTree::new());
    let mut rng = rand::rng();

    let start = std::time::Instant::now();
    for id in 0..count {
        let x = rng.random_range(0.0..10_000.0);
        let y = rng.random_range(0.0..10_000.0);
        tree.insert(Shape::new(id, Envelope::new(x, y, x + 1.0, y + 1.0)))?;
    }
    println!("Inserted {} shapes in {:?}", count, start.elapsed());

    let start = std::time::Instant::now();
    let mut hits = 0;
    for _ in 0..1000 {
        let x = rng.random_range(0.0..9_900.0);
        let y = rng.random_range(0.0..9_900.0);
        hits += tree.search(&Envelope::new(x, y, x + 100.0, y + 100.0))?.len();
    }
    println!("Ran 1000 window queries ({} hits) in {:?}", hits, start.elapsed());

    let path = ctx.file("stress.qix");
    let start = std::time::Instant::now();
    tree.save(&path)?;
    println!("Saved tree in {:?}", start.elapsed());

    let start = std::time::Instant::now();
    tree.reload(&path)?;
    println!("Reloaded {} shapes in {:?}", tree.size(), start.elapsed());

    cleanup(ctx)
}

fn mosaic_stress() -> StrataResult<()> {
    let ctx = create_mosaic_context(TileLayout::Packed)?;
    let store = ctx.store()?;
    let level = store.add_level(MosaicGrid::new(0.0, 0.0, 64, 64, 256, 256, 1.0)?)?;
    let payload = vec![0xA5u8; 16 * 1024];

    let start = std::time::Instant::now();
    for row in 0..64 {
        for col in 0..64 {
            store.create_tile(level.id(), col, row, &payload)?;
        }
    }
    println!("Wrote {} tiles in {:?}", 64 * 64, start.elapsed());

    let start = std::time::Instant::now();
    let positions = level.grid().tiles_intersecting(&level.grid().envelope());
    let mut bytes = 0;
    for result in store.get_tiles(level.id(), positions)? {
        match result {
            TileResult::Payload(tile) => bytes += tile.bytes.len(),
            TileResult::Failure { position, error } => println!("Tile {} failed: {}", position, error),
            TileResult::EndOfStream => break,
        }
    }
    println!("Streamed {} bytes in {:?}", bytes, start.elapsed());

    cleanup(ctx)
}
