use strata::{CrsToken, ErrorKind, StrataError};
use strata_int_test::test_util::{
    cleanup, create_mosaic_context, create_test_context, run_test, small_grid, tile_bytes,
};
use strata_mosaic::{
    grid_level_id, level_id, FolderCache, MosaicConfig, MosaicStore, TileFetch, TileLayout, METADATA_FILE,
    PACKED_DATA_FILE, PACKED_INDEX_FILE,
};

fn expect_kind<T>(result: Result<T, strata_mosaic::MosaicError>, kind: ErrorKind) {
    match result {
        Ok(_) => panic!("expected a {:?} failure", kind),
        Err(e) => {
            let err: StrataError = e.into();
            assert_eq!(err.kind(), &kind);
        }
    }
}

fn write_and_read_back(layout: TileLayout) {
    run_test(
        || create_mosaic_context(layout),
        |ctx| {
            let store = ctx.store()?;
            let level = store.add_level(small_grid()?)?;
            assert_eq!(level.id(), level_id(1.0));

            store.create_tile(level.id(), 0, 0, &tile_bytes(0, 0))?;
            store.create_tile(level.id(), 2, 1, &tile_bytes(2, 1))?;

            match store.get_tile(level.id(), 2, 1)? {
                TileFetch::Present(handle) => assert_eq!(handle.read_bytes()?, tile_bytes(2, 1)),
                TileFetch::Missing => panic!("tile (2, 1) was written"),
            }
            assert!(store.get_tile(level.id(), 1, 1)?.is_missing());
            assert!(store.get_tile(level.id(), 5, 5)?.is_missing());

            // overwriting replaces what readers see
            store.create_tile(level.id(), 0, 0, b"second")?;
            let handle = store.get_tile(level.id(), 0, 0)?;
            assert_eq!(handle.handle().map(|h| h.read_bytes()).transpose()?, Some(b"second".to_vec()));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_file_per_tile_round_trip() {
    write_and_read_back(TileLayout::FilePerTile);
}

#[test]
fn test_packed_round_trip() {
    write_and_read_back(TileLayout::Packed);
}

#[test]
fn test_packed_layout_files() {
    run_test(
        || create_mosaic_context(TileLayout::Packed),
        |ctx| {
            let store = ctx.store()?;
            let level = store.add_level(small_grid()?)?;
            store.create_tile(level.id(), 1, 1, &tile_bytes(1, 1))?;

            assert!(level.dir().join(PACKED_DATA_FILE).exists());
            assert!(level.dir().join(PACKED_INDEX_FILE).exists());
            assert!(ctx.path().join(METADATA_FILE).exists());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_reopen_keeps_levels_and_completion() {
    for layout in [TileLayout::FilePerTile, TileLayout::Packed] {
        run_test(
            || create_mosaic_context(layout),
            |ctx| {
                let store = ctx.store()?;
                let coarse = store.add_level(small_grid()?)?;
                let fine = strata_mosaic::MosaicGrid::new(0.0, 100.0, 6, 6, 10, 10, 0.5)?;
                let fine = store.add_level(fine)?;
                store.create_tile(coarse.id(), 1, 2, &tile_bytes(1, 2))?;
                store.create_tile(fine.id(), 5, 5, &tile_bytes(5, 5))?;

                // whatever the caller asks for, the recorded layout wins
                let reopened = MosaicStore::open(ctx.path(), MosaicConfig::new().with_read_only(true))?;
                assert_eq!(reopened.layout(), store.layout());
                assert_eq!(reopened.crs(), &CrsToken::new("EPSG:3857"));

                let ids: Vec<String> = reopened.levels().iter().map(|l| l.id().to_string()).collect();
                assert_eq!(ids, vec![coarse.id().to_string(), fine.id().to_string()]);

                let level = reopened.level(coarse.id()).ok_or_else(|| {
                    StrataError::new("level lost on reopen", ErrorKind::InternalError)
                })?;
                assert!(!level.grid().is_missing(1, 2));
                assert!(level.grid().is_missing(0, 0));

                match reopened.get_tile(fine.id(), 5, 5)? {
                    TileFetch::Present(handle) => assert_eq!(handle.read_bytes()?, tile_bytes(5, 5)),
                    TileFetch::Missing => panic!("tile (5, 5) was written before reopening"),
                }

                let picked = reopened.level_for_scale(0.75).map(|l| l.id().to_string());
                assert_eq!(picked, Some(fine.id().to_string()));
                Ok(())
            },
            |ctx| cleanup(ctx),
        )
    }
}

#[test]
fn test_bulk_load_with_deferred_metadata() {
    run_test(
        || create_test_context(),
        |ctx| {
            let config = MosaicConfig::new()
                .with_layout(TileLayout::Packed)
                .with_defer_metadata(true);
            let store = MosaicStore::create(ctx.path(), CrsToken::new("EPSG:3857"), config)?;
            let level = store.add_level(small_grid()?)?;
            for row in 0..3 {
                for col in 0..3 {
                    store.create_tile(level.id(), col, row, &tile_bytes(col, row))?;
                }
            }

            let stale = MosaicStore::open(ctx.path(), MosaicConfig::new().with_read_only(true))?;
            assert!(stale.get_tile(level.id(), 2, 2)?.is_missing());

            store.flush()?;
            let reopened = MosaicStore::open(ctx.path(), MosaicConfig::new().with_read_only(true))?;
            for row in 0..3 {
                for col in 0..3 {
                    match reopened.get_tile(level.id(), col, row)? {
                        TileFetch::Present(handle) => assert_eq!(handle.read_bytes()?, tile_bytes(col, row)),
                        TileFetch::Missing => panic!("tile ({}, {}) lost after flush", col, row),
                    }
                }
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_levels_differing_only_in_y_scale() {
    run_test(
        || create_mosaic_context(TileLayout::FilePerTile),
        |ctx| {
            let store = ctx.store()?;
            let square = store.add_level(small_grid()?)?;
            let stretched = store.add_level(small_grid()?.with_axis_scales(1.0, 3.0)?)?;
            assert_ne!(square.id(), stretched.id());
            assert_eq!(stretched.id(), grid_level_id(stretched.grid()));

            store.create_tile(stretched.id(), 0, 0, &tile_bytes(0, 0))?;
            assert!(store.get_tile(square.id(), 0, 0)?.is_missing());
            assert!(!store.get_tile(stretched.id(), 0, 0)?.is_missing());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_read_only_store_rejects_writes() {
    run_test(
        || create_mosaic_context(TileLayout::FilePerTile),
        |ctx| {
            let store = ctx.store()?;
            let level = store.add_level(small_grid()?)?;
            store.create_tile(level.id(), 0, 0, &tile_bytes(0, 0))?;

            let read_only = MosaicStore::open(ctx.path(), MosaicConfig::new().with_read_only(true))?;
            expect_kind(read_only.create_tile(level.id(), 1, 0, b"nope"), ErrorKind::Unsupported);
            expect_kind(read_only.add_level(small_grid()?), ErrorKind::Unsupported);
            assert!(!read_only.get_tile(level.id(), 0, 0)?.is_missing());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_store_argument_errors() {
    run_test(
        || create_mosaic_context(TileLayout::FilePerTile),
        |ctx| {
            let store = ctx.store()?;
            let level = store.add_level(small_grid()?)?;

            expect_kind(store.get_tile("no-such-level", 0, 0), ErrorKind::InvalidArgument);
            expect_kind(store.create_tile(level.id(), 3, 0, b"x"), ErrorKind::OutOfRange);
            expect_kind(store.add_level(small_grid()?), ErrorKind::InvalidArgument);
            expect_kind(
                MosaicStore::create(ctx.path(), CrsToken::new("EPSG:4326"), MosaicConfig::new()),
                ErrorKind::InvalidArgument,
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_open_rejects_corrupt_metadata() {
    run_test(
        || create_test_context(),
        |ctx| {
            std::fs::write(ctx.file(METADATA_FILE), b"{ not json")?;
            expect_kind(MosaicStore::open(ctx.path(), MosaicConfig::new()), ErrorKind::MalformedData);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_temporary_store_is_reused_by_name() {
    let cache = FolderCache::new();
    let crs = CrsToken::new("EPSG:3857");

    let first = MosaicStore::create_temporary("scratch", crs.clone(), MosaicConfig::new(), &cache).unwrap();
    let level = first.add_level(small_grid().unwrap()).unwrap();
    first.create_tile(level.id(), 1, 1, &tile_bytes(1, 1)).unwrap();

    let second = MosaicStore::create_temporary("scratch", crs, MosaicConfig::new(), &cache).unwrap();
    assert_eq!(second.folder(), first.folder());
    assert!(!second.get_tile(level.id(), 1, 1).unwrap().is_missing());

    let folder = first.folder().to_path_buf();
    drop(first);
    drop(second);
    assert!(cache.remove("scratch"));
    assert!(!folder.exists());
}
