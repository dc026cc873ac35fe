use std::collections::HashSet;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata::{Envelope, ErrorKind, StrataError};
use strata_int_test::test_util::{build_tree, cleanup, create_test_context, lattice_points, run_test};
use strata_spatial::{
    QuadTree, QuadTreeConfig, SharedQuadTree, Shape, SpatialTree, TreeReader, TreeWriter,
};

#[test]
fn test_lattice_sub_grid_query() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let points = lattice_points(23, 4.0);
            assert_eq!(points.len(), 529);
            let tree = build_tree(&points)?;

            // x and y in 0..=28 cover lattice columns and rows 0..8
            let found = tree.search(&Envelope::new(-1.0, -1.0, 29.0, 29.0))?;
            assert_eq!(found.len(), 64);

            let expected: HashSet<u32> = (0..8u32)
                .flat_map(|j| (0..8u32).map(move |i| j * 23 + i + 1))
                .collect();
            assert_eq!(found.into_iter().collect::<HashSet<_>>(), expected);
            tree.check_invariants()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_large_lattice_spreads_over_the_tree() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let points = lattice_points(300, 1.0);
            let tree = build_tree(&points)?;
            let capacity = tree.config().node_capacity;

            let counts: Vec<usize> = tree
                .breadth_first()
                .into_iter()
                .filter_map(|id| tree.node(id).map(|node| node.shape_count()))
                .collect();
            assert_eq!(counts[0], 0, "root keeps shapes");
            let fullest = counts.iter().copied().max().unwrap_or(0);
            assert!(fullest <= capacity, "a node holds {} of {} shapes", fullest, points.len());

            let found = tree.search(&Envelope::new(99.5, 99.5, 109.5, 109.5))?;
            assert_eq!(found.len(), 100);
            tree.check_invariants()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_full_extent_search_is_complete() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let mut rng = StdRng::seed_from_u64(42);
            let mut shapes = Vec::new();
            for id in 1..=2000u32 {
                // one box per 10x10 cell of a 50x40 lattice keeps them disjoint
                let cell_x = ((id - 1) % 50) as f64 * 10.0;
                let cell_y = ((id - 1) / 50) as f64 * 10.0;
                let w = rng.random_range(0.5..9.0);
                let h = rng.random_range(0.5..9.0);
                shapes.push(Shape::new(id, Envelope::new(cell_x, cell_y, cell_x + w, cell_y + h)));
            }
            let tree = build_tree(&shapes)?;

            let found = tree.search(&Envelope::new(-1.0, -1.0, 501.0, 401.0))?;
            assert_eq!(found.len(), shapes.len());
            let unique: HashSet<_> = found.iter().copied().collect();
            assert_eq!(unique.len(), shapes.len());

            let disjoint = tree.search(&Envelope::new(1000.0, 1000.0, 1200.0, 1100.0))?;
            assert!(disjoint.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_delete_everything_then_query() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let points = lattice_points(23, 4.0);
            let mut tree = build_tree(&points)?;
            let extent = Envelope::new(0.0, 0.0, 88.0, 88.0);

            for shape in points.iter().rev() {
                assert!(tree.delete(shape)?);
            }
            assert!(tree.is_empty());
            assert!(tree.search(&extent)?.is_empty());
            assert_eq!(tree.stats().entry_count, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_tree_survives_save_and_open() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("lattice.qix");
            let config = QuadTreeConfig::new().with_node_capacity(4);

            let shared = SharedQuadTree::with_config(config)?;
            for shape in lattice_points(23, 4.0) {
                shared.insert(shape)?;
            }
            shared.save(&path)?;

            let reopened = SharedQuadTree::open(&path, config)?;
            assert_eq!(reopened.size(), 529);
            assert_eq!(reopened.stats().entry_count, shared.stats().entry_count);
            assert_eq!(reopened.bounds(), shared.bounds());

            let query = Envelope::new(-1.0, -1.0, 29.0, 29.0);
            let mut before = shared.search(&query)?;
            let mut after = reopened.search(&query)?;
            before.sort_unstable();
            after.sort_unstable();
            assert_eq!(before, after);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_truncated_tree_file_leaves_target_untouched() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = build_tree(&lattice_points(10, 1.0))?;
            let bytes = TreeWriter::to_bytes(&tree)?;
            let path = ctx.file("cut.qix");
            std::fs::write(&path, &bytes[..bytes.len() - 7])?;

            let mut target = build_tree(&lattice_points(2, 1.0))?;
            let err: StrataError = match TreeReader::read_path(&path, &mut target) {
                Ok(_) => panic!("a truncated file must not load"),
                Err(e) => e.into(),
            };
            assert_eq!(err.kind(), &ErrorKind::IOFailure);
            assert_eq!(target.len(), 4);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_concurrent_readers_and_writers() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let tree = SharedQuadTree::new(QuadTree::new());
            let writers: Vec<_> = (0..4u32)
                .map(|t| {
                    let tree = tree.clone();
                    thread::spawn(move || {
                        for i in 0..250u32 {
                            let x = (i % 25) as f64 * 3.0;
                            let y = t as f64 * 100.0 + (i / 25) as f64 * 3.0;
                            tree.insert(Shape::new(t * 1000 + i, Envelope::new(x, y, x + 1.0, y + 1.0)))?;
                        }
                        Ok::<_, strata_spatial::SpatialError>(())
                    })
                })
                .collect();

            let reader = {
                let tree = tree.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let found = tree.search(&Envelope::new(0.0, 0.0, 500.0, 500.0))?;
                        assert!(found.len() <= 1000);
                    }
                    Ok::<_, strata_spatial::SpatialError>(())
                })
            };

            for handle in writers {
                handle.join().map_err(|_| StrataError::new("writer panicked", ErrorKind::InternalError))??;
            }
            reader.join().map_err(|_| StrataError::new("reader panicked", ErrorKind::InternalError))??;

            assert_eq!(tree.size(), 1000);
            assert_eq!(tree.search(&Envelope::new(-1.0, -1.0, 500.0, 500.0))?.len(), 1000);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
