use strata::Envelope;
use strata_int_test::test_util::small_grid;
use strata_mosaic::{CompletionBits, MosaicGrid, TileLimits, TilePosition};

const EPS: f64 = 1e-9;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < EPS * a.abs().max(b.abs()).max(1.0)
}

fn assert_envelope(actual: Envelope, expected: Envelope) {
    assert!(
        close(actual.min_x, expected.min_x)
            && close(actual.min_y, expected.min_y)
            && close(actual.max_x, expected.max_x)
            && close(actual.max_y, expected.max_y),
        "{:?} != {:?}",
        actual,
        expected
    );
}

#[test]
fn test_small_grid_tile_envelopes() {
    let grid = small_grid().unwrap();
    assert_envelope(grid.tile_envelope(0, 0), Envelope::new(0.0, 90.0, 10.0, 100.0));
    assert_envelope(grid.tile_envelope(2, 2), Envelope::new(20.0, 70.0, 30.0, 80.0));
    assert_envelope(grid.envelope(), Envelope::new(0.0, 70.0, 30.0, 100.0));
}

#[test]
fn test_tiles_tessellate_the_level() {
    let grids = [
        MosaicGrid::new(0.0, 100.0, 3, 3, 10, 10, 1.0).unwrap(),
        MosaicGrid::new(-20037508.34, 20037508.34, 16, 8, 256, 256, 9783.939620502539).unwrap(),
        MosaicGrid::new(12.5, -3.25, 7, 5, 100, 60, 0.3)
            .unwrap()
            .with_axis_scales(0.3, 0.45)
            .unwrap(),
    ];

    for grid in &grids {
        let level = grid.envelope();
        let mut union = Envelope::empty();
        let mut area = 0.0;
        for row in 0..grid.grid_height() {
            for col in 0..grid.grid_width() {
                let tile = grid.tile_envelope(col, row);
                area += tile.area();
                union.expand_to_include(&tile);

                // neighbours share an edge exactly
                if col + 1 < grid.grid_width() {
                    assert!(close(tile.max_x, grid.tile_envelope(col + 1, row).min_x));
                }
                if row + 1 < grid.grid_height() {
                    assert!(close(tile.min_y, grid.tile_envelope(col, row + 1).max_y));
                }
            }
        }
        assert_envelope(union, level);
        assert!(close(area, level.area()));
    }
}

#[test]
fn test_completion_text_round_trip() {
    let mut checkerboard = CompletionBits::new(13, 7);
    for row in 0..7 {
        for col in 0..13 {
            if (col + row) % 2 == 0 {
                checkerboard.set(col, row).unwrap();
            }
        }
    }

    for bits in [CompletionBits::new(5, 4), CompletionBits::filled(5, 4), checkerboard] {
        let text = bits.to_text();
        let parsed = CompletionBits::from_text(&text, bits.width(), bits.height()).unwrap();
        assert_eq!(parsed, bits);
        assert_eq!(parsed.count_set(), bits.count_set());
    }
}

#[test]
fn test_missing_tiles_follow_completion_and_limits() {
    let grid = small_grid()
        .unwrap()
        .with_limits(TileLimits::new(0, 1, 0, 2))
        .unwrap()
        .with_completion_tracking();

    assert!(grid.is_missing(0, 0));
    grid.mark_tile_written(0, 0).unwrap();
    assert!(!grid.is_missing(0, 0));

    // written, but outside the limits
    grid.mark_tile_written(2, 0).unwrap();
    assert!(grid.is_missing(2, 0));

    assert!(grid.is_missing(3, 0));
    assert!(grid.mark_tile_written(3, 0).is_err());

    let text = grid.completion_text().unwrap();
    assert_eq!(text.lines().count(), 3);
}

#[test]
fn test_tiles_intersecting_an_envelope() {
    let grid = small_grid().unwrap();
    let positions = grid.tiles_intersecting(&Envelope::new(5.0, 75.0, 15.0, 85.0));
    assert_eq!(
        positions,
        vec![
            TilePosition::new(0, 1),
            TilePosition::new(1, 1),
            TilePosition::new(0, 2),
            TilePosition::new(1, 2),
        ]
    );

    assert_eq!(grid.tiles_intersecting(&grid.envelope()).len(), 9);
    assert!(grid.tiles_intersecting(&Envelope::new(100.0, 0.0, 110.0, 10.0)).is_empty());
}
