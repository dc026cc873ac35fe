//! One resolution level of a tile pyramid.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strata::Envelope;

use crate::completion::CompletionBits;
use crate::error::{MosaicError, MosaicResult};

/// Column and row of a tile; row 0 is the top of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePosition {
    pub col: u32,
    pub row: u32,
}

impl TilePosition {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for TilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Inclusive column/row range of the tiles that exist in a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLimits {
    pub min_col: u32,
    pub max_col: u32,
    pub min_row: u32,
    pub max_row: u32,
}

impl TileLimits {
    pub fn new(min_col: u32, max_col: u32, min_row: u32, max_row: u32) -> Self {
        Self {
            min_col,
            max_col,
            min_row,
            max_row,
        }
    }

    pub fn contains(&self, col: u32, row: u32) -> bool {
        (self.min_col..=self.max_col).contains(&col) && (self.min_row..=self.max_row).contains(&row)
    }
}

/// Grid geometry of a pyramid level plus its missing-tile tracking.
///
/// Tile `(col, row)` covers
/// `[x0 + col*span_x, x0 + (col+1)*span_x] x [y0 - (row+1)*span_y, y0 - row*span_y]`
/// where `(x0, y0)` is the upper-left corner and `span = tile pixels * scale`.
///
/// A tile is missing when it lies outside the grid, outside the optional
/// [`TileLimits`], or when completion tracking is on and its bit is clear.
/// The completion bits sit behind a mutex and only
/// [`mark_tile_written`](MosaicGrid::mark_tile_written) sets them.
pub struct MosaicGrid {
    upper_left_x: f64,
    upper_left_y: f64,
    grid_width: u32,
    grid_height: u32,
    tile_width: u32,
    tile_height: u32,
    scale_x: f64,
    scale_y: f64,
    limits: Option<TileLimits>,
    completion: Option<Mutex<CompletionBits>>,
}

impl MosaicGrid {
    /// Creates a level with the same scale on both axes, no limits and no
    /// completion tracking.
    pub fn new(
        upper_left_x: f64,
        upper_left_y: f64,
        grid_width: u32,
        grid_height: u32,
        tile_width: u32,
        tile_height: u32,
        scale: f64,
    ) -> MosaicResult<Self> {
        if !upper_left_x.is_finite() || !upper_left_y.is_finite() {
            return Err(MosaicError::InvalidArgument(format!(
                "upper-left corner ({}, {}) is not finite",
                upper_left_x, upper_left_y
            )));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(MosaicError::InvalidArgument(format!(
                "tile size {}x{} must be positive",
                tile_width, tile_height
            )));
        }
        check_scale(scale)?;

        Ok(Self {
            upper_left_x,
            upper_left_y,
            grid_width,
            grid_height,
            tile_width,
            tile_height,
            scale_x: scale,
            scale_y: scale,
            limits: None,
            completion: None,
        })
    }

    pub fn with_axis_scales(mut self, scale_x: f64, scale_y: f64) -> MosaicResult<Self> {
        check_scale(scale_x)?;
        check_scale(scale_y)?;
        self.scale_x = scale_x;
        self.scale_y = scale_y;
        Ok(self)
    }

    pub fn with_limits(mut self, limits: TileLimits) -> MosaicResult<Self> {
        if limits.min_col > limits.max_col || limits.min_row > limits.max_row {
            return Err(MosaicError::InvalidArgument(format!(
                "tile limits {:?} are inverted",
                limits
            )));
        }
        self.limits = Some(limits);
        Ok(self)
    }

    /// Turns on completion tracking with every tile missing.
    pub fn with_completion_tracking(mut self) -> Self {
        self.completion = Some(Mutex::new(CompletionBits::new(self.grid_width, self.grid_height)));
        self
    }

    pub fn with_completion(mut self, bits: CompletionBits) -> MosaicResult<Self> {
        if bits.width() != self.grid_width || bits.height() != self.grid_height {
            return Err(MosaicError::InvalidArgument(format!(
                "completion bits are {}x{} but the grid is {}x{}",
                bits.width(),
                bits.height(),
                self.grid_width,
                self.grid_height
            )));
        }
        self.completion = Some(Mutex::new(bits));
        Ok(self)
    }

    pub fn upper_left(&self) -> (f64, f64) {
        (self.upper_left_x, self.upper_left_y)
    }

    pub fn grid_width(&self) -> u32 {
        self.grid_width
    }

    pub fn grid_height(&self) -> u32 {
        self.grid_height
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    pub fn limits(&self) -> Option<TileLimits> {
        self.limits
    }

    pub fn tracks_completion(&self) -> bool {
        self.completion.is_some()
    }

    pub fn tile_count(&self) -> usize {
        self.grid_width as usize * self.grid_height as usize
    }

    /// Width of one tile in CRS units.
    pub fn span_x(&self) -> f64 {
        self.tile_width as f64 * self.scale_x
    }

    /// Height of one tile in CRS units.
    pub fn span_y(&self) -> f64 {
        self.tile_height as f64 * self.scale_y
    }

    pub fn contains_position(&self, col: u32, row: u32) -> bool {
        col < self.grid_width && row < self.grid_height
    }

    /// Envelope covered by the whole level.
    pub fn envelope(&self) -> Envelope {
        Envelope::new(
            self.upper_left_x,
            self.upper_left_y - self.grid_height as f64 * self.span_y(),
            self.upper_left_x + self.grid_width as f64 * self.span_x(),
            self.upper_left_y,
        )
    }

    /// Envelope of tile `(col, row)`. Positions outside the grid are not
    /// rejected; they extrapolate the same formula.
    pub fn tile_envelope(&self, col: u32, row: u32) -> Envelope {
        let (span_x, span_y) = (self.span_x(), self.span_y());
        Envelope::new(
            self.upper_left_x + col as f64 * span_x,
            self.upper_left_y - (row as f64 + 1.0) * span_y,
            self.upper_left_x + (col as f64 + 1.0) * span_x,
            self.upper_left_y - row as f64 * span_y,
        )
    }

    pub fn is_missing(&self, col: u32, row: u32) -> bool {
        if !self.contains_position(col, row) {
            return true;
        }
        if let Some(limits) = &self.limits {
            if !limits.contains(col, row) {
                return true;
            }
        }
        match &self.completion {
            Some(bits) => !bits.lock().get(col, row),
            None => false,
        }
    }

    /// Records that tile `(col, row)` has been persisted. Without completion
    /// tracking nothing is recorded, since no tile is ever missing.
    pub fn mark_tile_written(&self, col: u32, row: u32) -> MosaicResult<()> {
        if !self.contains_position(col, row) {
            return Err(MosaicError::OutOfRange(format!(
                "tile ({}, {}) is outside a {}x{} grid",
                col, row, self.grid_width, self.grid_height
            )));
        }
        if let Some(bits) = &self.completion {
            bits.lock().set(col, row)?;
        }
        Ok(())
    }

    /// Snapshot of the completion bits, if tracked.
    pub fn completion(&self) -> Option<CompletionBits> {
        self.completion.as_ref().map(|bits| bits.lock().clone())
    }

    pub fn completion_text(&self) -> Option<String> {
        self.completion.as_ref().map(|bits| bits.lock().to_text())
    }

    /// Grid positions whose tiles cover part of `envelope`, in row-major
    /// order. Tiles are treated as half-open on their right and bottom
    /// edges, so an envelope ending exactly on a tile edge does not pull in
    /// the neighbour.
    pub fn tiles_intersecting(&self, envelope: &Envelope) -> Vec<TilePosition> {
        if !envelope.is_valid() || self.grid_width == 0 || self.grid_height == 0 {
            return Vec::new();
        }
        if !self.envelope().intersects(envelope) {
            return Vec::new();
        }

        let (span_x, span_y) = (self.span_x(), self.span_y());
        let cols = cell_range(
            (envelope.min_x - self.upper_left_x) / span_x,
            (envelope.max_x - self.upper_left_x) / span_x,
            self.grid_width,
        );
        let rows = cell_range(
            (self.upper_left_y - envelope.max_y) / span_y,
            (self.upper_left_y - envelope.min_y) / span_y,
            self.grid_height,
        );

        let mut positions = Vec::with_capacity(cols.len() * rows.len());
        for row in rows {
            for col in cols.clone() {
                positions.push(TilePosition::new(col, row));
            }
        }
        positions
    }
}

impl fmt::Debug for MosaicGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MosaicGrid")
            .field("upper_left", &(self.upper_left_x, self.upper_left_y))
            .field("grid", &(self.grid_width, self.grid_height))
            .field("tile", &(self.tile_width, self.tile_height))
            .field("scale", &(self.scale_x, self.scale_y))
            .field("limits", &self.limits)
            .field("completion", &self.completion.as_ref().map(|bits| bits.lock().count_set()))
            .finish()
    }
}

fn check_scale(scale: f64) -> MosaicResult<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(MosaicError::InvalidArgument(format!(
            "scale {} must be a positive number",
            scale
        )))
    }
}

/// Cells covering `[lo, hi]` in cell units, clamped to `0..count`.
fn cell_range(lo: f64, hi: f64, count: u32) -> std::ops::Range<u32> {
    let last = count as f64 - 1.0;
    let first = lo.floor().clamp(0.0, last);
    let end = (hi.ceil() - 1.0).max(first).clamp(0.0, last);
    first as u32..end as u32 + 1
}
