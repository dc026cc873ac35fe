//! SpatialTree trait definition for thread-safe spatial indexes.

use strata::Envelope;

use crate::error::SpatialResult;
use crate::quadtree::{Shape, ShapeId};

/// A spatial index that can be shared between threads.
///
/// Searches are bounding-box only: an id is returned when its indexed
/// bounds intersect the query, and exact geometry tests are left to the
/// caller.
pub trait SpatialTree: Send + Sync {
    /// Adds a shape to the index.
    fn insert(&self, shape: Shape) -> SpatialResult<()>;

    /// Removes a shape, matched on both id and bounds.
    fn delete(&self, shape: &Shape) -> SpatialResult<bool>;

    /// Finds the ids whose bounds intersect `query`.
    fn search(&self, query: &Envelope) -> SpatialResult<Vec<ShapeId>>;

    /// Gets the number of indexed shapes.
    fn size(&self) -> usize;

    /// Clears all shapes from the index.
    fn clear(&self) -> SpatialResult<()>;
}
