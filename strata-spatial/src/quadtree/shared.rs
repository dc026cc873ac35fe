//! Reader-writer locked quad-tree handle.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use strata::Envelope;

use super::config::QuadTreeConfig;
use super::node::{Shape, ShapeId};
use super::serializer::{TreeReader, TreeWriter};
use super::tree::{QuadTree, TreeStats};
use crate::error::SpatialResult;
use crate::spatial_tree::SpatialTree;

/// Cloneable, thread-safe handle around a [`QuadTree`].
///
/// Mutations take the write lock, searches share the read lock. Loading a
/// serialized tree builds it off to the side and swaps it in under the
/// write lock, so readers see either the old tree or the new one.
#[derive(Clone)]
pub struct SharedQuadTree {
    inner: Arc<RwLock<QuadTree>>,
}

impl SharedQuadTree {
    pub fn new(tree: QuadTree) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    pub fn with_config(config: QuadTreeConfig) -> SpatialResult<Self> {
        Ok(Self::new(QuadTree::with_config(config)?))
    }

    /// Opens a tree previously written with [`save`](Self::save).
    pub fn open(path: &Path, config: QuadTreeConfig) -> SpatialResult<Self> {
        let mut tree = QuadTree::unrooted(config)?;
        TreeReader::read_path(path, &mut tree)?;
        log::info!("Opened quad-tree index {} with {} shapes", path.display(), tree.len());
        Ok(Self::new(tree))
    }

    /// Replaces the current content with a serialized tree from `path`.
    pub fn reload(&self, path: &Path) -> SpatialResult<()> {
        let mut fresh = QuadTree::unrooted(*self.inner.read().config())?;
        TreeReader::read_path(path, &mut fresh)?;
        *self.inner.write() = fresh;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> SpatialResult<()> {
        let tree = self.inner.read();
        TreeWriter::write_path(&tree, path)?;
        log::info!("Saved quad-tree index {} with {} shapes", path.display(), tree.len());
        Ok(())
    }

    pub fn stats(&self) -> TreeStats {
        self.inner.read().stats()
    }

    pub fn bounds(&self) -> Option<Envelope> {
        self.inner.read().bounds()
    }
}

impl SpatialTree for SharedQuadTree {
    fn insert(&self, shape: Shape) -> SpatialResult<()> {
        self.inner.write().insert(shape)
    }

    fn delete(&self, shape: &Shape) -> SpatialResult<bool> {
        self.inner.write().delete(shape)
    }

    fn search(&self, query: &Envelope) -> SpatialResult<Vec<ShapeId>> {
        self.inner.read().search(query)
    }

    fn size(&self) -> usize {
        self.inner.read().len()
    }

    fn clear(&self) -> SpatialResult<()> {
        self.inner.write().clear();
        Ok(())
    }
}
