use crate::error::{SpatialError, SpatialResult};

/// Shapes a leaf holds before it tries to split
pub const DEFAULT_NODE_CAPACITY: usize = 8;

/// Deepest level a node can be created at (the root is depth 1)
pub const DEFAULT_MAX_DEPTH: usize = 12;

/// Tuning knobs for [`QuadTree`](super::QuadTree) construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadTreeConfig {
    pub node_capacity: usize,
    pub max_depth: usize,
}

impl QuadTreeConfig {
    pub fn new() -> Self {
        Self {
            node_capacity: DEFAULT_NODE_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_node_capacity(mut self, node_capacity: usize) -> Self {
        self.node_capacity = node_capacity;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.node_capacity == 0 {
            return Err(SpatialError::InvalidArgument(
                "node capacity must be at least 1".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(SpatialError::InvalidArgument(
                "max depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}
