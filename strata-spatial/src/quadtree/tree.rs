//! Arena-backed quad-tree.
//!
//! Nodes live in a `Vec` addressed by [`NodeId`]; parent and child links are
//! plain indices, so the tree owns the whole node graph and no node owns
//! another.
//!
//! # Placement policy
//!
//! A shape descends from the root into an existing child whose bounds fully
//! contain it. When several children qualify the one with the smallest area
//! wins, and remaining ties go to the child listed first. Under a node that
//! has already split, a missing quadrant is created on demand when the
//! shape fits in it and it does not overlap an existing child. A shape that
//! fits nowhere deeper is stored at the node it reached, so shapes
//! straddling a split line stay at the parent and are never duplicated.
//!
//! A leaf holding more than `node_capacity` shapes splits into quadrants of
//! its bounds (see [`Envelope::quadrants`]); each shape moves to the first
//! quadrant, in that order, that fully contains it. The root is squared off
//! before it splits.
//!
//! # Root growth
//!
//! While the root is a leaf its bounds simply expand to cover each new
//! shape. Once it has split, a shape outside the root makes the tree grow
//! upward instead: a new root twice the old side, extended toward the shape,
//! takes the old root as one of its quadrants. Existing children never
//! change bounds, so shapes keep descending instead of piling up at the
//! root. `max_depth` limits splitting counted from the current root, so
//! nodes created before a growth step can sit deeper than that.

use std::collections::VecDeque;

use strata::Envelope;

use super::config::QuadTreeConfig;
use super::node::{Node, NodeId, Shape, ShapeId};
use crate::error::{SpatialError, SpatialResult};

/// Summary counters for a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    pub node_count: usize,
    pub entry_count: usize,
    /// Number of levels; 1 for a lone root, 0 without a root
    pub depth: usize,
}

/// Quad-tree spatial index over record ids and their bounding boxes.
///
/// Searching is bounding-box only: the tree never looks at the geometry the
/// ids refer to, so exact filtering is up to the caller.
///
/// # Example
///
/// ```rust
/// use strata::Envelope;
/// use strata_spatial::quadtree::{QuadTree, Shape};
///
/// let mut tree = QuadTree::new();
/// tree.insert(Shape::new(1, Envelope::new(0.0, 0.0, 1.0, 1.0))).unwrap();
/// tree.insert(Shape::new(2, Envelope::new(5.0, 5.0, 6.0, 6.0))).unwrap();
///
/// let hits = tree.search(&Envelope::new(-1.0, -1.0, 2.0, 2.0)).unwrap();
/// assert_eq!(hits, vec![1]);
/// ```
#[derive(Debug, Clone)]
pub struct QuadTree {
    config: QuadTreeConfig,
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    len: usize,
}

impl QuadTree {
    /// Creates an empty tree with the default configuration.
    pub fn new() -> Self {
        Self::rooted(QuadTreeConfig::default(), Envelope::empty())
    }

    pub fn with_config(config: QuadTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        Ok(Self::rooted(config, Envelope::empty()))
    }

    /// Creates an empty tree whose root starts out covering `extent`.
    ///
    /// Seeding the root with the dataset extent lets the first split use
    /// quadrants of the whole area rather than of the first few shapes.
    pub fn with_extent(config: QuadTreeConfig, extent: Envelope) -> SpatialResult<Self> {
        config.validate()?;
        validate_bounds(&extent, "extent")?;
        Ok(Self::rooted(config, extent))
    }

    /// Creates a tree without a root. Every operation fails on it until a
    /// root is installed, typically by reading a serialized tree.
    pub fn unrooted(config: QuadTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        })
    }

    fn rooted(config: QuadTreeConfig, bounds: Envelope) -> Self {
        let mut tree = Self {
            config,
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        };
        tree.root = Some(tree.allocate(bounds, None));
        tree
    }

    pub fn config(&self) -> &QuadTreeConfig {
        &self.config
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(|slot| slot.as_ref())
    }

    /// Number of shapes stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bounds of the root node, if there is one.
    pub fn bounds(&self) -> Option<Envelope> {
        self.root.map(|root| *self.node_ref(root).bounds())
    }

    pub fn insert(&mut self, shape: Shape) -> SpatialResult<()> {
        let root = self.require_root()?;
        validate_bounds(&shape.bounds, "shape")?;

        let root = if self.node_ref(root).is_leaf() {
            self.node_mut(root).expand_bounds(&shape.bounds);
            root
        } else {
            self.grow_root(root, &shape.bounds)
        };

        let mut current = root;
        let mut depth = 1;
        while let Some(child) = self.choose_child(current, &shape.bounds, depth) {
            current = child;
            depth += 1;
        }

        self.node_mut(current).add_shape(shape);
        self.len += 1;
        self.split_if_needed(current, depth);
        Ok(())
    }

    /// Ids of every shape whose bounds intersect `query`.
    pub fn search(&self, query: &Envelope) -> SpatialResult<Vec<ShapeId>> {
        let mut results = Vec::new();
        self.search_into(query, &mut results)?;
        Ok(results)
    }

    /// Appends the ids of every shape whose bounds intersect `query`.
    pub fn search_into(&self, query: &Envelope, results: &mut Vec<ShapeId>) -> SpatialResult<()> {
        let root = self.require_root()?;
        validate_bounds(query, "query")?;

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node_ref(id);
            if !node.bounds().intersects(query) {
                continue;
            }
            results.extend(
                node.shapes()
                    .filter(|shape| shape.bounds.intersects(query))
                    .map(|shape| shape.id),
            );
            stack.extend(node.children().iter().rev());
        }
        Ok(())
    }

    /// Removes `shape` (matched on id and bounds). Nodes left with neither
    /// shapes nor children are pruned from their parents, bottom-up.
    pub fn delete(&mut self, shape: &Shape) -> SpatialResult<bool> {
        let root = self.require_root()?;
        validate_bounds(&shape.bounds, "shape")?;

        let Some(holder) = self.find_holder(root, shape) else {
            return Ok(false);
        };

        self.node_mut(holder).remove_shape(shape);
        self.len -= 1;
        self.prune(holder);
        Ok(true)
    }

    /// Drops every shape, leaving a fresh empty root.
    pub fn clear(&mut self) {
        *self = Self::rooted(self.config, Envelope::empty());
    }

    pub fn stats(&self) -> TreeStats {
        let Some(root) = self.root else {
            return TreeStats::default();
        };

        let mut node_count = 0;
        let mut depth = 0;
        let mut queue = VecDeque::from([(root, 1usize)]);
        while let Some((id, level)) = queue.pop_front() {
            node_count += 1;
            depth = depth.max(level);
            for &child in self.node_ref(id).children() {
                queue.push_back((child, level + 1));
            }
        }

        TreeStats {
            node_count,
            entry_count: self.len,
            depth,
        }
    }

    /// Node ids reachable from the root, breadth-first, root first.
    pub fn breadth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let Some(root) = self.root else {
            return order;
        };

        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.node_ref(id).children().iter().copied());
        }
        order
    }

    /// Verifies the structural invariants: every node's bounds contain its
    /// children and shapes, and every child points back at the parent
    /// listing it.
    pub fn check_invariants(&self) -> SpatialResult<()> {
        for id in self.breadth_first() {
            let node = self.node_ref(id);
            for shape in node.shapes() {
                if !node.bounds().contains(&shape.bounds) {
                    return Err(SpatialError::Malformed(format!(
                        "node {} does not contain shape {}",
                        id, shape.id
                    )));
                }
            }
            for &child in node.children() {
                let child_node = self.node_ref(child);
                if child_node.parent() != Some(id) {
                    return Err(SpatialError::Malformed(format!(
                        "node {} lists child {} whose parent is {:?}",
                        id,
                        child,
                        child_node.parent()
                    )));
                }
                if !child_node.bounds().is_empty() && !node.bounds().contains(child_node.bounds()) {
                    return Err(SpatialError::Malformed(format!(
                        "node {} does not contain child {}",
                        id, child
                    )));
                }
            }
        }
        Ok(())
    }

    /// Swaps in a fully wired node arena.
    pub(crate) fn install(&mut self, nodes: Vec<Option<Node>>, root: NodeId) {
        self.len = nodes.iter().flatten().map(Node::shape_count).sum();
        self.nodes = nodes;
        self.free.clear();
        self.root = Some(root);
    }

    fn require_root(&self) -> SpatialResult<NodeId> {
        self.root
            .ok_or_else(|| SpatialError::InvalidArgument("tree has no root".into()))
    }

    fn node_ref(&self, id: NodeId) -> &Node {
        match self.nodes.get(id) {
            Some(Some(node)) => node,
            _ => panic!("quad-tree node {} is not live", id),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id) {
            Some(Some(node)) => node,
            _ => panic!("quad-tree node {} is not live", id),
        }
    }

    fn allocate(&mut self, bounds: Envelope, parent: Option<NodeId>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(Node::new(id, bounds, parent));
                id
            }
            None => {
                let id = self.nodes.len();
                self.nodes.push(Some(Node::new(id, bounds, parent)));
                id
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = None;
        self.free.push(id);
    }

    fn attach_child(&mut self, parent: NodeId, bounds: Envelope) -> NodeId {
        let child = self.allocate(bounds, Some(parent));
        self.node_mut(parent).add_child(child);
        child
    }

    /// Adds roots above `root` until one contains `bounds`, returning the
    /// new root.
    fn grow_root(&mut self, mut root: NodeId, bounds: &Envelope) -> NodeId {
        loop {
            let old = *self.node_ref(root).bounds();
            if old.contains(bounds) {
                return root;
            }

            let side = old.width().max(old.height());
            let step = if side > 0.0 {
                side
            } else {
                // a point-sized root: reach the shape in one step
                [
                    old.min_x - bounds.min_x,
                    bounds.max_x - old.max_x,
                    old.min_y - bounds.min_y,
                    bounds.max_y - old.max_y,
                ]
                .into_iter()
                .fold(0.0, f64::max)
            };

            let (min_x, max_x) = if bounds.min_x < old.min_x {
                (old.min_x - step, old.max_x)
            } else {
                (old.min_x, old.max_x + step)
            };
            let (min_y, max_y) = if bounds.min_y < old.min_y {
                (old.min_y - step, old.max_y)
            } else {
                (old.min_y, old.max_y + step)
            };

            let grown = self.allocate(Envelope::new(min_x, min_y, max_x, max_y), None);
            self.node_mut(grown).add_child(root);
            self.node_mut(root).set_parent(Some(grown));
            self.root = Some(grown);
            log::debug!("Grew quad-tree root {} into new root {}", root, grown);
            root = grown;
        }
    }

    /// Picks the child `bounds` should descend into, creating a missing
    /// quadrant when the node has already split.
    fn choose_child(&mut self, id: NodeId, bounds: &Envelope, depth: usize) -> Option<NodeId> {
        let node = self.node_ref(id);

        let mut best: Option<(NodeId, f64)> = None;
        for &child in node.children() {
            let child_bounds = self.node_ref(child).bounds();
            if child_bounds.contains(bounds) {
                let area = child_bounds.area();
                if best.map_or(true, |(_, best_area)| area < best_area) {
                    best = Some((child, area));
                }
            }
        }
        if let Some((child, _)) = best {
            return Some(child);
        }

        if node.is_leaf() || depth >= self.config.max_depth {
            return None;
        }

        let quadrant = node
            .bounds()
            .quadrants()
            .into_iter()
            .find(|quadrant| quadrant.contains(bounds))?;
        let blocked = node
            .children()
            .iter()
            .any(|&child| overlaps_interior(self.node_ref(child).bounds(), &quadrant));
        if blocked {
            return None;
        }

        Some(self.attach_child(id, quadrant))
    }

    fn split_if_needed(&mut self, id: NodeId, depth: usize) {
        let node = self.node_ref(id);
        if !node.is_leaf()
            || node.shape_count() <= self.config.node_capacity
            || depth >= self.config.max_depth
        {
            return;
        }

        if node.parent().is_none() {
            let squared = square_up(node.bounds());
            self.node_mut(id).set_bounds(squared);
        }

        let quadrants = self.node_ref(id).bounds().quadrants();
        let shapes = self.node_mut(id).take_shapes();
        let mut cells: [Option<NodeId>; 4] = [None; 4];

        for shape in shapes {
            match quadrants.iter().position(|q| q.contains(&shape.bounds)) {
                Some(cell) => {
                    let child = match cells[cell] {
                        Some(child) => child,
                        None => {
                            let child = self.attach_child(id, quadrants[cell]);
                            cells[cell] = Some(child);
                            child
                        }
                    };
                    self.node_mut(child).add_shape(shape);
                }
                None => self.node_mut(id).add_shape(shape),
            }
        }

        log::debug!(
            "Split quad-tree node {} at depth {} into {} children",
            id,
            depth,
            cells.iter().flatten().count()
        );

        for child in cells.into_iter().flatten() {
            self.split_if_needed(child, depth + 1);
        }
    }

    fn find_holder(&self, root: NodeId, shape: &Shape) -> Option<NodeId> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node_ref(id);
            if !node.bounds().contains(&shape.bounds) {
                continue;
            }
            if node.shapes().any(|stored| stored == shape) {
                return Some(id);
            }
            stack.extend(node.children().iter().rev());
        }
        None
    }

    fn prune(&mut self, mut id: NodeId) {
        loop {
            let node = self.node_ref(id);
            if !node.is_vacant() {
                return;
            }
            match node.parent() {
                Some(parent) => {
                    self.node_mut(parent).remove_child(id);
                    self.release(id);
                    log::trace!("Pruned empty quad-tree node {}", id);
                    id = parent;
                }
                None => {
                    self.node_mut(id).set_bounds(Envelope::empty());
                    return;
                }
            }
        }
    }
}

impl Default for QuadTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects envelopes with NaN coordinates or min > max.
pub(crate) fn validate_bounds(bounds: &Envelope, what: &str) -> SpatialResult<()> {
    if bounds.is_valid() {
        Ok(())
    } else {
        Err(SpatialError::InvalidArgument(format!(
            "{} bounds {} are empty or not a number",
            what, bounds
        )))
    }
}

/// Relative slack under which two boxes only touch.
const OVERLAP_SLACK: f64 = 1e-9;

/// True when `a` and `b` share more than a rounding sliver of area.
fn overlaps_interior(a: &Envelope, b: &Envelope) -> bool {
    let slack_x = OVERLAP_SLACK * a.width().max(b.width());
    let slack_y = OVERLAP_SLACK * a.height().max(b.height());
    a.min_x.max(b.min_x) + slack_x < a.max_x.min(b.max_x)
        && a.min_y.max(b.min_y) + slack_y < a.max_y.min(b.max_y)
}

/// Smallest square anchored at the lower corner of `bounds` that still
/// contains it.
fn square_up(bounds: &Envelope) -> Envelope {
    let side = bounds.width().max(bounds.height());
    Envelope::new(
        bounds.min_x,
        bounds.min_y,
        (bounds.min_x + side).max(bounds.max_x),
        (bounds.min_y + side).max(bounds.max_y),
    )
}
