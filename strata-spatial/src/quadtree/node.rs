//! Quad-tree node model.

use strata::Envelope;

/// Arena index of a node; doubles as the node id.
pub type NodeId = usize;

/// Record id stored at the leaves, referring into an external record store.
pub type ShapeId = u32;

/// Initial number of shape slots allocated for a node.
pub(crate) const INITIAL_SLOTS: usize = 4;

/// A record id together with the bounding box it was indexed under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    pub id: ShapeId,
    pub bounds: Envelope,
}

impl Shape {
    pub fn new(id: ShapeId, bounds: Envelope) -> Self {
        Self { id, bounds }
    }
}

/// A node of the quad-tree.
///
/// Shape slots grow by doubling. Slots `0..shape_count()` are occupied and
/// every slot after them is `None`, so the occupied count is tracked apart
/// from the slot capacity.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    bounds: Envelope,
    children: Vec<NodeId>,
    slots: Vec<Option<Shape>>,
    occupied: usize,
    parent: Option<NodeId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, bounds: Envelope, parent: Option<NodeId>) -> Self {
        Self {
            id,
            bounds,
            children: Vec::new(),
            slots: Vec::new(),
            occupied: 0,
            parent,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn bounds(&self) -> &Envelope {
        &self.bounds
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn shape_count(&self) -> usize {
        self.occupied
    }

    pub fn slot_capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.slots[..self.occupied].iter().flatten()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// No shapes and no children.
    pub fn is_vacant(&self) -> bool {
        self.occupied == 0 && self.children.is_empty()
    }

    pub(crate) fn set_bounds(&mut self, bounds: Envelope) {
        self.bounds = bounds;
    }

    pub(crate) fn expand_bounds(&mut self, bounds: &Envelope) {
        self.bounds.expand_to_include(bounds);
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub(crate) fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    pub(crate) fn remove_child(&mut self, child: NodeId) -> bool {
        match self.children.iter().position(|&c| c == child) {
            Some(pos) => {
                self.children.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn add_shape(&mut self, shape: Shape) {
        if self.occupied == self.slots.len() {
            let capacity = (self.slots.len() * 2).max(INITIAL_SLOTS);
            self.slots.resize(capacity, None);
        }
        self.slots[self.occupied] = Some(shape);
        self.occupied += 1;
    }

    /// Removes the shape with `id` and `bounds`, keeping occupied slots packed.
    pub(crate) fn remove_shape(&mut self, shape: &Shape) -> bool {
        let found = self.slots[..self.occupied]
            .iter()
            .position(|slot| slot.as_ref() == Some(shape));

        match found {
            Some(pos) => {
                let last = self.occupied - 1;
                self.slots.swap(pos, last);
                self.slots[last] = None;
                self.occupied = last;
                true
            }
            None => false,
        }
    }

    /// Empties the node's slots, returning the shapes that were stored.
    pub(crate) fn take_shapes(&mut self) -> Vec<Shape> {
        let shapes = self.slots.drain(..self.occupied).flatten().collect();
        self.slots.clear();
        self.occupied = 0;
        shapes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(id: ShapeId) -> Shape {
        Shape::new(id, Envelope::point(id as f64, id as f64))
    }

    #[test]
    fn test_slots_grow_by_doubling() {
        let mut node = Node::new(0, Envelope::empty(), None);
        assert_eq!(node.slot_capacity(), 0);

        node.add_shape(shape(1));
        assert_eq!(node.slot_capacity(), INITIAL_SLOTS);

        for id in 2..=5 {
            node.add_shape(shape(id));
        }
        assert_eq!(node.shape_count(), 5);
        assert_eq!(node.slot_capacity(), INITIAL_SLOTS * 2);

        for id in 6..=9 {
            node.add_shape(shape(id));
        }
        assert_eq!(node.slot_capacity(), INITIAL_SLOTS * 4);
    }

    #[test]
    fn test_remove_keeps_slots_packed() {
        let mut node = Node::new(0, Envelope::empty(), None);
        for id in 1..=5 {
            node.add_shape(shape(id));
        }

        assert!(node.remove_shape(&shape(2)));
        assert!(!node.remove_shape(&shape(2)));
        assert_eq!(node.shape_count(), 4);

        let ids: Vec<_> = node.shapes().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 5, 3, 4]);
        // everything past the occupied prefix is an empty slot
        assert_eq!(node.slots.iter().filter(|s| s.is_none()).count(), node.slot_capacity() - 4);
    }

    #[test]
    fn test_remove_requires_matching_bounds() {
        let mut node = Node::new(0, Envelope::empty(), None);
        node.add_shape(shape(7));
        assert!(!node.remove_shape(&Shape::new(7, Envelope::point(0.0, 0.0))));
        assert!(node.remove_shape(&shape(7)));
        assert!(node.is_vacant());
    }

    #[test]
    fn test_take_shapes() {
        let mut node = Node::new(3, Envelope::empty(), Some(0));
        node.add_shape(shape(1));
        node.add_shape(shape(2));
        let taken = node.take_shapes();
        assert_eq!(taken.len(), 2);
        assert_eq!(node.shape_count(), 0);
        assert_eq!(node.parent(), Some(0));
        assert_eq!(node.id(), 3);
    }

    #[test]
    fn test_children() {
        let mut node = Node::new(0, Envelope::empty(), None);
        node.add_child(4);
        node.add_child(9);
        assert!(!node.is_leaf());
        assert!(node.remove_child(4));
        assert!(!node.remove_child(4));
        assert_eq!(node.children(), &[9]);
    }
}
