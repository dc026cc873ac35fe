//! In-memory quad-tree over shape ids and their bounding boxes, with a
//! binary node-record format for persisting it.

pub mod config;
pub mod node;
pub mod serializer;
pub mod shared;
pub mod tree;

pub use config::{QuadTreeConfig, DEFAULT_MAX_DEPTH, DEFAULT_NODE_CAPACITY};
pub use node::{Node, NodeId, Shape, ShapeId};
pub use serializer::{TreeReader, TreeWriter, ROOT_RECORD_ID};
pub use shared::SharedQuadTree;
pub use tree::{QuadTree, TreeStats};
