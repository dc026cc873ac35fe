//! # Strata Spatial - spatial indexing for strata
//!
//! Two building blocks for locating records by area:
//!
//! - **Record index files**: random access to the `(offset, length)` table
//!   of a shapefile-style `.shx` file, memory-mapped or through a small
//!   scrolling buffer
//! - **Quad-tree**: an in-memory tree of record ids keyed by bounding box,
//!   with insert, search and delete, plus a binary node-record format to
//!   persist it
//!
//! Searches are bounding-box only. The index never looks at the geometry
//! behind an id.
//!
//! ## Quad-tree
//!
//! ```rust
//! use strata::Envelope;
//! use strata_spatial::{QuadTree, Shape, TreeReader, TreeWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tree = QuadTree::new();
//! for id in 0..100u32 {
//!     let x = (id % 10) as f64;
//!     let y = (id / 10) as f64;
//!     tree.insert(Shape::new(id, Envelope::point(x, y)))?;
//! }
//!
//! let hits = tree.search(&Envelope::new(2.5, 2.5, 4.5, 4.5))?;
//! assert_eq!(hits.len(), 4);
//!
//! let bytes = TreeWriter::to_bytes(&tree)?;
//! let mut copy = QuadTree::new();
//! TreeReader::read_bytes(&bytes, &mut copy)?;
//! assert_eq!(copy.len(), 100);
//! # Ok(())
//! # }
//! ```
//!
//! ## Record index
//!
//! ```rust,no_run
//! use std::path::Path;
//! use strata_spatial::{IndexOpenOptions, IndexRecordStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = IndexRecordStore::open(Path::new("roads.shx"), IndexOpenOptions::default())?;
//! for i in 0..store.record_count() {
//!     let record = store.get_record(i)?;
//!     println!("{} at byte {}", record.record_id, record.offset_in_bytes());
//! }
//! store.close();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod index_file;
pub mod quadtree;
pub mod spatial_tree;

pub use error::{SpatialError, SpatialResult};
pub use index_file::{
    IndexHeader, IndexOpenOptions, IndexRecord, IndexRecordStore, IndexRecordWriter, IndexSource,
    ReadStrategy,
};
pub use quadtree::{
    QuadTree, QuadTreeConfig, SharedQuadTree, Shape, ShapeId, TreeReader, TreeStats, TreeWriter,
};
pub use spatial_tree::SpatialTree;
