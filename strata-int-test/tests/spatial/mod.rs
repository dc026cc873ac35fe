//! Spatial integration test module.
//!
//! These tests drive the record index and the quad-tree through files on
//! disk, the way a shapefile reader uses them.

mod index_file_test;
mod quadtree_test;
