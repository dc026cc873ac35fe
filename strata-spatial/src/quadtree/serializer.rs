//! Binary node-record stream for quad-trees.
//!
//! Each node is one record, all integers and floats big-endian:
//!
//! ```text
//! i32 node id
//! i32 dimension count (always 2)
//! f64 x dim*2 bounds: min per dimension, then max per dimension
//! i32 child count, then that many i32 child ids
//! i32 entry count, then per entry: i32 blob length + blob
//! ```
//!
//! An entry blob holds `i32 shape id, i32 dimension count, f64 x dim*2`.
//! Records may appear in any order since children are referenced by id;
//! the node with id 0 is the root.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use strata::Envelope;

use super::node::{Node, NodeId, Shape};
use super::tree::QuadTree;
use crate::error::{SpatialError, SpatialResult};

/// Id the root record is stored under.
pub const ROOT_RECORD_ID: i32 = 0;

const DIMENSIONS: usize = Envelope::DIMENSIONS;

const ENTRY_BLOB_LEN: usize = 4 + 4 + DIMENSIONS * 2 * 8;

struct NodeRecord {
    bounds: Envelope,
    children: Vec<i32>,
    shapes: Vec<Shape>,
}

/// Rebuilds a [`QuadTree`] from a node-record stream.
pub struct TreeReader;

impl TreeReader {
    /// Reads node records until the stream ends and replaces the content of
    /// `tree` with them.
    ///
    /// The read is all-or-nothing: on any error `tree` is left exactly as it
    /// was. A record cut off part way through fails with an I/O error of
    /// kind `UnexpectedEof`; structural problems such as a child id that is
    /// never defined fail with [`SpatialError::Malformed`].
    pub fn read<R: Read>(mut reader: R, tree: &mut QuadTree) -> SpatialResult<()> {
        let mut records = HashMap::new();

        while let Some(id) = read_record_id(&mut reader)? {
            let record = read_node_record(&mut reader, id)?;
            if records.insert(id, record).is_some() {
                return Err(SpatialError::Malformed(format!("node id {} is defined twice", id)));
            }
        }

        let total = records.len();
        let (nodes, root) = wire(records)?;
        log::debug!("Read {} quad-tree node records", total);
        tree.install(nodes, root);
        Ok(())
    }

    pub fn read_path(path: &Path, tree: &mut QuadTree) -> SpatialResult<()> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file), tree)
    }

    pub fn read_bytes(bytes: &[u8], tree: &mut QuadTree) -> SpatialResult<()> {
        Self::read(Cursor::new(bytes), tree)
    }
}

/// Writes a [`QuadTree`] as a node-record stream.
///
/// Nodes are renumbered breadth-first so the root is always record 0 and
/// ids stay dense no matter how the arena was reused.
pub struct TreeWriter;

impl TreeWriter {
    pub fn write<W: Write>(tree: &QuadTree, mut writer: W) -> SpatialResult<()> {
        let order = tree.breadth_first();
        if order.is_empty() {
            return Err(SpatialError::InvalidArgument(
                "cannot serialize a tree without a root".into(),
            ));
        }

        let renumbered: HashMap<NodeId, i32> = order
            .iter()
            .enumerate()
            .map(|(pos, &id)| record_id(pos).map(|record| (id, record)))
            .collect::<SpatialResult<_>>()?;

        for &id in &order {
            let node = tree
                .node(id)
                .ok_or_else(|| SpatialError::Malformed(format!("node {} is not live", id)))?;

            writer.write_i32::<BigEndian>(renumbered[&id])?;
            write_envelope(&mut writer, node.bounds())?;

            writer.write_i32::<BigEndian>(count(node.children().len())?)?;
            for child in node.children() {
                writer.write_i32::<BigEndian>(renumbered[child])?;
            }

            writer.write_i32::<BigEndian>(count(node.shape_count())?)?;
            for shape in node.shapes() {
                let shape_id = i32::try_from(shape.id).map_err(|_| {
                    SpatialError::InvalidArgument(format!("shape id {} exceeds int32", shape.id))
                })?;
                writer.write_i32::<BigEndian>(ENTRY_BLOB_LEN as i32)?;
                writer.write_i32::<BigEndian>(shape_id)?;
                write_envelope(&mut writer, &shape.bounds)?;
            }
        }

        writer.flush()?;
        log::debug!("Wrote {} quad-tree node records", order.len());
        Ok(())
    }

    /// Writes the tree to `path`, replacing any existing file.
    pub fn write_path(tree: &QuadTree, path: &Path) -> SpatialResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        Self::write(tree, &mut writer)?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    pub fn to_bytes(tree: &QuadTree) -> SpatialResult<Vec<u8>> {
        let mut bytes = Vec::new();
        Self::write(tree, &mut bytes)?;
        Ok(bytes)
    }
}

/// Reads the leading id of a record, or `None` at a clean end of stream.
fn read_record_id<R: Read>(reader: &mut R) -> SpatialResult<Option<i32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(SpatialError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "node record truncated inside its id",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(i32::from_be_bytes(buf)))
}

fn read_node_record<R: Read>(reader: &mut R, id: i32) -> SpatialResult<NodeRecord> {
    let bounds = read_envelope(reader)
        .map_err(|e| annotate(e, &format!("bounds of node {}", id)))?;

    let child_count = read_count(reader, "child count", id)?;
    let mut children = Vec::with_capacity(child_count.min(4));
    for _ in 0..child_count {
        children.push(reader.read_i32::<BigEndian>()?);
    }

    let entry_count = read_count(reader, "entry count", id)?;
    let mut shapes = Vec::with_capacity(entry_count.min(1024));
    for _ in 0..entry_count {
        let len = read_count(reader, "entry length", id)?;
        if len != ENTRY_BLOB_LEN {
            return Err(SpatialError::Malformed(format!(
                "entry of node {} is {} bytes, expected {}",
                id, len, ENTRY_BLOB_LEN
            )));
        }
        let mut blob = [0u8; ENTRY_BLOB_LEN];
        reader.read_exact(&mut blob)?;
        shapes.push(parse_entry(&blob, id)?);
    }

    Ok(NodeRecord {
        bounds,
        children,
        shapes,
    })
}

fn read_count<R: Read>(reader: &mut R, what: &str, id: i32) -> SpatialResult<usize> {
    let value = reader.read_i32::<BigEndian>()?;
    usize::try_from(value)
        .map_err(|_| SpatialError::Malformed(format!("negative {} {} in node {}", what, value, id)))
}

fn read_envelope<R: Read>(reader: &mut R) -> SpatialResult<Envelope> {
    let dims = reader.read_i32::<BigEndian>()?;
    if dims != DIMENSIONS as i32 {
        return Err(SpatialError::Malformed(format!(
            "unsupported dimension count {}",
            dims
        )));
    }
    let min_x = reader.read_f64::<BigEndian>()?;
    let min_y = reader.read_f64::<BigEndian>()?;
    let max_x = reader.read_f64::<BigEndian>()?;
    let max_y = reader.read_f64::<BigEndian>()?;
    Ok(Envelope::new(min_x, min_y, max_x, max_y))
}

fn write_envelope<W: Write>(writer: &mut W, bounds: &Envelope) -> io::Result<()> {
    writer.write_i32::<BigEndian>(DIMENSIONS as i32)?;
    writer.write_f64::<BigEndian>(bounds.min_x)?;
    writer.write_f64::<BigEndian>(bounds.min_y)?;
    writer.write_f64::<BigEndian>(bounds.max_x)?;
    writer.write_f64::<BigEndian>(bounds.max_y)?;
    Ok(())
}

fn parse_entry(blob: &[u8; ENTRY_BLOB_LEN], node: i32) -> SpatialResult<Shape> {
    let mut cursor = Cursor::new(&blob[..]);
    let raw_id = cursor.read_i32::<BigEndian>()?;
    let id = u32::try_from(raw_id).map_err(|_| {
        SpatialError::Malformed(format!("negative shape id {} in node {}", raw_id, node))
    })?;
    let bounds = read_envelope(&mut cursor)
        .map_err(|e| annotate(e, &format!("entry {} of node {}", id, node)))?;
    Ok(Shape::new(id, bounds))
}

fn annotate(err: SpatialError, context: &str) -> SpatialError {
    match err {
        SpatialError::Malformed(msg) => SpatialError::Malformed(format!("{}: {}", context, msg)),
        other => other,
    }
}

/// Resolves child ids into an arena laid out breadth-first from the root.
fn wire(mut records: HashMap<i32, NodeRecord>) -> SpatialResult<(Vec<Option<Node>>, NodeId)> {
    if !records.contains_key(&ROOT_RECORD_ID) {
        return Err(SpatialError::Malformed(format!(
            "stream has no root record (id {})",
            ROOT_RECORD_ID
        )));
    }

    let mut nodes: Vec<Option<Node>> = Vec::with_capacity(records.len());
    let mut seen = HashSet::from([ROOT_RECORD_ID]);
    let mut queue = VecDeque::from([(ROOT_RECORD_ID, None::<NodeId>)]);

    while let Some((record_id, parent)) = queue.pop_front() {
        let record = records
            .remove(&record_id)
            .ok_or_else(|| SpatialError::Malformed(format!("child id {} is never defined", record_id)))?;

        let arena_id = nodes.len();
        let mut node = Node::new(arena_id, record.bounds, parent);
        for shape in record.shapes {
            node.add_shape(shape);
        }
        nodes.push(Some(node));
        if let Some(parent) = parent {
            if let Some(Some(parent_node)) = nodes.get_mut(parent) {
                parent_node.add_child(arena_id);
            }
        }

        for child in record.children {
            if !seen.insert(child) {
                return Err(SpatialError::Malformed(format!(
                    "node id {} is referenced more than once",
                    child
                )));
            }
            queue.push_back((child, Some(arena_id)));
        }
    }

    if !records.is_empty() {
        log::warn!(
            "Ignoring {} node records unreachable from the root",
            records.len()
        );
    }

    Ok((nodes, 0))
}

fn count(len: usize) -> SpatialResult<i32> {
    i32::try_from(len).map_err(|_| SpatialError::InvalidArgument(format!("count {} exceeds int32", len)))
}

fn record_id(pos: usize) -> SpatialResult<i32> {
    i32::try_from(pos).map_err(|_| SpatialError::InvalidArgument(format!("node {} exceeds int32", pos)))
}
