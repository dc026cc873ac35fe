//! Packed tile layout: every tile of a level appended to `tiles.dat`, with
//! a `tiles.shx` record index holding one `(offset, length)` pair per grid
//! cell in row-major order.
//!
//! Each `tiles.dat` record is a big-endian `u32` payload length, the
//! payload, and a zero pad byte when needed to end on a 16-bit word. A
//! zero-length index record means the tile was never written. Rewriting a
//! tile appends a new record and repoints the index; the old bytes stay
//! in `tiles.dat` unreferenced.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use strata_spatial::index_file::{patch_record, IndexOpenOptions, IndexRecordStore, IndexRecordWriter};

use crate::error::{MosaicError, MosaicResult};
use crate::grid::{MosaicGrid, TilePosition};
use crate::tile::{TileFetch, TileHandle};

pub const PACKED_DATA_FILE: &str = "tiles.dat";
pub const PACKED_INDEX_FILE: &str = "tiles.shx";

/// Shape type written to the index header; tiles carry no geometry.
const NULL_SHAPE_TYPE: i32 = 0;

const LENGTH_PREFIX: u64 = 4;

/// Creates the data file and an index with an empty record per cell,
/// leaving existing files alone.
pub(crate) fn init_level(dir: &Path, grid: &MosaicGrid) -> MosaicResult<()> {
    fs::create_dir_all(dir)?;

    let index_path = dir.join(PACKED_INDEX_FILE);
    if !index_path.exists() {
        let mut writer = IndexRecordWriter::create(&index_path)?;
        for _ in 0..grid.tile_count() {
            writer.append(0, 0);
        }
        let file = writer.finish(NULL_SHAPE_TYPE, grid.envelope())?;
        file.get_ref().sync_all()?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(PACKED_DATA_FILE))?;
    Ok(())
}

/// Appends `bytes` as the tile at `position` and points its index record at
/// them. Both files are synced before returning.
pub(crate) fn append_tile(dir: &Path, grid: &MosaicGrid, position: TilePosition, bytes: &[u8]) -> MosaicResult<()> {
    let payload_len = u32::try_from(bytes.len()).map_err(|_| {
        MosaicError::InvalidArgument(format!("tile of {} bytes is too large", bytes.len()))
    })?;

    let mut data = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(PACKED_DATA_FILE))?;
    let mut start = data.metadata()?.len();
    if start % 2 != 0 {
        // a torn earlier append; realign before writing
        data.write_all(&[0])?;
        start += 1;
    }

    let pad = bytes.len() % 2;
    let mut record = Vec::with_capacity(LENGTH_PREFIX as usize + bytes.len() + pad);
    record.write_u32::<BigEndian>(payload_len)?;
    record.extend_from_slice(bytes);
    record.resize(record.len() + pad, 0);
    data.write_all(&record)?;
    data.sync_all()?;

    let offset_words = u32::try_from(start / 2).map_err(|_| {
        MosaicError::Unsupported(format!("packed tile file {} is full", dir.display()))
    })?;
    let length_words = (record.len() / 2) as u32;

    let mut index = OpenOptions::new()
        .read(true)
        .write(true)
        .open(dir.join(PACKED_INDEX_FILE))?;
    patch_record(&mut index, cell_index(grid, position), offset_words, length_words)?;
    index.sync_all()?;
    Ok(())
}

/// Resolves the byte range of the tile at `position`.
pub(crate) fn lookup(dir: &Path, grid: &MosaicGrid, position: TilePosition) -> MosaicResult<TileFetch> {
    let mut index = IndexRecordStore::open(dir.join(PACKED_INDEX_FILE), IndexOpenOptions::buffered(1))?;
    let record = index.get_record(cell_index(grid, position))?;
    index.close();

    if record.length == 0 {
        return Ok(TileFetch::Missing);
    }

    let data_path = dir.join(PACKED_DATA_FILE);
    let mut data = File::open(&data_path)?;
    data.seek(SeekFrom::Start(record.offset_in_bytes()))?;
    let payload_len = data.read_u32::<BigEndian>()? as u64;
    if LENGTH_PREFIX + payload_len > record.length_in_bytes() {
        return Err(MosaicError::Malformed(format!(
            "tile {} claims {} bytes in a {} byte record",
            position,
            payload_len,
            record.length_in_bytes()
        )));
    }

    Ok(TileFetch::Present(TileHandle::file_range(
        position,
        data_path,
        record.offset_in_bytes() + LENGTH_PREFIX,
        payload_len,
    )))
}

fn cell_index(grid: &MosaicGrid, position: TilePosition) -> usize {
    position.row as usize * grid.grid_width() as usize + position.col as usize
}
