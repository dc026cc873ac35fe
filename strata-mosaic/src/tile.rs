//! Tile handles and the source abstraction the scheduler fetches through.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata::Hints;

use crate::error::MosaicResult;
use crate::grid::TilePosition;

/// Opaque reference to the raw bytes of one tile. Pixel data is never
/// decoded.
#[derive(Debug, Clone)]
pub struct TileHandle {
    position: TilePosition,
    body: TileBody,
}

#[derive(Debug, Clone)]
enum TileBody {
    File { path: PathBuf, offset: u64, length: u64 },
    Memory(Arc<[u8]>),
}

impl TileHandle {
    /// Bytes `offset..offset + length` of the file at `path`.
    pub fn file_range(position: TilePosition, path: impl Into<PathBuf>, offset: u64, length: u64) -> Self {
        Self {
            position,
            body: TileBody::File {
                path: path.into(),
                offset,
                length,
            },
        }
    }

    /// Tile bytes already held in memory, e.g. fetched from a remote service.
    pub fn from_bytes(position: TilePosition, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            position,
            body: TileBody::Memory(bytes.into()),
        }
    }

    pub fn position(&self) -> TilePosition {
        self.position
    }

    pub fn len(&self) -> u64 {
        match &self.body {
            TileBody::File { length, .. } => *length,
            TileBody::Memory(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backing file, when the tile lives on disk.
    pub fn path(&self) -> Option<&Path> {
        match &self.body {
            TileBody::File { path, .. } => Some(path),
            TileBody::Memory(_) => None,
        }
    }

    /// Opens a stream over the tile bytes.
    pub fn open(&self) -> MosaicResult<Box<dyn Read + Send>> {
        match &self.body {
            TileBody::File {
                path,
                offset,
                length,
            } => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(*offset))?;
                Ok(Box::new(file.take(*length)))
            }
            TileBody::Memory(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }

    /// Reads the whole tile. A backing file shorter than the recorded range
    /// fails with an `UnexpectedEof` I/O error.
    pub fn read_bytes(&self) -> MosaicResult<Vec<u8>> {
        match &self.body {
            TileBody::File {
                path,
                offset,
                length,
            } => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(*offset))?;
                let mut bytes = vec![0u8; *length as usize];
                file.read_exact(&mut bytes)?;
                Ok(bytes)
            }
            TileBody::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// Outcome of looking up a single tile.
#[derive(Debug, Clone)]
pub enum TileFetch {
    /// The level does not have this tile. Not an error.
    Missing,
    Present(TileHandle),
}

impl TileFetch {
    pub fn is_missing(&self) -> bool {
        matches!(self, TileFetch::Missing)
    }

    pub fn handle(&self) -> Option<&TileHandle> {
        match self {
            TileFetch::Missing => None,
            TileFetch::Present(handle) => Some(handle),
        }
    }
}

/// Something tiles can be fetched from concurrently.
///
/// `hints` are handed through untouched; local stores ignore them while
/// remote sources may use them for request tuning.
pub trait TileSource: Send + Sync {
    fn fetch_tile(&self, level: &str, position: TilePosition, hints: &Hints) -> MosaicResult<TileFetch>;
}
