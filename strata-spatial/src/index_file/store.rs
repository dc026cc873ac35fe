//! Random-access reader for shapefile-style `(offset, length)` index files.
//!
//! Two strategies back the reader:
//! - memory mapping (or owning the whole byte buffer), giving O(1) access
//!   to every record
//! - a small scrolling buffer covering a window of records, refilled from
//!   the underlying stream whenever a record outside the window is requested
//!
//! The buffered strategy mutates its window on reads, so the store is not
//! `Sync`; concurrent readers each open their own store.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};
use memmap2::Mmap;

use super::header::{IndexHeader, HEADER_SIZE, RECORD_SIZE};
use crate::error::{SpatialError, SpatialResult};

/// Default number of records held by the scrolling buffer
pub const DEFAULT_BUFFER_RECORDS: usize = 2000;

/// Readable, seekable byte stream an index can be opened from.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Where an index file is read from.
pub enum IndexSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Reader(Box<dyn ReadSeek>),
}

impl IndexSource {
    pub fn reader<R: ReadSeek + 'static>(reader: R) -> Self {
        IndexSource::Reader(Box::new(reader))
    }
}

impl From<&Path> for IndexSource {
    fn from(path: &Path) -> Self {
        IndexSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for IndexSource {
    fn from(path: PathBuf) -> Self {
        IndexSource::Path(path)
    }
}

impl From<Vec<u8>> for IndexSource {
    fn from(bytes: Vec<u8>) -> Self {
        IndexSource::Bytes(bytes)
    }
}

/// How records are fetched once the header has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Map (or fully load) the file and index into it directly
    MemoryMapped,
    /// Keep a scrolling window of records and refill it on demand
    Buffered,
}

/// Options controlling how an index is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOpenOptions {
    pub strategy: ReadStrategy,
    /// Records covered by the scrolling window of the buffered strategy
    pub buffer_records: usize,
}

impl IndexOpenOptions {
    pub fn memory_mapped() -> Self {
        Self {
            strategy: ReadStrategy::MemoryMapped,
            buffer_records: DEFAULT_BUFFER_RECORDS,
        }
    }

    pub fn buffered(buffer_records: usize) -> Self {
        Self {
            strategy: ReadStrategy::Buffered,
            buffer_records: buffer_records.max(1),
        }
    }
}

impl Default for IndexOpenOptions {
    fn default() -> Self {
        Self::memory_mapped()
    }
}

/// One entry of the offset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// 1-based record number, matching the logical record order
    pub record_id: u32,
    /// Offset in 16-bit words
    pub offset: u32,
    /// Length in 16-bit words
    pub length: u32,
}

impl IndexRecord {
    pub fn offset_in_bytes(&self) -> u64 {
        self.offset as u64 * 2
    }

    pub fn length_in_bytes(&self) -> u64 {
        self.length as u64 * 2
    }
}

struct ScrollingBuffer {
    reader: Box<dyn ReadSeek>,
    buffer: Vec<u8>,
    /// Absolute byte position of `buffer[0]`
    window_start: u64,
    /// Number of valid bytes in `buffer`
    window_len: usize,
}

impl ScrollingBuffer {
    fn new(reader: Box<dyn ReadSeek>, buffer_records: usize) -> Self {
        Self {
            reader,
            buffer: vec![0u8; buffer_records * RECORD_SIZE],
            window_start: 0,
            window_len: 0,
        }
    }

    fn covers(&self, position: u64) -> bool {
        position >= self.window_start
            && position + RECORD_SIZE as u64 <= self.window_start + self.window_len as u64
    }

    fn refill(&mut self, position: u64) -> SpatialResult<()> {
        log::trace!("Refilling index buffer at byte {}", position);
        self.reader.seek(SeekFrom::Start(position))?;

        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.reader.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        self.window_start = position;
        self.window_len = filled;
        Ok(())
    }

    fn record_bytes(&mut self, position: u64) -> SpatialResult<&[u8]> {
        if !self.covers(position) {
            self.refill(position)?;
            if !self.covers(position) {
                return Err(truncated(position));
            }
        }
        let start = (position - self.window_start) as usize;
        Ok(&self.buffer[start..start + RECORD_SIZE])
    }
}

enum Backing {
    Mapped(Mmap),
    Memory(Vec<u8>),
    Buffered(ScrollingBuffer),
    Closed,
}

/// Random-access view over an index file's `(offset, length)` table.
///
/// # Example
///
/// ```rust
/// use strata_spatial::index_file::{IndexOpenOptions, IndexRecordStore, IndexRecordWriter};
/// use strata::Envelope;
///
/// let mut writer = IndexRecordWriter::new(std::io::Cursor::new(Vec::new()));
/// writer.append(50, 10);
/// writer.append(64, 12);
/// let bytes = writer.finish(1, Envelope::new(0.0, 0.0, 1.0, 1.0)).unwrap().into_inner();
///
/// let mut store = IndexRecordStore::open(bytes, IndexOpenOptions::default()).unwrap();
/// assert_eq!(store.record_count(), 2);
/// assert_eq!(store.get_offset_in_bytes(1).unwrap(), 128);
/// ```
pub struct IndexRecordStore {
    header: IndexHeader,
    record_count: usize,
    backing: Backing,
}

impl IndexRecordStore {
    /// Opens an index, reading its header.
    ///
    /// Paths honour the requested strategy. Raw buffers are always indexed
    /// directly. Streams use the scrolling buffer, unless memory mapping was
    /// requested, in which case the whole stream is loaded up front.
    pub fn open(source: impl Into<IndexSource>, options: IndexOpenOptions) -> SpatialResult<Self> {
        match source.into() {
            IndexSource::Path(path) => Self::open_path(&path, options),
            IndexSource::Bytes(bytes) => {
                let header = IndexHeader::from_bytes(&bytes)?;
                Ok(Self::with_backing(header, Backing::Memory(bytes)))
            }
            IndexSource::Reader(mut reader) => match options.strategy {
                ReadStrategy::MemoryMapped => {
                    let mut bytes = Vec::new();
                    reader.seek(SeekFrom::Start(0))?;
                    reader.read_to_end(&mut bytes)?;
                    let header = IndexHeader::from_bytes(&bytes)?;
                    Ok(Self::with_backing(header, Backing::Memory(bytes)))
                }
                ReadStrategy::Buffered => {
                    reader.seek(SeekFrom::Start(0))?;
                    let header = IndexHeader::read_from(&mut reader)?;
                    let buffer = ScrollingBuffer::new(reader, options.buffer_records);
                    Ok(Self::with_backing(header, Backing::Buffered(buffer)))
                }
            },
        }
    }

    fn open_path(path: &Path, options: IndexOpenOptions) -> SpatialResult<Self> {
        let mut file = File::open(path)?;
        match options.strategy {
            ReadStrategy::MemoryMapped => {
                // SAFETY: the mapping is read-only and index files are not
                // truncated while a store holds them open.
                let mmap = unsafe { Mmap::map(&file)? };
                let header = IndexHeader::from_bytes(&mmap)?;
                log::debug!("Memory-mapped index {:?} ({} records)", path, header.record_count());
                Ok(Self::with_backing(header, Backing::Mapped(mmap)))
            }
            ReadStrategy::Buffered => {
                let header = IndexHeader::read_from(&mut file)?;
                log::debug!("Opened buffered index {:?} ({} records)", path, header.record_count());
                let buffer = ScrollingBuffer::new(Box::new(file), options.buffer_records);
                Ok(Self::with_backing(header, Backing::Buffered(buffer)))
            }
        }
    }

    fn with_backing(header: IndexHeader, backing: Backing) -> Self {
        Self {
            record_count: header.record_count(),
            header,
            backing,
        }
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn strategy(&self) -> Option<ReadStrategy> {
        match self.backing {
            Backing::Mapped(_) | Backing::Memory(_) => Some(ReadStrategy::MemoryMapped),
            Backing::Buffered(_) => Some(ReadStrategy::Buffered),
            Backing::Closed => None,
        }
    }

    /// Offset of record `index` (zero-based), in 16-bit words.
    pub fn get_offset(&mut self, index: usize) -> SpatialResult<u32> {
        self.read_pair(index).map(|(offset, _)| offset)
    }

    /// Length of record `index` (zero-based), in 16-bit words.
    pub fn get_length(&mut self, index: usize) -> SpatialResult<u32> {
        self.read_pair(index).map(|(_, length)| length)
    }

    pub fn get_offset_in_bytes(&mut self, index: usize) -> SpatialResult<u64> {
        Ok(self.get_offset(index)? as u64 * 2)
    }

    pub fn get_length_in_bytes(&mut self, index: usize) -> SpatialResult<u64> {
        Ok(self.get_length(index)? as u64 * 2)
    }

    pub fn get_record(&mut self, index: usize) -> SpatialResult<IndexRecord> {
        let (offset, length) = self.read_pair(index)?;
        Ok(IndexRecord {
            record_id: index as u32 + 1,
            offset,
            length,
        })
    }

    /// Releases the file handle and any mapped or buffered bytes.
    pub fn close(&mut self) {
        self.backing = Backing::Closed;
    }

    fn read_pair(&mut self, index: usize) -> SpatialResult<(u32, u32)> {
        if index >= self.record_count {
            return Err(SpatialError::OutOfRange(format!(
                "record {} requested from an index of {} records",
                index, self.record_count
            )));
        }

        let position = (HEADER_SIZE + index * RECORD_SIZE) as u64;
        let raw = match &mut self.backing {
            Backing::Mapped(mmap) => slice_record(mmap, position)?,
            Backing::Memory(bytes) => slice_record(bytes, position)?,
            Backing::Buffered(buffer) => buffer.record_bytes(position)?,
            Backing::Closed => return Err(SpatialError::Closed),
        };

        let mut cursor = Cursor::new(raw);
        let offset = cursor.read_i32::<BigEndian>()?;
        let length = cursor.read_i32::<BigEndian>()?;
        if offset < 0 || length < 0 {
            return Err(SpatialError::Malformed(format!(
                "record {} has negative offset/length ({}, {})",
                index, offset, length
            )));
        }
        Ok((offset as u32, length as u32))
    }
}

fn slice_record(bytes: &[u8], position: u64) -> SpatialResult<&[u8]> {
    let start = position as usize;
    bytes
        .get(start..start + RECORD_SIZE)
        .ok_or_else(|| truncated(position))
}

fn truncated(position: u64) -> SpatialError {
    SpatialError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("index file ends before the record at byte {}", position),
    ))
}
