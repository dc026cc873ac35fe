//! Append-only construction of index files, plus in-place record patching.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use strata::Envelope;

use super::header::{IndexHeader, HEADER_SIZE, RECORD_SIZE};
use crate::error::{SpatialError, SpatialResult};

/// Collects `(offset, length)` pairs (in 16-bit words) and writes them with
/// a matching header on [`finish`](IndexRecordWriter::finish).
pub struct IndexRecordWriter<W: Write> {
    writer: W,
    records: Vec<(u32, u32)>,
}

impl IndexRecordWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> SpatialResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> IndexRecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records: Vec::new(),
        }
    }

    pub fn append(&mut self, offset_words: u32, length_words: u32) {
        self.records.push((offset_words, length_words));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes the header and every appended record, returning the
    /// underlying writer after flushing it.
    pub fn finish(mut self, shape_type: i32, bounds: Envelope) -> SpatialResult<W> {
        let header = IndexHeader::new(shape_type, bounds, self.records.len())?;
        header.write_to(&mut self.writer)?;
        for &(offset, length) in &self.records {
            write_pair(&mut self.writer, offset, length)?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Overwrites record `index` of an existing index file in place.
///
/// The header is left untouched, so `index` must be below the declared
/// record count.
pub fn patch_record(file: &mut File, index: usize, offset_words: u32, length_words: u32) -> SpatialResult<()> {
    let header = {
        file.seek(SeekFrom::Start(0))?;
        IndexHeader::read_from(file)?
    };
    if index >= header.record_count() {
        return Err(SpatialError::OutOfRange(format!(
            "cannot patch record {} of an index with {} records",
            index,
            header.record_count()
        )));
    }

    file.seek(SeekFrom::Start((HEADER_SIZE + index * RECORD_SIZE) as u64))?;
    write_pair(file, offset_words, length_words)?;
    file.flush()?;
    Ok(())
}

fn write_pair<W: Write>(writer: &mut W, offset: u32, length: u32) -> SpatialResult<()> {
    let offset = i32::try_from(offset)
        .map_err(|_| SpatialError::InvalidArgument(format!("offset {} exceeds int32", offset)))?;
    let length = i32::try_from(length)
        .map_err(|_| SpatialError::InvalidArgument(format!("length {} exceeds int32", length)))?;
    writer.write_i32::<BigEndian>(offset)?;
    writer.write_i32::<BigEndian>(length)?;
    Ok(())
}
