//! The fixed 100-byte header shared by shapefile-style index files.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use strata::Envelope;

use crate::error::{SpatialError, SpatialResult};

/// Size of the header in bytes
pub const HEADER_SIZE: usize = 100;

/// Size of one `(offset, length)` record in bytes
pub const RECORD_SIZE: usize = 8;

/// Magic file code stored big-endian at byte 0
pub const FILE_CODE: i32 = 9994;

/// Format version stored little-endian at byte 28
pub const VERSION: i32 = 1000;

/// Parsed index file header.
///
/// Layout (byte offsets):
/// - `0..4` file code, big-endian
/// - `4..24` unused
/// - `24..28` file length in 16-bit words, big-endian
/// - `28..32` version, little-endian
/// - `32..36` shape type, little-endian
/// - `36..100` x/y/z/m ranges as 8 little-endian doubles
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHeader {
    pub file_length_words: i32,
    pub version: i32,
    pub shape_type: i32,
    pub bounds: Envelope,
    pub z_range: (f64, f64),
    pub m_range: (f64, f64),
}

impl IndexHeader {
    pub fn new(shape_type: i32, bounds: Envelope, record_count: usize) -> SpatialResult<Self> {
        Ok(Self {
            file_length_words: file_length_words(record_count)?,
            version: VERSION,
            shape_type,
            bounds,
            z_range: (0.0, 0.0),
            m_range: (0.0, 0.0),
        })
    }

    /// Number of records implied by the declared file length.
    pub fn record_count(&self) -> usize {
        let bytes = self.file_length_words as usize * 2;
        (bytes - HEADER_SIZE) / RECORD_SIZE
    }

    pub fn read_from<R: Read>(reader: &mut R) -> SpatialResult<Self> {
        let mut raw = [0u8; HEADER_SIZE];
        reader.read_exact(&mut raw)?;
        Self::from_bytes(&raw)
    }

    pub fn from_bytes(raw: &[u8]) -> SpatialResult<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(SpatialError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("index header needs {} bytes, got {}", HEADER_SIZE, raw.len()),
            )));
        }

        let mut cursor = Cursor::new(raw);
        let file_code = cursor.read_i32::<BigEndian>()?;
        if file_code != FILE_CODE {
            return Err(SpatialError::Malformed(format!(
                "bad index file code {} (expected {})",
                file_code, FILE_CODE
            )));
        }

        cursor.set_position(24);
        let file_length_words = cursor.read_i32::<BigEndian>()?;
        if file_length_words < 0 || (file_length_words as usize) * 2 < HEADER_SIZE {
            return Err(SpatialError::Malformed(format!(
                "declared file length of {} words is shorter than the header",
                file_length_words
            )));
        }

        let version = cursor.read_i32::<LittleEndian>()?;
        let shape_type = cursor.read_i32::<LittleEndian>()?;
        let min_x = cursor.read_f64::<LittleEndian>()?;
        let min_y = cursor.read_f64::<LittleEndian>()?;
        let max_x = cursor.read_f64::<LittleEndian>()?;
        let max_y = cursor.read_f64::<LittleEndian>()?;
        let z_min = cursor.read_f64::<LittleEndian>()?;
        let z_max = cursor.read_f64::<LittleEndian>()?;
        let m_min = cursor.read_f64::<LittleEndian>()?;
        let m_max = cursor.read_f64::<LittleEndian>()?;

        Ok(Self {
            file_length_words,
            version,
            shape_type,
            bounds: Envelope::new(min_x, min_y, max_x, max_y),
            z_range: (z_min, z_max),
            m_range: (m_min, m_max),
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> SpatialResult<()> {
        writer.write_i32::<BigEndian>(FILE_CODE)?;
        for _ in 0..5 {
            writer.write_i32::<BigEndian>(0)?;
        }
        writer.write_i32::<BigEndian>(self.file_length_words)?;
        writer.write_i32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.shape_type)?;
        writer.write_f64::<LittleEndian>(self.bounds.min_x)?;
        writer.write_f64::<LittleEndian>(self.bounds.min_y)?;
        writer.write_f64::<LittleEndian>(self.bounds.max_x)?;
        writer.write_f64::<LittleEndian>(self.bounds.max_y)?;
        writer.write_f64::<LittleEndian>(self.z_range.0)?;
        writer.write_f64::<LittleEndian>(self.z_range.1)?;
        writer.write_f64::<LittleEndian>(self.m_range.0)?;
        writer.write_f64::<LittleEndian>(self.m_range.1)?;
        Ok(())
    }
}

/// File length, in 16-bit words, of an index holding `record_count` records.
pub fn file_length_words(record_count: usize) -> SpatialResult<i32> {
    let bytes = record_count
        .checked_mul(RECORD_SIZE)
        .and_then(|b| b.checked_add(HEADER_SIZE))
        .ok_or_else(|| SpatialError::InvalidArgument("too many index records".into()))?;
    i32::try_from(bytes / 2)
        .map_err(|_| SpatialError::InvalidArgument("index file would exceed 4GB".into()))
}
