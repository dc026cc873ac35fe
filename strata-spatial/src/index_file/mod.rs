//! Shapefile-style index files (`.shx`): a 100-byte header followed by
//! big-endian `(offset, length)` pairs expressed in 16-bit words.

pub mod header;
pub mod store;
pub mod writer;

pub use header::{IndexHeader, FILE_CODE, HEADER_SIZE, RECORD_SIZE, VERSION};
pub use store::{
    IndexOpenOptions, IndexRecord, IndexRecordStore, IndexSource, ReadSeek, ReadStrategy,
    DEFAULT_BUFFER_RECORDS,
};
pub use writer::{patch_record, IndexRecordWriter};
