//! Error and result types for the mosaic crate.

use std::io;
use strata::errors::{ErrorKind, StrataError};
use strata_spatial::SpatialError;
use thiserror::Error;

/// Errors that can occur while reading or writing a mosaic
#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Tile request cancelled")]
    Cancelled,
}

impl MosaicError {
    /// Category of this error in terms of the core [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            MosaicError::Io(_) => ErrorKind::IOFailure,
            MosaicError::Malformed(_) | MosaicError::Metadata(_) => ErrorKind::MalformedData,
            MosaicError::OutOfRange(_) => ErrorKind::OutOfRange,
            MosaicError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            MosaicError::Unsupported(_) => ErrorKind::Unsupported,
            MosaicError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<SpatialError> for MosaicError {
    fn from(err: SpatialError) -> Self {
        match err {
            SpatialError::Io(e) => MosaicError::Io(e),
            SpatialError::Closed => MosaicError::Io(io::Error::other("index file is closed")),
            SpatialError::Malformed(msg) => MosaicError::Malformed(msg),
            SpatialError::OutOfRange(msg) => MosaicError::OutOfRange(msg),
            SpatialError::InvalidArgument(msg) => MosaicError::InvalidArgument(msg),
            SpatialError::Unsupported(msg) => MosaicError::Unsupported(msg),
        }
    }
}

impl From<MosaicError> for StrataError {
    fn from(err: MosaicError) -> Self {
        StrataError::new(&err.to_string(), err.kind())
    }
}

impl From<StrataError> for MosaicError {
    fn from(err: StrataError) -> Self {
        let message = err.message().to_string();
        match err.kind() {
            ErrorKind::IOFailure => MosaicError::Io(io::Error::other(message)),
            ErrorKind::MalformedData => MosaicError::Malformed(message),
            ErrorKind::OutOfRange => MosaicError::OutOfRange(message),
            ErrorKind::Unsupported => MosaicError::Unsupported(message),
            ErrorKind::Cancelled => MosaicError::Cancelled,
            _ => MosaicError::InvalidArgument(message),
        }
    }
}

/// Result type for mosaic operations
pub type MosaicResult<T> = Result<T, MosaicError>;
