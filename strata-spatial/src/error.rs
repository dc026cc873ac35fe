//! Error and result types for the spatial index crate.

use std::io;
use strata::errors::{ErrorKind, StrataError};
use thiserror::Error;

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
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

    #[error("Index file is closed")]
    Closed,
}

impl SpatialError {
    /// Category of this error in terms of the core [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpatialError::Io(_) | SpatialError::Closed => ErrorKind::IOFailure,
            SpatialError::Malformed(_) => ErrorKind::MalformedData,
            SpatialError::OutOfRange(_) => ErrorKind::OutOfRange,
            SpatialError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SpatialError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

impl From<SpatialError> for StrataError {
    fn from(err: SpatialError) -> Self {
        StrataError::new(&err.to_string(), err.kind())
    }
}

impl From<StrataError> for SpatialError {
    fn from(err: StrataError) -> Self {
        match err.kind() {
            ErrorKind::IOFailure => {
                SpatialError::Io(io::Error::other(err.message().to_string()))
            }
            ErrorKind::MalformedData => SpatialError::Malformed(err.message().to_string()),
            ErrorKind::OutOfRange => SpatialError::OutOfRange(err.message().to_string()),
            ErrorKind::Unsupported => SpatialError::Unsupported(err.message().to_string()),
            _ => SpatialError::InvalidArgument(err.message().to_string()),
        }
    }
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;
