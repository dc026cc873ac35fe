use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

/// Error kinds for strata operations
///
/// Every failure surfaced by the spatial index or the mosaic storage falls into
/// one of these categories, so callers can branch on the kind without caring
/// which crate produced the error.
///
/// # Examples
///
/// ```rust
/// use strata::errors::{ErrorKind, StrataError, StrataResult};
///
/// fn example() -> StrataResult<()> {
///     Err(StrataError::new("tile (9, 9) is outside the grid", ErrorKind::OutOfRange))
/// }
/// assert_eq!(example().unwrap_err().kind(), &ErrorKind::OutOfRange);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// Stream or file read/write failure, including truncated files
    IOFailure,
    /// Stored data cannot be interpreted (bad header, dangling child id, bad completion string)
    MalformedData,
    /// Tile or grid coordinate outside the valid bounds
    OutOfRange,
    /// Invalid shape, bounds, CRS or configuration value
    InvalidArgument,
    /// Operation not available for the current backing (e.g. writing a read-only mosaic)
    Unsupported,
    /// The operation was cancelled by the caller
    Cancelled,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::IOFailure => write!(f, "IO failure"),
            ErrorKind::MalformedData => write!(f, "Malformed data"),
            ErrorKind::OutOfRange => write!(f, "Out of range"),
            ErrorKind::InvalidArgument => write!(f, "Invalid argument"),
            ErrorKind::Unsupported => write!(f, "Unsupported operation"),
            ErrorKind::Cancelled => write!(f, "Cancelled"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom strata error type.
///
/// `StrataError` carries a message, a kind, an optional cause and the
/// backtrace captured at construction time.
///
/// # Examples
///
/// ```rust
/// use strata::errors::{ErrorKind, StrataError};
///
/// let cause = StrataError::new("unexpected end of file", ErrorKind::IOFailure);
/// let err = StrataError::new_with_cause("cannot read tree", ErrorKind::MalformedData, cause);
/// assert!(err.cause().is_some());
/// ```
#[derive(Clone)]
pub struct StrataError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<StrataError>>,
    backtrace: Backtrace,
}

impl StrataError {
    /// Creates a new `StrataError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        StrataError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Backtrace::new_unresolved(),
        }
    }

    /// Creates a new `StrataError` chained to the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: StrataError) -> Self {
        StrataError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Backtrace::new_unresolved(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&StrataError> {
        self.cause.as_deref()
    }
}

impl Display for StrataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for StrataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => {
                let mut backtrace = self.backtrace.clone();
                backtrace.resolve();
                write!(f, "{}\n{:?}", self.message, backtrace)
            }
        }
    }
}

impl Error for StrataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        let message = match err.kind() {
            std::io::ErrorKind::UnexpectedEof => format!("IO error: truncated input: {}", err),
            _ => format!("IO error: {}", err),
        };
        StrataError::new(&message, ErrorKind::IOFailure)
    }
}

impl From<std::num::ParseFloatError> for StrataError {
    fn from(err: std::num::ParseFloatError) -> Self {
        StrataError::new(
            &format!("Float parsing error: {}", err),
            ErrorKind::MalformedData,
        )
    }
}
