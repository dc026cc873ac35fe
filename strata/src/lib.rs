//! # Strata - core types
//!
//! Shared building blocks for the strata crates:
//!
//! - [`errors`]: the [`StrataError`](errors::StrataError) type every crate
//!   converts its local errors into
//! - [`Envelope`]: the 2D bounding box used by the spatial index and the
//!   mosaic grids
//! - [`CrsToken`] and [`Hints`]: collaborator values passed through the core
//!   without interpretation

use std::collections::BTreeMap;
use std::thread::available_parallelism;

use serde::{Deserialize, Serialize};

pub mod envelope;
pub mod errors;

pub use envelope::Envelope;
pub use errors::{ErrorKind, StrataError, StrataResult};

/// Opaque coordinate reference system token.
///
/// The core never interprets it; it is stored with mosaic metadata and
/// handed back to callers unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CrsToken(String);

impl CrsToken {
    pub fn new(code: impl Into<String>) -> Self {
        CrsToken(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CrsToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key-value hints forwarded to tile fetches untouched.
pub type Hints = BTreeMap<String, String>;

/// Returns the number of available CPU cores.
///
/// If detection fails, it defaults to 1.
///
/// # Examples
///
/// ```rust
/// let cpu_count = strata::get_cpu_count();
/// assert!(cpu_count > 0);
/// ```
pub fn get_cpu_count() -> usize {
    available_parallelism()
        .map(|p| p.get())
        .unwrap_or_else(|err| {
            log::warn!("Failed to detect available parallelism: {}. Defaulting to single thread.", err);
            1
        })
}
