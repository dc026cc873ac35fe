//! # Strata Mosaic - tiled raster pyramids
//!
//! Storage and retrieval of raster tiles organised as a pyramid of
//! resolution levels:
//!
//! - [`MosaicGrid`]: geometry of one level, tile envelopes and missing-tile
//!   tracking through a completion bitset
//! - [`MosaicStore`]: the levels of a pyramid under one folder, with tiles
//!   stored one file each or packed into a single indexed file per level
//! - [`TileRequestScheduler`]: concurrent fetches of many tiles, streamed
//!   back through a bounded, cancellable [`TileResultQueue`]
//!
//! Tile bytes are never decoded; callers get raw payloads back.
//!
//! ## Fetching many tiles
//!
//! ```rust
//! use strata::{CrsToken, Envelope};
//! use strata_mosaic::{MosaicConfig, MosaicGrid, MosaicStore, TileResult, TileResultQueue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let folder = tempfile::tempdir()?;
//! let store = MosaicStore::create(folder.path(), CrsToken::new("EPSG:3857"), MosaicConfig::default())?;
//! let level = store.add_level(MosaicGrid::new(0.0, 100.0, 3, 3, 10, 10, 1.0)?)?;
//! store.create_tile(level.id(), 0, 0, b"nw")?;
//! store.create_tile(level.id(), 2, 2, b"se")?;
//!
//! let wanted = level.grid().tiles_intersecting(&Envelope::new(0.0, 70.0, 30.0, 100.0));
//! let mut queue = store.get_tiles(level.id(), wanted)?;
//! let mut found = 0;
//! loop {
//!     match TileResultQueue::take(&mut queue) {
//!         TileResult::Payload(payload) => found += payload.bytes.len(),
//!         TileResult::Failure { position, error } => eprintln!("{}: {}", position, error),
//!         TileResult::EndOfStream => break,
//!     }
//! }
//! assert_eq!(found, 4);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod completion;
pub mod config;
pub mod error;
pub mod grid;
pub mod metadata;
mod packed;
pub mod scheduler;
pub mod store;
pub mod tile;

pub use cache::FolderCache;
pub use completion::CompletionBits;
pub use config::{MosaicConfig, TileLayout};
pub use error::{MosaicError, MosaicResult};
pub use grid::{MosaicGrid, TileLimits, TilePosition};
pub use metadata::METADATA_FILE;
pub use packed::{PACKED_DATA_FILE, PACKED_INDEX_FILE};
pub use scheduler::{CancelHandle, TilePayload, TileRequestScheduler, TileResult, TileResultQueue};
pub use store::{grid_level_id, level_id, MosaicLevel, MosaicStore};
pub use tile::{TileFetch, TileHandle, TileSource};
