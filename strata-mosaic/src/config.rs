use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, MosaicResult};

/// File extension used for tile files when none is configured.
pub const DEFAULT_FORMAT_EXTENSION: &str = "png";

/// Results a tile request may buffer before workers block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// How tile bytes are laid out inside a level folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileLayout {
    /// One `{col}_{row}.{ext}` file per tile.
    #[default]
    FilePerTile,
    /// A single `tiles.dat` per level addressed through a `tiles.shx` index.
    Packed,
}

/// Mosaic store configuration.
///
/// Cloned into every store. `layout` and `format_extension` only apply
/// when a store is created; an existing store keeps the values recorded in
/// its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MosaicConfig {
    pub layout: TileLayout,
    pub format_extension: String,
    pub read_only: bool,
    /// Threads fetching tiles for one `get_tiles` request
    pub worker_count: usize,
    /// Bound of the result queue handed back by `get_tiles`
    pub queue_capacity: usize,
    /// Leave `mosaic.json` alone on tile writes until `flush` is called.
    ///
    /// Bulk loads avoid rewriting the metadata once per tile this way. A
    /// crash before the next flush loses the completion bits of every tile
    /// written since the last one; their bytes stay on disk but read as
    /// missing after reopening.
    pub defer_metadata: bool,
}

impl MosaicConfig {
    pub fn new() -> Self {
        Self {
            layout: TileLayout::default(),
            format_extension: DEFAULT_FORMAT_EXTENSION.to_string(),
            read_only: false,
            worker_count: strata::get_cpu_count(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            defer_metadata: false,
        }
    }

    pub fn with_layout(mut self, layout: TileLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_format_extension(mut self, extension: impl Into<String>) -> Self {
        self.format_extension = extension.into();
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_defer_metadata(mut self, defer_metadata: bool) -> Self {
        self.defer_metadata = defer_metadata;
        self
    }

    pub fn validate(&self) -> MosaicResult<()> {
        if self.worker_count == 0 {
            return Err(MosaicError::InvalidArgument(
                "worker count must be at least 1".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(MosaicError::InvalidArgument(
                "queue capacity must be at least 1".into(),
            ));
        }
        validate_extension(&self.format_extension)
    }
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn validate_extension(extension: &str) -> MosaicResult<()> {
    let valid = !extension.is_empty()
        && extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(MosaicError::InvalidArgument(format!(
            "'{}' is not a usable tile file extension",
            extension
        )))
    }
}
