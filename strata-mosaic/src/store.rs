//! Pyramid of [`MosaicGrid`] levels stored under one folder.
//!
//! ```text
//! <folder>/mosaic.json          CRS, layout, levels and completion strings
//! <folder>/<level id>/          one folder per level
//!     {col}_{row}.{ext}         file-per-tile layout
//!     tiles.dat + tiles.shx     packed layout
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use strata::{CrsToken, Hints};
use tempfile::NamedTempFile;

use crate::cache::FolderCache;
use crate::config::{MosaicConfig, TileLayout};
use crate::error::{MosaicError, MosaicResult};
use crate::grid::{MosaicGrid, TilePosition};
use crate::metadata::{
    read_metadata, write_metadata, LevelMetadata, MosaicMetadata, METADATA_FILE, METADATA_VERSION,
};
use crate::packed;
use crate::scheduler::{TileRequestScheduler, TileResultQueue};
use crate::tile::{TileFetch, TileHandle, TileSource};

/// Level id for a grid with the same scale on both axes: the scale,
/// stringified.
pub fn level_id(scale: f64) -> String {
    format!("{}", scale)
}

/// Level id for `grid`. Grids with distinct axis scales are keyed
/// `{scale_x}x{scale_y}` so they never collide with a uniform level.
pub fn grid_level_id(grid: &MosaicGrid) -> String {
    if grid.scale_x() == grid.scale_y() {
        level_id(grid.scale_x())
    } else {
        format!("{}x{}", grid.scale_x(), grid.scale_y())
    }
}

/// One level of a store.
pub struct MosaicLevel {
    id: String,
    grid: MosaicGrid,
    dir: PathBuf,
    /// Guards the packed files: lookups read, appends write.
    io_lock: RwLock<()>,
}

impl MosaicLevel {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn grid(&self) -> &MosaicGrid {
        &self.grid
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn tile_path(&self, position: TilePosition, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{}", position.col, position.row, extension))
    }
}

/// Tile pyramid sharing one CRS. Clones share state.
///
/// # Example
///
/// ```rust
/// use strata::CrsToken;
/// use strata_mosaic::{MosaicConfig, MosaicGrid, MosaicStore, TileFetch};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let folder = tempfile::tempdir()?;
/// let store = MosaicStore::create(folder.path(), CrsToken::new("EPSG:4326"), MosaicConfig::default())?;
/// let level = store.add_level(MosaicGrid::new(0.0, 100.0, 3, 3, 10, 10, 1.0)?)?;
///
/// assert!(store.get_tile(level.id(), 1, 1)?.is_missing());
/// store.create_tile(level.id(), 1, 1, b"tile bytes")?;
///
/// match store.get_tile(level.id(), 1, 1)? {
///     TileFetch::Present(handle) => assert_eq!(handle.read_bytes()?, b"tile bytes"),
///     TileFetch::Missing => unreachable!(),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MosaicStore {
    inner: Arc<MosaicStoreInner>,
}

struct MosaicStoreInner {
    folder: PathBuf,
    crs: CrsToken,
    config: MosaicConfig,
    levels: RwLock<IndexMap<String, Arc<MosaicLevel>>>,
    /// Serializes `mosaic.json` rewrites; taken before `levels`.
    metadata_lock: Mutex<()>,
}

impl MosaicStore {
    /// Creates an empty store in `folder`, which must not already hold one.
    pub fn create(folder: impl AsRef<Path>, crs: CrsToken, config: MosaicConfig) -> MosaicResult<Self> {
        config.validate()?;
        if config.read_only {
            return Err(MosaicError::Unsupported(
                "cannot create a read-only mosaic".into(),
            ));
        }
        if crs.as_str().trim().is_empty() {
            return Err(MosaicError::InvalidArgument(
                "a mosaic needs a coordinate reference system".into(),
            ));
        }

        let folder = folder.as_ref().to_path_buf();
        fs::create_dir_all(&folder)?;
        if folder.join(METADATA_FILE).exists() {
            return Err(MosaicError::InvalidArgument(format!(
                "{} already holds a mosaic",
                folder.display()
            )));
        }

        let store = Self::assemble(folder, crs, config, IndexMap::new());
        store.persist_metadata()?;
        log::debug!("Created mosaic at {}", store.folder().display());
        Ok(store)
    }

    /// Opens the store in `folder`. Layout and tile extension come from the
    /// stored metadata; the rest of `config` applies as given.
    pub fn open(folder: impl AsRef<Path>, config: MosaicConfig) -> MosaicResult<Self> {
        config.validate()?;
        let folder = folder.as_ref().to_path_buf();
        let metadata = read_metadata(&folder)?;

        let mut config = config;
        config.layout = metadata.layout;
        config.format_extension = metadata.format_extension.clone();
        crate::config::validate_extension(&config.format_extension)
            .map_err(|e| MosaicError::Malformed(e.to_string()))?;

        let mut levels = IndexMap::with_capacity(metadata.levels.len());
        for level in &metadata.levels {
            let grid = level.to_grid()?;
            let dir = folder.join(&level.id);
            let entry = Arc::new(MosaicLevel {
                id: level.id.clone(),
                grid,
                dir,
                io_lock: RwLock::new(()),
            });
            if levels.insert(level.id.clone(), entry).is_some() {
                return Err(MosaicError::Malformed(format!(
                    "level {} is listed twice",
                    level.id
                )));
            }
        }

        log::debug!(
            "Opened mosaic at {} with {} levels",
            folder.display(),
            levels.len()
        );
        Ok(Self::assemble(folder, metadata.crs, config, levels))
    }

    /// Opens or creates the store named `name` in a folder owned by `cache`.
    pub fn create_temporary(
        name: &str,
        crs: CrsToken,
        config: MosaicConfig,
        cache: &FolderCache,
    ) -> MosaicResult<Self> {
        let folder = cache.folder_for(name)?;
        if folder.join(METADATA_FILE).exists() {
            Self::open(folder, config)
        } else {
            Self::create(folder, crs, config)
        }
    }

    fn assemble(
        folder: PathBuf,
        crs: CrsToken,
        config: MosaicConfig,
        levels: IndexMap<String, Arc<MosaicLevel>>,
    ) -> Self {
        Self {
            inner: Arc::new(MosaicStoreInner {
                folder,
                crs,
                config,
                levels: RwLock::new(levels),
                metadata_lock: Mutex::new(()),
            }),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.inner.folder
    }

    pub fn crs(&self) -> &CrsToken {
        &self.inner.crs
    }

    pub fn config(&self) -> &MosaicConfig {
        &self.inner.config
    }

    pub fn layout(&self) -> TileLayout {
        self.inner.config.layout
    }

    /// Adds a level keyed by [`grid_level_id`].
    ///
    /// Tile existence of a stored level is tracked by its completion bits,
    /// so a grid without them gets tracking switched on with every tile
    /// missing.
    pub fn add_level(&self, grid: MosaicGrid) -> MosaicResult<Arc<MosaicLevel>> {
        self.check_writable()?;
        let id = grid_level_id(&grid);
        let grid = if grid.tracks_completion() {
            grid
        } else {
            grid.with_completion_tracking()
        };

        let _metadata_guard = self.inner.metadata_lock.lock();
        let mut levels = self.inner.levels.write();
        if levels.contains_key(&id) {
            return Err(MosaicError::InvalidArgument(format!(
                "level {} already exists",
                id
            )));
        }

        let dir = self.inner.folder.join(&id);
        fs::create_dir_all(&dir)?;
        if self.layout() == TileLayout::Packed {
            packed::init_level(&dir, &grid)?;
        }

        let level = Arc::new(MosaicLevel {
            id: id.clone(),
            grid,
            dir,
            io_lock: RwLock::new(()),
        });
        levels.insert(id.clone(), level.clone());
        if let Err(err) = write_metadata(&self.inner.folder, &self.snapshot(&levels)) {
            levels.shift_remove(&id);
            return Err(err);
        }

        log::debug!("Added level {} to mosaic {}", id, self.folder().display());
        Ok(level)
    }

    pub fn level(&self, id: &str) -> Option<Arc<MosaicLevel>> {
        self.inner.levels.read().get(id).cloned()
    }

    /// Levels in the order they were added.
    pub fn levels(&self) -> Vec<Arc<MosaicLevel>> {
        self.inner.levels.read().values().cloned().collect()
    }

    /// The coarsest level at least as fine as `scale`, i.e. the largest
    /// x scale not above it. When every level is coarser than `scale` the
    /// finest level is returned.
    pub fn level_for_scale(&self, scale: f64) -> Option<Arc<MosaicLevel>> {
        let levels = self.inner.levels.read();
        let tolerance = scale.abs() * 1e-9;

        let fit = levels
            .values()
            .filter(|level| level.grid.scale_x() <= scale + tolerance)
            .max_by(|a, b| a.grid.scale_x().total_cmp(&b.grid.scale_x()));
        fit.or_else(|| {
            levels
                .values()
                .min_by(|a, b| a.grid.scale_x().total_cmp(&b.grid.scale_x()))
        })
        .cloned()
    }

    /// Looks up one tile. A missing tile is an `Ok(TileFetch::Missing)`,
    /// not an error.
    pub fn get_tile(&self, level: &str, col: u32, row: u32) -> MosaicResult<TileFetch> {
        let level = self.require_level(level)?;
        if level.grid.is_missing(col, row) {
            return Ok(TileFetch::Missing);
        }

        let position = TilePosition::new(col, row);
        match self.layout() {
            TileLayout::FilePerTile => {
                let path = level.tile_path(position, &self.inner.config.format_extension);
                match fs::metadata(&path) {
                    Ok(meta) => Ok(TileFetch::Present(TileHandle::file_range(
                        position,
                        path,
                        0,
                        meta.len(),
                    ))),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        log::debug!("Tile file {} not found", path.display());
                        Ok(TileFetch::Missing)
                    }
                    Err(err) => Err(err.into()),
                }
            }
            TileLayout::Packed => {
                let _guard = level.io_lock.read();
                packed::lookup(&level.dir, &level.grid, position)
            }
        }
    }

    /// Persists `bytes` as tile `(col, row)` and marks it written.
    ///
    /// The completion bit is set only after the bytes are synced to disk.
    /// A crash between the two leaves the tile on disk but still missing.
    /// With [`MosaicConfig::defer_metadata`] the bit reaches `mosaic.json`
    /// on the next [`flush`](Self::flush) instead of right away.
    pub fn create_tile(&self, level: &str, col: u32, row: u32, bytes: &[u8]) -> MosaicResult<()> {
        self.check_writable()?;
        let level = self.require_level(level)?;
        if !level.grid.contains_position(col, row) {
            return Err(MosaicError::OutOfRange(format!(
                "tile ({}, {}) is outside the {}x{} grid of level {}",
                col,
                row,
                level.grid.grid_width(),
                level.grid.grid_height(),
                level.id
            )));
        }

        let position = TilePosition::new(col, row);
        match self.layout() {
            TileLayout::FilePerTile => {
                fs::create_dir_all(&level.dir)?;
                let mut temp = NamedTempFile::new_in(&level.dir)?;
                temp.write_all(bytes)?;
                temp.as_file().sync_all()?;
                temp.persist(level.tile_path(position, &self.inner.config.format_extension))
                    .map_err(|e| MosaicError::Io(e.error))?;
            }
            TileLayout::Packed => {
                let _guard = level.io_lock.write();
                packed::append_tile(&level.dir, &level.grid, position, bytes)?;
            }
        }

        level.grid.mark_tile_written(col, row)?;
        if self.inner.config.defer_metadata {
            log::trace!("Wrote tile {} of level {}, metadata deferred", position, level.id);
            return Ok(());
        }
        if let Err(err) = self.persist_metadata() {
            log::error!(
                "Tile {} of level {} was written but mosaic metadata was not saved: {}",
                position,
                level.id,
                err
            );
            return Err(err);
        }

        log::trace!("Wrote tile {} of level {} ({} bytes)", position, level.id, bytes.len());
        Ok(())
    }

    /// Fetches `positions` concurrently. See [`get_tiles_with_hints`](Self::get_tiles_with_hints).
    pub fn get_tiles(
        &self,
        level: &str,
        positions: impl IntoIterator<Item = TilePosition>,
    ) -> MosaicResult<TileResultQueue> {
        self.get_tiles_with_hints(level, positions, Hints::new())
    }

    /// Fetches `positions` concurrently on the configured worker pool.
    ///
    /// Results stream through the returned queue in completion order, not
    /// request order, and end with `TileResult::EndOfStream`. Missing tiles
    /// are skipped. An unknown level or a pool that cannot be started fails
    /// here rather than through the queue.
    pub fn get_tiles_with_hints(
        &self,
        level: &str,
        positions: impl IntoIterator<Item = TilePosition>,
        hints: Hints,
    ) -> MosaicResult<TileResultQueue> {
        let level = self.require_level(level)?;
        let scheduler = TileRequestScheduler::from_config(&self.inner.config)?;
        scheduler.submit(
            Arc::new(self.clone()),
            &level.id,
            positions.into_iter().collect(),
            hints,
        )
    }

    /// Rewrites `mosaic.json` from the current in-memory state. Stores
    /// configured with `defer_metadata` must call this to make their tile
    /// writes durable.
    pub fn flush(&self) -> MosaicResult<()> {
        self.check_writable()?;
        self.persist_metadata()
    }

    fn persist_metadata(&self) -> MosaicResult<()> {
        let _metadata_guard = self.inner.metadata_lock.lock();
        let metadata = self.snapshot(&self.inner.levels.read());
        write_metadata(&self.inner.folder, &metadata)
    }

    fn snapshot(&self, levels: &IndexMap<String, Arc<MosaicLevel>>) -> MosaicMetadata {
        MosaicMetadata {
            version: METADATA_VERSION,
            crs: self.inner.crs.clone(),
            layout: self.inner.config.layout,
            format_extension: self.inner.config.format_extension.clone(),
            levels: levels
                .values()
                .map(|level| LevelMetadata::from_grid(&level.id, &level.grid))
                .collect(),
        }
    }

    fn require_level(&self, id: &str) -> MosaicResult<Arc<MosaicLevel>> {
        self.level(id)
            .ok_or_else(|| MosaicError::InvalidArgument(format!("unknown level {}", id)))
    }

    fn check_writable(&self) -> MosaicResult<()> {
        if self.inner.config.read_only {
            Err(MosaicError::Unsupported(format!(
                "mosaic {} is read-only",
                self.folder().display()
            )))
        } else {
            Ok(())
        }
    }
}

impl TileSource for MosaicStore {
    fn fetch_tile(&self, level: &str, position: TilePosition, hints: &Hints) -> MosaicResult<TileFetch> {
        if !hints.is_empty() {
            log::trace!("Local mosaic ignores {} fetch hints", hints.len());
        }
        self.get_tile(level, position.col, position.row)
    }
}
