//! `mosaic.json`: the persisted description of a pyramid.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata::CrsToken;
use tempfile::NamedTempFile;

use crate::completion::CompletionBits;
use crate::config::TileLayout;
use crate::error::{MosaicError, MosaicResult};
use crate::grid::{MosaicGrid, TileLimits};

pub const METADATA_FILE: &str = "mosaic.json";

pub(crate) const METADATA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MosaicMetadata {
    pub version: u32,
    pub crs: CrsToken,
    pub layout: TileLayout,
    pub format_extension: String,
    #[serde(default)]
    pub levels: Vec<LevelMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LevelMetadata {
    pub id: String,
    pub upper_left_x: f64,
    pub upper_left_y: f64,
    pub grid_width: u32,
    pub grid_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub scale_x: f64,
    pub scale_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<TileLimits>,
    /// Completion bits in their text form; absent when not tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
}

impl LevelMetadata {
    pub fn from_grid(id: &str, grid: &MosaicGrid) -> Self {
        let (upper_left_x, upper_left_y) = grid.upper_left();
        Self {
            id: id.to_string(),
            upper_left_x,
            upper_left_y,
            grid_width: grid.grid_width(),
            grid_height: grid.grid_height(),
            tile_width: grid.tile_width(),
            tile_height: grid.tile_height(),
            scale_x: grid.scale_x(),
            scale_y: grid.scale_y(),
            limits: grid.limits(),
            completion: grid.completion_text(),
        }
    }

    /// Rebuilds the grid; geometry that no longer validates is malformed.
    pub fn to_grid(&self) -> MosaicResult<MosaicGrid> {
        let malformed = |e: MosaicError| match e {
            MosaicError::InvalidArgument(msg) => {
                MosaicError::Malformed(format!("level {}: {}", self.id, msg))
            }
            other => other,
        };

        let mut grid = MosaicGrid::new(
            self.upper_left_x,
            self.upper_left_y,
            self.grid_width,
            self.grid_height,
            self.tile_width,
            self.tile_height,
            self.scale_x,
        )
        .and_then(|grid| grid.with_axis_scales(self.scale_x, self.scale_y))
        .map_err(malformed)?;

        if let Some(limits) = self.limits {
            grid = grid.with_limits(limits).map_err(malformed)?;
        }
        if let Some(text) = &self.completion {
            let bits = CompletionBits::from_text(text, self.grid_width, self.grid_height)
                .map_err(|e| match e {
                    MosaicError::Malformed(msg) => {
                        MosaicError::Malformed(format!("level {}: {}", self.id, msg))
                    }
                    other => other,
                })?;
            grid = grid.with_completion(bits).map_err(malformed)?;
        }
        Ok(grid)
    }
}

pub(crate) fn read_metadata(folder: &Path) -> MosaicResult<MosaicMetadata> {
    let file = File::open(folder.join(METADATA_FILE))?;
    let metadata: MosaicMetadata = serde_json::from_reader(BufReader::new(file))?;
    if metadata.version != METADATA_VERSION {
        return Err(MosaicError::Unsupported(format!(
            "mosaic metadata version {} (expected {})",
            metadata.version, METADATA_VERSION
        )));
    }
    Ok(metadata)
}

/// Replaces `mosaic.json` atomically: the new content is written to a
/// temporary file in the same folder and renamed over the old one.
pub(crate) fn write_metadata(folder: &Path, metadata: &MosaicMetadata) -> MosaicResult<()> {
    let temp = NamedTempFile::new_in(folder)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, metadata)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(folder.join(METADATA_FILE))
        .map_err(|e| MosaicError::Io(e.error))?;
    Ok(())
}
