//! Temporary folders for mosaics that only live as long as their cache.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::error::MosaicResult;

/// Maps mosaic names to temporary folders.
///
/// The cache owns every folder it hands out: asking twice for the same name
/// returns the same path, and the folders are deleted when the cache is
/// dropped or the name is removed. Share one cache between the stores that
/// should see the same temporary mosaics.
#[derive(Default)]
pub struct FolderCache {
    folders: Mutex<HashMap<String, TempDir>>,
}

impl FolderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folder for `name`, created on first use.
    pub fn folder_for(&self, name: &str) -> MosaicResult<PathBuf> {
        let mut folders = self.folders.lock();
        if let Some(dir) = folders.get(name) {
            return Ok(dir.path().to_path_buf());
        }

        let dir = tempfile::Builder::new()
            .prefix(&format!("strata-{}-", sanitize(name)))
            .tempdir()?;
        let path = dir.path().to_path_buf();
        log::debug!("Created temporary mosaic folder {} for {}", path.display(), name);
        folders.insert(name.to_string(), dir);
        Ok(path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.folders.lock().contains_key(name)
    }

    /// Deletes the folder for `name`, returning whether there was one.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.folders.lock().remove(name);
        match removed {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                if let Err(err) = dir.close() {
                    log::warn!("Failed to delete temporary folder {}: {}", path.display(), err);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.folders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.lock().is_empty()
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
