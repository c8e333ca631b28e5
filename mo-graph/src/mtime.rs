//! Modification time cache
//!
//! Populated lazily as files are inspected and shared by every staleness
//! query of a run. Entries are never invalidated: sources are assumed not to
//! change while the tool runs. Artifacts do change (they are being rebuilt),
//! so their timestamps must be read with [`stat_modified`] instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dashmap::DashMap;

use crate::error::{Result, StalenessError};

#[derive(Debug, Default)]
pub struct MtimeCache {
    entries: DashMap<PathBuf, SystemTime>,
}

impl MtimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modification time of `path`, from the cache or the filesystem
    pub fn modified(&self, path: &Path) -> Result<SystemTime> {
        if let Some(time) = self.entries.get(path) {
            return Ok(*time);
        }

        let time = stat_modified(path)?;
        // Concurrent queries may race here; both write the same fact
        self.entries.insert(path.to_path_buf(), time);
        Ok(time)
    }

    /// Whether `path` was modified strictly after `reference`
    pub fn is_newer(&self, path: &Path, reference: SystemTime) -> Result<bool> {
        Ok(self.modified(path)? > reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Uncached modification time
pub fn stat_modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_err(|e| StalenessError::from_io(path, e))
}
