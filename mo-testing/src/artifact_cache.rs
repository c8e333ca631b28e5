//! Compiled artifact storage
//!
//! Artifacts double as the build cache: their modification time is the
//! reference point of every staleness query. This module owns their
//! directories on disk.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mo_graph::ArtifactLayout;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::test_discovery::TestModule;

#[derive(Error, Debug)]
pub enum ArtifactStoreError {
    #[error("I/O error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArtifactStoreError + '_ {
    move |source| ArtifactStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Artifact directories of a project
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    layout: ArtifactLayout,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, layout: ArtifactLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Create a directory relative to the project root
    pub fn ensure_dir(&self, dir: &Path) -> Result<(), ArtifactStoreError> {
        let path = self.root.join(dir);
        fs::create_dir_all(&path).map_err(io_error(&path))
    }

    /// Create the directory an artifact is written to
    pub fn ensure_parent(&self, artifact: &Path) -> Result<(), ArtifactStoreError> {
        match artifact.parent() {
            Some(parent) => self.ensure_dir(parent),
            None => Ok(()),
        }
    }

    /// Output directories used by a set of test modules
    pub fn output_dirs<'a>(&self, modules: impl IntoIterator<Item = &'a TestModule>) -> BTreeSet<PathBuf> {
        modules
            .into_iter()
            .map(|module| match ArtifactLayout::test_root(&module.source) {
                Some(test_root) => self.layout.output_dir(&test_root),
                None => PathBuf::from(&self.layout.dir_name),
            })
            .collect()
    }

    /// Remove the output directories of the given test roots, returning how
    /// many existed
    pub fn clear_all(&self, test_roots: &[PathBuf]) -> Result<usize, ArtifactStoreError> {
        let mut removed = 0;

        for test_root in test_roots {
            let dir = self.root.join(self.layout.output_dir(test_root));
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    debug!("Removed {}", dir.display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&dir)(e)),
            }
        }

        Ok(removed)
    }

    /// Artifact statistics of the given test roots
    pub fn stats(&self, test_roots: &[PathBuf]) -> Result<ArtifactStats, ArtifactStoreError> {
        let mut stats = ArtifactStats::default();

        for test_root in test_roots {
            let dir = self.root.join(self.layout.output_dir(test_root));
            if dir.is_dir() {
                self.collect_stats(&dir, &mut stats)?;
            }
        }

        Ok(stats)
    }

    fn collect_stats(&self, dir: &Path, stats: &mut ArtifactStats) -> Result<(), ArtifactStoreError> {
        for entry in fs::read_dir(dir).map_err(io_error(dir))? {
            let entry = entry.map_err(io_error(dir))?;
            let path = entry.path();

            if path.is_dir() {
                self.collect_stats(&path, stats)?;
            } else if path
                .extension()
                .map_or(false, |ext| ext == self.layout.extension.as_str())
            {
                let metadata = entry.metadata().map_err(io_error(&path))?;
                stats.total_artifacts += 1;
                stats.total_size_bytes += metadata.len();
            }
        }

        Ok(())
    }
}

/// Artifact statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStats {
    pub total_artifacts: usize,
    pub total_size_bytes: u64,
}

impl ArtifactStats {
    pub fn size_mb(&self) -> f64 {
        (self.total_size_bytes as f64) / (1024.0 * 1024.0)
    }
}
