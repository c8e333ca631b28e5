//! Utility functions and helpers for the CLI

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A source file named on the command line, resolved against the project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    /// Canonical absolute path
    pub absolute: PathBuf,
    /// Path relative to the project root
    pub relative: PathBuf,
}

/// Resolve `file` (relative paths are taken from the project root) to a
/// file inside the canonical project `root`
pub fn project_file(root: &Path, file: &Path) -> Result<ProjectFile> {
    let absolute = std::fs::canonicalize(root.join(file))
        .with_context(|| format!("File not found: {}", file.display()))?;

    let relative = absolute
        .strip_prefix(root)
        .with_context(|| format!("{} is outside the project root {}", absolute.display(), root.display()))?
        .to_path_buf();

    Ok(ProjectFile { absolute, relative })
}

/// Display a path relative to the project root when it lies inside it
pub fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
