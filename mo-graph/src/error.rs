//! Error types for import graph analysis

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StalenessError>;

/// Errors raised while reading a module's import block
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Source file not found: {path:?}")]
    Missing { path: PathBuf },

    #[error("I/O error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ImportError {
    /// Classify an I/O error for `path`, keeping "absent" apart from other failures
    pub fn from_io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        let path = path.into();
        if error.kind() == io::ErrorKind::NotFound {
            Self::Missing { path }
        } else {
            Self::Io { path, source: error }
        }
    }
}

/// Errors raised while building the package table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackageError {
    #[error("Malformed package declaration on line {line}: {content:?}")]
    Malformed { line: usize, content: String },
}

/// Errors raised by a staleness query
#[derive(Error, Debug)]
pub enum StalenessError {
    #[error("Source file not found: {path:?}")]
    MissingSource { path: PathBuf },

    #[error("I/O error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unknown package `{package}` imported by {importer:?}")]
    UnresolvedPackage { importer: PathBuf, package: String },

    #[error("Cannot resolve import \"{target}\" in {importer:?}")]
    UnresolvedImport { importer: PathBuf, target: String },
}

impl StalenessError {
    pub fn from_io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        let path = path.into();
        if error.kind() == io::ErrorKind::NotFound {
            Self::MissingSource { path }
        } else {
            Self::Io { path, source: error }
        }
    }

    /// Path of the file the error is about
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::MissingSource { path } | Self::Io { path, .. } => path,
            Self::UnresolvedPackage { importer, .. } | Self::UnresolvedImport { importer, .. } => {
                importer
            }
        }
    }

    /// Whether the error stems from the soundness checks of strict mode
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedPackage { .. } | Self::UnresolvedImport { .. }
        )
    }
}

impl From<ImportError> for StalenessError {
    fn from(error: ImportError) -> Self {
        match error {
            ImportError::Missing { path } => Self::MissingSource { path },
            ImportError::Io { path, source } => Self::Io { path, source },
        }
    }
}
