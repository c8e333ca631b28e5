//! Import graph analysis for incremental Motoko test builds
//!
//! This crate answers one question: is the compiled artifact of a module
//! older than the module or anything it (transitively) imports? It provides
//! the pieces needed to answer it:
//!
//! - [`imports`]: scanning the leading import block of a source file
//! - [`packages`]: the package table built from the package manager's source list
//! - [`artifact`]: mapping source modules to their compiled artifact paths
//! - [`mtime`]: a process-wide modification time cache
//! - [`staleness`]: the depth-first staleness query over the import graph

pub mod artifact;
pub mod error;
pub mod imports;
pub mod mtime;
pub mod packages;
pub mod path;
pub mod staleness;

pub use artifact::ArtifactLayout;
pub use error::{ImportError, PackageError, StalenessError};
pub use imports::{extract_imports, scan_imports, ImportTarget, LineKind, LineScanner};
pub use mtime::MtimeCache;
pub use packages::PackageTable;
pub use staleness::{CompileDecision, Soundness, StalenessOracle, Traversal, Verdict};

/// File extension of source modules
pub const SOURCE_EXTENSION: &str = "mo";

/// Entry file of a directory import
pub const DIRECTORY_ENTRY: &str = "lib.mo";
