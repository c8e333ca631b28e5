//! Staleness detection over the import graph
//!
//! A module is stale with respect to a reference time (the mtime of its
//! compiled artifact) when the module itself, or any module in its import
//! closure, was modified strictly after that time.
//!
//! The query is a depth-first traversal with an explicit stack. Modules are
//! interned into a per-query [`Traversal`] and marked visited when first
//! discovered, before their imports are explored, so cycles terminate and
//! shared dependencies (diamonds) are examined once.
//!
//! Package imports (`mo:<pkg>/<path>`) are handled according to
//! [`Soundness`]:
//!
//! - `Lenient`: the resolved package file's own mtime is checked, its imports
//!   are not followed, and imports that cannot be resolved are skipped.
//! - `Strict`: package files are traversed like local modules and unresolved
//!   imports are errors.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StalenessError};
use crate::imports::{extract_imports, ImportTarget};
use crate::mtime::MtimeCache;
use crate::packages::PackageTable;
use crate::path::{normalize, with_appended_extension};
use crate::{DIRECTORY_ENTRY, SOURCE_EXTENSION};

/// How package imports and unresolved imports are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Soundness {
    #[default]
    Lenient,
    Strict,
}

/// Result of a staleness query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Fresh,
    /// `culprit` is the first file found modified after the reference time
    Stale { culprit: PathBuf },
}

impl Verdict {
    pub fn is_stale(&self) -> bool {
        matches!(self, Verdict::Stale { .. })
    }
}

/// Whether a test module must be (re)compiled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CompileDecision {
    /// No artifact exists yet
    MissingArtifact,
    Stale { culprit: PathBuf },
    UpToDate,
}

impl CompileDecision {
    pub fn should_compile(&self) -> bool {
        !matches!(self, CompileDecision::UpToDate)
    }
}

/// Dense index of a module within one traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-query traversal state: an arena of modules keyed by normalized path
#[derive(Debug, Default)]
pub struct Traversal {
    paths: Vec<PathBuf>,
    index: HashMap<PathBuf, ModuleId>,
    visited: Vec<bool>,
    examined: Vec<u32>,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, path: &Path) -> ModuleId {
        let path = normalize(path);
        if let Some(&id) = self.index.get(&path) {
            return id;
        }

        let id = ModuleId(self.paths.len() as u32);
        self.paths.push(path.clone());
        self.index.insert(path, id);
        self.visited.push(false);
        self.examined.push(0);
        id
    }

    /// Mark a module visited, returning false if it already was
    fn mark(&mut self, id: ModuleId) -> bool {
        !std::mem::replace(&mut self.visited[id.index()], true)
    }

    fn path(&self, id: ModuleId) -> &Path {
        &self.paths[id.index()]
    }

    fn note_examined(&mut self, id: ModuleId) {
        self.examined[id.index()] += 1;
    }

    /// Number of modules marked visited
    pub fn visited_len(&self) -> usize {
        self.visited.iter().filter(|&&v| v).count()
    }

    pub fn is_visited(&self, path: &Path) -> bool {
        self.index
            .get(&normalize(path))
            .map_or(false, |id| self.visited[id.index()])
    }

    /// How many times a module's timestamp was checked in this traversal
    pub fn examined(&self, path: &Path) -> usize {
        self.index
            .get(&normalize(path))
            .map_or(0, |id| self.examined[id.index()] as usize)
    }

    pub fn visited_paths(&self) -> impl Iterator<Item = &Path> {
        self.paths
            .iter()
            .zip(&self.visited)
            .filter(|(_, &visited)| visited)
            .map(|(path, _)| path.as_path())
    }
}

/// Where an import edge leads
enum Edge {
    /// A module whose imports are followed
    Module(PathBuf),
    /// A file whose own timestamp is checked, imports not followed
    Leaf(PathBuf),
    Skip,
}

/// Staleness queries against shared run-wide state
#[derive(Debug, Clone)]
pub struct StalenessOracle {
    packages: Arc<PackageTable>,
    mtimes: Arc<MtimeCache>,
    soundness: Soundness,
}

impl StalenessOracle {
    pub fn new(packages: Arc<PackageTable>, mtimes: Arc<MtimeCache>, soundness: Soundness) -> Self {
        Self {
            packages,
            mtimes,
            soundness,
        }
    }

    pub fn soundness(&self) -> Soundness {
        self.soundness
    }

    pub fn packages(&self) -> &PackageTable {
        &self.packages
    }

    pub fn mtimes(&self) -> &MtimeCache {
        &self.mtimes
    }

    /// Decide whether `source` must be compiled to `artifact`.
    ///
    /// A missing artifact forces compilation without querying the graph.
    /// Otherwise the artifact's own mtime is the reference time.
    pub fn needs_compile(&self, source: &Path, artifact: &Path) -> Result<CompileDecision> {
        let reference = match fs::metadata(artifact).and_then(|m| m.modified()) {
            Ok(time) => time,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(CompileDecision::MissingArtifact);
            }
            Err(e) => return Err(StalenessError::Io { path: artifact.to_path_buf(), source: e }),
        };

        Ok(match self.check(source, reference)? {
            Verdict::Fresh => CompileDecision::UpToDate,
            Verdict::Stale { culprit } => CompileDecision::Stale { culprit },
        })
    }

    pub fn is_stale(&self, module: &Path, reference: SystemTime) -> Result<bool> {
        Ok(self.check(module, reference)?.is_stale())
    }

    /// Staleness query with fresh traversal state
    pub fn check(&self, module: &Path, reference: SystemTime) -> Result<Verdict> {
        self.check_with(&mut Traversal::new(), module, reference)
    }

    /// Staleness query against caller-owned traversal state. A module that is
    /// already visited in `traversal` is reported fresh.
    pub fn check_with(
        &self,
        traversal: &mut Traversal,
        module: &Path,
        reference: SystemTime,
    ) -> Result<Verdict> {
        let root = traversal.intern(module);
        if !traversal.mark(root) {
            return Ok(Verdict::Fresh);
        }

        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let path = traversal.path(id).to_path_buf();
            traversal.note_examined(id);

            if self.mtimes.is_newer(&path, reference)? {
                debug!("{} modified after artifact", path.display());
                return Ok(Verdict::Stale { culprit: path });
            }

            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let mut pending = Vec::new();

            for raw in extract_imports(&path)? {
                match self.resolve_edge(&path, &dir, &raw)? {
                    Edge::Module(target) => {
                        let next = traversal.intern(&target);
                        if traversal.mark(next) {
                            pending.push(next);
                        }
                    }
                    Edge::Leaf(target) => {
                        let next = traversal.intern(&target);
                        if traversal.mark(next) {
                            traversal.note_examined(next);
                            if self.mtimes.is_newer(traversal.path(next), reference)? {
                                let culprit = traversal.path(next).to_path_buf();
                                debug!("package file {} modified after artifact", culprit.display());
                                return Ok(Verdict::Stale { culprit });
                            }
                        }
                    }
                    Edge::Skip => {}
                }
            }

            // Reversed so the first import is explored first
            stack.extend(pending.into_iter().rev());
        }

        Ok(Verdict::Fresh)
    }

    fn resolve_edge(&self, importer: &Path, dir: &Path, raw: &str) -> Result<Edge> {
        match ImportTarget::parse(raw) {
            ImportTarget::Local(rel) => Ok(Edge::Module(resolve_local(dir, &rel))),
            ImportTarget::Actor(target) => {
                debug!("{}: skipping actor import {}", importer.display(), target);
                Ok(Edge::Skip)
            }
            ImportTarget::Builtin(target) => {
                debug!("{}: skipping compiler builtin {}", importer.display(), target);
                Ok(Edge::Skip)
            }
            ImportTarget::Package { name, path } => {
                if self.packages.resolve(&name).is_none() {
                    return match self.soundness {
                        Soundness::Strict => Err(StalenessError::UnresolvedPackage {
                            importer: importer.to_path_buf(),
                            package: name,
                        }),
                        Soundness::Lenient => {
                            warn!("{}: unknown package `{}`, assuming fresh", importer.display(), name);
                            Ok(Edge::Skip)
                        }
                    };
                }

                match (self.packages.source_file(&name, path.as_deref()), self.soundness) {
                    (Some(file), Soundness::Lenient) => Ok(Edge::Leaf(file)),
                    (Some(file), Soundness::Strict) => Ok(Edge::Module(file)),
                    (None, Soundness::Strict) => Err(StalenessError::UnresolvedImport {
                        importer: importer.to_path_buf(),
                        target: raw.to_string(),
                    }),
                    (None, Soundness::Lenient) => {
                        warn!("{}: cannot resolve \"{}\", assuming fresh", importer.display(), raw);
                        Ok(Edge::Skip)
                    }
                }
            }
        }
    }
}

/// Resolve a local import relative to the importing module's directory:
/// `<dir>/<rel>.mo` if it exists, otherwise the directory entry `<dir>/<rel>/lib.mo`.
pub fn resolve_local(dir: &Path, rel: &str) -> PathBuf {
    let base = normalize(&dir.join(rel));
    let file = with_appended_extension(&base, SOURCE_EXTENSION);

    if file.is_file() {
        file
    } else {
        base.join(DIRECTORY_ENTRY)
    }
}
