//! Test discovery module
//!
//! Test modules are found by naming convention: files ending in `.test.mo`
//! or `.Test.mo` below a `test/` or `tests/` directory of the project root.

use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};

use mo_graph::ArtifactLayout;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Discovery errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid test pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("I/O error while scanning {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Project root is not valid UTF-8: {path:?}")]
    NonUtf8Root { path: PathBuf },
}

/// A discovered test module and its artifact, both relative to the project root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TestModule {
    pub source: PathBuf,
    pub artifact: PathBuf,
}

impl TestModule {
    pub fn new(source: impl Into<PathBuf>, layout: &ArtifactLayout) -> Self {
        let source = source.into();
        let artifact = layout.artifact_path(&source);
        Self { source, artifact }
    }
}

/// Default patterns, relative to the project root
pub fn default_patterns() -> Vec<String> {
    ["test", "tests"]
        .iter()
        .flat_map(|dir| {
            ["test", "Test"]
                .iter()
                .map(move |suffix| format!("{dir}/**/*.{suffix}.mo"))
        })
        .collect()
}

/// Test discovery
#[derive(Debug, Clone)]
pub struct TestDiscovery {
    root: PathBuf,
    patterns: Vec<String>,
    layout: ArtifactLayout,
    filter: Option<String>,
}

impl TestDiscovery {
    pub fn new(root: impl Into<PathBuf>, patterns: Vec<String>, layout: ArtifactLayout) -> Self {
        Self {
            root: root.into(),
            patterns,
            layout,
            filter: None,
        }
    }

    /// Keep only test modules whose path contains `filter`
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Discover test modules, sorted and free of duplicates
    pub fn discover(&self) -> Result<Vec<TestModule>, DiscoveryError> {
        let root = self.root.to_str().ok_or_else(|| DiscoveryError::NonUtf8Root {
            path: self.root.clone(),
        })?;
        let escaped_root = glob::Pattern::escape(root);

        let mut found = BTreeSet::new();

        for pattern in &self.patterns {
            let full = format!("{}/{}", escaped_root.trim_end_matches('/'), pattern);
            let paths = glob::glob(&full).map_err(|e| DiscoveryError::Pattern {
                pattern: pattern.clone(),
                source: e,
            })?;

            for entry in paths {
                let path = entry.map_err(|e| DiscoveryError::Io {
                    path: e.path().to_path_buf(),
                    source: e.into(),
                })?;

                if !path.is_file() {
                    continue;
                }

                let relative = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();

                if self.layout.is_in_output_dir(&relative) || !self.matches_filter(&relative) {
                    continue;
                }

                found.insert(relative);
            }
        }

        debug!("Discovered {} test modules", found.len());

        Ok(found
            .into_iter()
            .map(|source| TestModule::new(source, &self.layout))
            .collect())
    }

    fn matches_filter(&self, path: &Path) -> bool {
        match &self.filter {
            Some(filter) => path.to_string_lossy().contains(filter.as_str()),
            None => true,
        }
    }

    /// Literal leading directories of the patterns (`tests/**/*.mo` -> `tests`)
    pub fn test_roots(&self) -> Vec<PathBuf> {
        let roots: BTreeSet<PathBuf> = self
            .patterns
            .iter()
            .filter_map(|pattern| match Path::new(pattern).components().next() {
                Some(Component::Normal(first)) => {
                    let first = first.to_string_lossy();
                    let literal = !first.contains(['*', '?', '[', ']']);
                    // A bare file pattern has no directory
                    (literal && first != pattern.as_str()).then(|| PathBuf::from(first.into_owned()))
                }
                _ => None,
            })
            .collect();

        roots.into_iter().collect()
    }
}
