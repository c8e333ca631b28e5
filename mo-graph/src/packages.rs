//! Package table
//!
//! Built once per run from the output of the package manager's source
//! listing (`mops sources`), one declaration per line:
//!
//! ```text
//! --package base .mops/base@0.11.1/src
//! --package test .mops/test@2.0.0/src
//! ```
//!
//! Token 1 is the package name and token 2 its source root. The full token
//! stream is also kept verbatim, because the compiler takes the very same
//! declarations as command line arguments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PackageError;
use crate::path::{normalize, with_appended_extension};
use crate::{DIRECTORY_ENTRY, SOURCE_EXTENSION};

/// Package name to source root mapping, immutable once built
#[derive(Debug, Clone, Default)]
pub struct PackageTable {
    roots: BTreeMap<String, PathBuf>,
    args: Vec<String>,
}

impl PackageTable {
    /// An empty table, for projects without packages
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the table from the package listing output
    pub fn from_declarations(text: &str) -> Result<Self, PackageError> {
        let mut table = Self::default();

        for (index, line) in text.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }

            if tokens.len() < 3 {
                return Err(PackageError::Malformed {
                    line: index + 1,
                    content: line.to_string(),
                });
            }

            table.args.extend(tokens.iter().map(|t| t.to_string()));
            // A repeated name keeps the last root, like the compiler does
            table
                .roots
                .insert(tokens[1].to_string(), PathBuf::from(tokens[2]));
        }

        debug!("Package table: {:?}", table.roots);
        Ok(table)
    }

    /// Anchor relative source roots at `base` (the directory the listing ran in).
    /// Compiler arguments are left untouched.
    pub fn with_base(mut self, base: &Path) -> Self {
        for root in self.roots.values_mut() {
            if root.is_relative() {
                *root = normalize(&base.join(&*root));
            }
        }
        self
    }

    /// Source root of a package
    pub fn resolve(&self, name: &str) -> Option<&Path> {
        self.roots.get(name).map(PathBuf::as_path)
    }

    /// Locate the module `path` inside package `name`.
    ///
    /// `<root>/<path>.mo` is preferred over `<root>/<path>/lib.mo`; a bare
    /// package import refers to `<root>/lib.mo`.
    pub fn source_file(&self, name: &str, path: Option<&str>) -> Option<PathBuf> {
        let root = self.resolve(name)?;

        let candidates = match path {
            Some(rel) => {
                let base = normalize(&root.join(rel));
                vec![
                    with_appended_extension(&base, SOURCE_EXTENSION),
                    base.join(DIRECTORY_ENTRY),
                ]
            }
            None => vec![root.join(DIRECTORY_ENTRY)],
        };

        candidates.into_iter().find(|candidate| candidate.is_file())
    }

    /// Declarations as compiler arguments, in listing order
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
