//! Artifact path mapping
//!
//! Compiled test modules live in an output directory inserted right below
//! the test root, mirroring the rest of the source tree:
//!
//! ```text
//! tests/foo.Test.mo       -> tests/.wasm/foo.Test.wasm
//! tests/unit/bar.test.mo  -> tests/.wasm/unit/bar.test.wasm
//! ```

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Naming scheme of compiled artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    /// Output directory created under each test root
    pub dir_name: String,

    /// Extension of compiled artifacts
    pub extension: String,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            dir_name: ".wasm".to_string(),
            extension: "wasm".to_string(),
        }
    }
}

impl ArtifactLayout {
    pub fn new(dir_name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            dir_name: dir_name.into(),
            extension: extension.into(),
        }
    }

    /// Artifact path of a source module, given relative to the project root
    pub fn artifact_path(&self, source: &Path) -> PathBuf {
        let mut out = PathBuf::new();
        let mut segments = Vec::new();

        for component in source.components() {
            match component {
                Component::CurDir => {}
                Component::Prefix(_) | Component::RootDir if segments.is_empty() => {
                    out.push(component.as_os_str());
                }
                other => segments.push(other.as_os_str()),
            }
        }

        let Some((file, dirs)) = segments.split_last() else {
            out.push(&self.dir_name);
            return out;
        };

        match dirs.split_first() {
            Some((test_root, rest)) => {
                out.push(test_root);
                out.push(&self.dir_name);
                out.extend(rest);
            }
            None => out.push(&self.dir_name),
        }

        let mut name = PathBuf::from(file);
        name.set_extension(&self.extension);
        out.push(name);
        out
    }

    /// Output directory of a test root
    pub fn output_dir(&self, test_root: &Path) -> PathBuf {
        test_root.join(&self.dir_name)
    }

    /// Whether `path` lies inside an output directory
    pub fn is_in_output_dir(&self, path: &Path) -> bool {
        path.components()
            .any(|c| c.as_os_str() == self.dir_name.as_str())
    }

    /// Test root of a source module (its first directory segment)
    pub fn test_root(source: &Path) -> Option<PathBuf> {
        let mut components = source
            .components()
            .filter(|c| !matches!(c, Component::CurDir));
        let first = components.next()?;
        // A bare file name has no test root
        components.next()?;
        Some(PathBuf::from(first.as_os_str()))
    }
}
