//! Configuration management

use anyhow::{bail, Context, Result};
use mo_graph::{ArtifactLayout, Soundness};
use mo_testing::test_discovery::default_patterns;
use mo_testing::ToolchainConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-project configuration file
pub const PROJECT_CONFIG_FILE: &str = "mo-test.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoTestConfig {
    /// External tools
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Test discovery and artifact layout
    #[serde(default)]
    pub tests: TestsConfig,

    /// Run behavior
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestsConfig {
    /// Glob patterns relative to the project root
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Output directory created under each test root
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Extension of compiled artifacts
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Follow package imports transitively and reject unresolved imports
    #[serde(default)]
    pub strict: bool,

    /// Maximum number of concurrent compilations
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Stop after the first failing test
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            output_dir: default_output_dir(),
            artifact_extension: default_artifact_extension(),
        }
    }
}

impl TestsConfig {
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.output_dir, &self.artifact_extension)
    }
}

impl RunConfig {
    pub fn soundness(&self) -> Soundness {
        if self.strict {
            Soundness::Strict
        } else {
            Soundness::Lenient
        }
    }
}

impl MoTestConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise the project file, then the
    /// user configuration file are tried, falling back to defaults.
    pub fn load(config_path: Option<&Path>, root: &Path) -> Result<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            return Self::load_file(path);
        }

        let mut candidates = vec![root.join(PROJECT_CONFIG_FILE)];
        if let Some(user_config) = Self::default_config_path() {
            candidates.push(user_config);
        }

        for candidate in candidates {
            if candidate.is_file() {
                return Self::load_file(&candidate);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: MoTestConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.tests.output_dir.is_empty() || config.tests.artifact_extension.is_empty() {
            bail!(
                "Invalid config file {}: tests.output_dir and tests.artifact_extension must not be empty",
                path.display()
            );
        }

        Ok(config)
    }

    /// User configuration file path
    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mo-test").join("config.toml"))
    }
}

fn default_output_dir() -> String {
    ArtifactLayout::default().dir_name
}

fn default_artifact_extension() -> String {
    ArtifactLayout::default().extension
}
