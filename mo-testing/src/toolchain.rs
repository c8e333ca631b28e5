//! External tools: compiler, runtime, and the package manager
//!
//! Everything here is a thin wrapper around a child process. The
//! [`Compiler`] and [`Runtime`] traits are the seams the test runner is
//! written against.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use mo_graph::{PackageError, PackageTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// External tool errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed with exit code {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Empty command line for {purpose}")]
    EmptyCommand { purpose: String },

    #[error("Invalid package listing: {0}")]
    Packages(#[from] PackageError),
}

/// Compiles one test module into its artifact
pub trait Compiler: Send + Sync {
    /// Paths are relative to the project root
    fn compile(&self, source: &Path, artifact: &Path) -> Result<(), ToolError>;
}

/// Executes one compiled artifact
pub trait Runtime: Send + Sync {
    /// A test failing is a [`RunStatus`], not an error; errors mean the
    /// runtime could not be started.
    fn run(&self, artifact: &Path) -> Result<RunStatus, ToolError>;
}

/// Outcome of executing an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed { code: Option<i32> },
}

impl RunStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, RunStatus::Passed)
    }
}

/// Toolchain settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Explicit compiler binary; located through `cache_command` when unset
    #[serde(default)]
    pub compiler: Option<PathBuf>,

    /// Prints the directory holding the compiler binary
    #[serde(default = "default_cache_command")]
    pub cache_command: Vec<String>,

    /// Prints the package source declarations; empty for no packages
    #[serde(default = "default_sources_command")]
    pub sources_command: Vec<String>,

    /// Flags passed between the package arguments and the source path
    #[serde(default = "default_compiler_flags")]
    pub compiler_flags: Vec<String>,

    /// Runtime executing compiled artifacts
    #[serde(default = "default_runtime")]
    pub runtime: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: None,
            cache_command: default_cache_command(),
            sources_command: default_sources_command(),
            compiler_flags: default_compiler_flags(),
            runtime: default_runtime(),
        }
    }
}

fn default_cache_command() -> Vec<String> {
    vec!["dfx".to_string(), "cache".to_string(), "show".to_string()]
}

fn default_sources_command() -> Vec<String> {
    vec!["mops".to_string(), "sources".to_string()]
}

fn default_compiler_flags() -> Vec<String> {
    vec!["-wasi-system-api".to_string()]
}

fn default_runtime() -> PathBuf {
    PathBuf::from("wasmtime")
}

/// Compiler, runtime, and package table for one run
#[derive(Debug)]
pub struct Toolchain {
    pub compiler: MocCompiler,
    pub runtime: WasmtimeRuntime,
    pub packages: PackageTable,
}

impl Toolchain {
    /// Locate the tools and list package sources, each exactly once
    pub fn discover(config: &ToolchainConfig, working_dir: &Path) -> Result<Self, ToolError> {
        let packages = load_packages(config, working_dir)?;

        let binary = match &config.compiler {
            Some(binary) => binary.clone(),
            None => locate_compiler(&config.cache_command, working_dir)?,
        };
        info!("Using compiler {}", binary.display());

        let compiler = MocCompiler::new(binary, working_dir)
            .with_package_args(packages.args().to_vec())
            .with_flags(config.compiler_flags.clone());
        let runtime = WasmtimeRuntime::new(config.runtime.clone(), working_dir);

        Ok(Self {
            compiler,
            runtime,
            packages,
        })
    }
}

/// Run a command and capture its standard output
fn capture(command: &[String], working_dir: &Path, purpose: &str) -> Result<String, ToolError> {
    let (program, args) = command.split_first().ok_or_else(|| ToolError::EmptyCommand {
        purpose: purpose.to_string(),
    })?;

    debug!("Running {}", command.join(" "));
    let output = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .output()
        .map_err(|e| ToolError::Launch {
            tool: program.clone(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: command.join(" "),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Directory printed by the cache command, joined with the compiler name
pub fn locate_compiler(command: &[String], working_dir: &Path) -> Result<PathBuf, ToolError> {
    let dir = capture(command, working_dir, "compiler cache lookup")?;
    Ok(PathBuf::from(dir.trim()).join("moc"))
}

/// Package table from the configured listing command, rooted at `working_dir`
pub fn load_packages(config: &ToolchainConfig, working_dir: &Path) -> Result<PackageTable, ToolError> {
    if config.sources_command.is_empty() {
        return Ok(PackageTable::empty());
    }

    let listing = list_package_sources(&config.sources_command, working_dir)?;
    Ok(PackageTable::from_declarations(&listing)?.with_base(working_dir))
}

/// Raw package source declarations
pub fn list_package_sources(command: &[String], working_dir: &Path) -> Result<String, ToolError> {
    capture(command, working_dir, "package source listing")
}

/// The Motoko compiler, invoked as
/// `moc <package args...> <flags...> <source> -o <artifact>`
#[derive(Debug, Clone)]
pub struct MocCompiler {
    binary: PathBuf,
    working_dir: PathBuf,
    package_args: Vec<String>,
    flags: Vec<String>,
}

impl MocCompiler {
    pub fn new(binary: impl Into<PathBuf>, working_dir: &Path) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.to_path_buf(),
            package_args: Vec::new(),
            flags: default_compiler_flags(),
        }
    }

    pub fn with_package_args(mut self, args: Vec<String>) -> Self {
        self.package_args = args;
        self
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    /// The full command line for one compilation
    pub fn command_line(&self, source: &Path, artifact: &Path) -> Vec<String> {
        let mut line = vec![self.binary.display().to_string()];
        line.extend(self.package_args.iter().cloned());
        line.extend(self.flags.iter().cloned());
        line.push(source.display().to_string());
        line.push("-o".to_string());
        line.push(artifact.display().to_string());
        line
    }
}

impl Compiler for MocCompiler {
    fn compile(&self, source: &Path, artifact: &Path) -> Result<(), ToolError> {
        let tool = self.binary.display().to_string();

        let output = Command::new(&self.binary)
            .args(&self.package_args)
            .args(&self.flags)
            .arg(source)
            .arg("-o")
            .arg(artifact)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|e| ToolError::Launch {
                tool: tool.clone(),
                source: e,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                tool,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Where a running test's standard output goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TestOutput {
    /// Shared with this process
    #[default]
    Inherit,
    /// Sent to this process's stderr, leaving stdout to a machine-readable report
    Stderr,
}

/// The artifact runtime, invoked as `wasmtime <artifact>`
#[derive(Debug, Clone)]
pub struct WasmtimeRuntime {
    binary: PathBuf,
    working_dir: PathBuf,
    output: TestOutput,
}

impl WasmtimeRuntime {
    pub fn new(binary: impl Into<PathBuf>, working_dir: &Path) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.to_path_buf(),
            output: TestOutput::default(),
        }
    }

    pub fn with_output(mut self, output: TestOutput) -> Self {
        self.output = output;
        self
    }

    fn command(&self, artifact: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg(artifact).current_dir(&self.working_dir);
        if self.output == TestOutput::Stderr {
            command.stdout(Stdio::from(io::stderr()));
        }
        command
    }
}

impl Runtime for WasmtimeRuntime {
    fn run(&self, artifact: &Path) -> Result<RunStatus, ToolError> {
        let status = self.command(artifact).status().map_err(|e| ToolError::Launch {
            tool: self.binary.display().to_string(),
            source: e,
        })?;

        Ok(if status.success() {
            RunStatus::Passed
        } else {
            RunStatus::Failed {
                code: status.code(),
            }
        })
    }
}
