//! Incremental test driver for Motoko test modules
//!
//! Test modules are discovered by naming convention, recompiled only when
//! their artifact is older than something in their import closure, and then
//! executed one by one under a WASI runtime.

pub mod artifact_cache;
pub mod test_discovery;
pub mod test_report;
pub mod test_runner;
pub mod toolchain;

pub use artifact_cache::{ArtifactStats, ArtifactStore, ArtifactStoreError};
pub use test_discovery::{DiscoveryError, TestDiscovery, TestModule};
pub use test_report::{ConsoleReporter, JsonReporter, NullReporter, Reporter, RunReport, TestStats};
pub use test_runner::{CompileOutcome, CompileReason, RunnerError, TestRecord, TestRunner, TestRunnerConfig};
pub use toolchain::{
    load_packages, Compiler, MocCompiler, RunStatus, Runtime, TestOutput, Toolchain, ToolchainConfig, ToolError,
    WasmtimeRuntime,
};
