//! Test runner
//!
//! Runs in two phases:
//!
//! 1. Compile: every test module gets its own blocking job. A job decides
//!    whether the module is stale and, if so, compiles it. Jobs run in
//!    parallel (optionally capped) and are all joined before phase 2.
//! 2. Run: every artifact that is ready is executed sequentially, in
//!    discovery order.
//!
//! A failure to compile one module never stops the others; it is recorded
//! and reported per module at the end.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use mo_graph::{CompileDecision, StalenessOracle};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::artifact_cache::ArtifactStore;
use crate::test_discovery::TestModule;
use crate::test_report::{Reporter, RunReport};
use crate::toolchain::{Compiler, RunStatus, Runtime, ToolError};

/// Test runner configuration
#[derive(Debug, Clone)]
pub struct TestRunnerConfig {
    /// Project root; module paths are relative to it
    pub root: PathBuf,

    /// Recompile every module regardless of staleness
    pub force_rebuild: bool,

    /// Maximum number of concurrent compilations (unbounded when unset)
    pub jobs: Option<usize>,

    /// Stop running artifacts after the first failing test
    pub fail_fast: bool,
}

impl Default for TestRunnerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            force_rebuild: false,
            jobs: None,
            fail_fast: false,
        }
    }
}

/// Runner errors that abort the whole run
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Cannot start the runtime for {artifact:?}: {source}")]
    Runtime {
        artifact: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("Compile job panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Compile scheduler closed: {0}")]
    Scheduler(#[from] tokio::sync::AcquireError),
}

/// Why a module was compiled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CompileReason {
    Forced,
    MissingArtifact,
    Stale { culprit: PathBuf },
}

/// Outcome of the compile phase for one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompileOutcome {
    Compiled { reason: CompileReason },
    UpToDate,
    /// The staleness query failed (missing import, unreadable file, ...)
    CheckFailed { error: String },
    /// The compiler rejected the module or could not be launched
    CompileFailed { error: String },
}

impl CompileOutcome {
    /// Whether an artifact is available to run
    pub fn is_ready(&self) -> bool {
        matches!(self, CompileOutcome::Compiled { .. } | CompileOutcome::UpToDate)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_ready()
    }
}

/// Everything known about one test module after a run
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub module: TestModule,
    pub compile: CompileOutcome,
    /// `None` when the artifact was not run
    pub run: Option<RunStatus>,
}

/// Test runner
pub struct TestRunner {
    config: TestRunnerConfig,
    oracle: Arc<StalenessOracle>,
    compiler: Arc<dyn Compiler>,
    runtime: Arc<dyn Runtime>,
    store: ArtifactStore,
}

impl TestRunner {
    pub fn new(
        config: TestRunnerConfig,
        store: ArtifactStore,
        oracle: Arc<StalenessOracle>,
        compiler: Arc<dyn Compiler>,
        runtime: Arc<dyn Runtime>,
    ) -> Self {
        Self {
            config,
            oracle,
            compiler,
            runtime,
            store,
        }
    }

    /// Compile what is stale, then run every ready artifact
    pub async fn run(
        &self,
        modules: &[TestModule],
        reporter: Arc<dyn Reporter>,
    ) -> Result<RunReport, RunnerError> {
        let start_time = Instant::now();
        let modules = dedup(modules);
        reporter.on_discovered(modules.len());

        let outcomes = self.compile_all(&modules, reporter.clone()).await?;

        let records: Vec<TestRecord> = modules
            .into_iter()
            .zip(outcomes)
            .map(|(module, compile)| TestRecord {
                module,
                compile,
                run: None,
            })
            .collect();

        let runtime = self.runtime.clone();
        let fail_fast = self.config.fail_fast;
        let run_reporter = reporter.clone();
        let records = tokio::task::spawn_blocking(move || {
            run_sequential(runtime.as_ref(), records, run_reporter.as_ref(), fail_fast)
        })
        .await??;

        let report = RunReport::new(records, start_time.elapsed().as_millis() as u64);
        reporter.on_finish(&report);
        Ok(report)
    }

    /// Compile phase: one job per module, all joined before returning.
    /// Outcomes are in the order of `modules`.
    pub async fn compile_all(
        &self,
        modules: &[TestModule],
        reporter: Arc<dyn Reporter>,
    ) -> Result<Vec<CompileOutcome>, RunnerError> {
        // Failures surface per module when the artifact directory is needed
        for dir in self.store.output_dirs(modules) {
            if let Err(e) = self.store.ensure_dir(&dir) {
                debug!("Cannot create {}: {}", dir.display(), e);
            }
        }

        let limiter = self.config.jobs.map(|jobs| Arc::new(Semaphore::new(jobs.max(1))));
        let mut jobs = JoinSet::new();

        for (index, module) in modules.iter().cloned().enumerate() {
            let permit = match &limiter {
                Some(limiter) => Some(limiter.clone().acquire_owned().await?),
                None => None,
            };

            let job = CompileJob {
                root: self.config.root.clone(),
                force: self.config.force_rebuild,
                oracle: self.oracle.clone(),
                compiler: self.compiler.clone(),
                store: self.store.clone(),
                reporter: reporter.clone(),
            };

            jobs.spawn_blocking(move || {
                let outcome = job.execute(&module);
                drop(permit);
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<CompileOutcome>> = vec![None; modules.len()];
        while let Some(joined) = jobs.join_next().await {
            let (index, outcome) = joined?;
            outcomes[index] = Some(outcome);
        }

        info!("Compile phase finished for {} modules", modules.len());

        Ok(outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| CompileOutcome::CheckFailed {
                    error: "compile job produced no outcome".to_string(),
                })
            })
            .collect())
    }
}

/// State moved into one blocking compile job
struct CompileJob {
    root: PathBuf,
    force: bool,
    oracle: Arc<StalenessOracle>,
    compiler: Arc<dyn Compiler>,
    store: ArtifactStore,
    reporter: Arc<dyn Reporter>,
}

impl CompileJob {
    fn execute(&self, module: &TestModule) -> CompileOutcome {
        let outcome = match self.decide(module) {
            Ok(Some(reason)) => self.compile(module, reason),
            Ok(None) => {
                debug!("{} is up to date", module.source.display());
                CompileOutcome::UpToDate
            }
            Err(error) => CompileOutcome::CheckFailed { error },
        };

        self.reporter.on_compile_finish(module, &outcome);
        outcome
    }

    fn decide(&self, module: &TestModule) -> Result<Option<CompileReason>, String> {
        if self.force {
            return Ok(Some(CompileReason::Forced));
        }

        let source = self.root.join(&module.source);
        let artifact = self.root.join(&module.artifact);

        match self.oracle.needs_compile(&source, &artifact) {
            Ok(CompileDecision::UpToDate) => Ok(None),
            Ok(CompileDecision::MissingArtifact) => Ok(Some(CompileReason::MissingArtifact)),
            Ok(CompileDecision::Stale { culprit }) => Ok(Some(CompileReason::Stale {
                culprit: relative_to(&self.root, &culprit),
            })),
            Err(e) => Err(e.to_string()),
        }
    }

    fn compile(&self, module: &TestModule, reason: CompileReason) -> CompileOutcome {
        self.reporter.on_compile_start(module, &reason);

        if let Err(e) = self.store.ensure_parent(&module.artifact) {
            return CompileOutcome::CompileFailed {
                error: e.to_string(),
            };
        }

        match self.compiler.compile(&module.source, &module.artifact) {
            Ok(()) => CompileOutcome::Compiled { reason },
            Err(e) => CompileOutcome::CompileFailed {
                error: e.to_string(),
            },
        }
    }
}

/// Run phase: sequential, in discovery order
fn run_sequential(
    runtime: &dyn Runtime,
    mut records: Vec<TestRecord>,
    reporter: &dyn Reporter,
    fail_fast: bool,
) -> Result<Vec<TestRecord>, RunnerError> {
    let mut stopped = false;

    for record in records.iter_mut() {
        if stopped || !record.compile.is_ready() {
            continue;
        }

        reporter.on_run_start(&record.module);
        let status = runtime
            .run(&record.module.artifact)
            .map_err(|source| RunnerError::Runtime {
                artifact: record.module.artifact.clone(),
                source,
            })?;
        reporter.on_run_finish(&record.module, &status);

        if fail_fast && !status.is_pass() {
            info!("Stopping after first failure: {}", record.module.source.display());
            stopped = true;
        }

        record.run = Some(status);
    }

    Ok(records)
}

/// Drop repeated modules, keeping first occurrences in order
fn dedup(modules: &[TestModule]) -> Vec<TestModule> {
    let mut seen = HashSet::new();
    modules
        .iter()
        .filter(|module| seen.insert(module.source.clone()))
        .cloned()
        .collect()
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    let root = mo_graph::path::normalize(root);
    path.strip_prefix(&root).unwrap_or(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_report::NullReporter;
    use mo_graph::{ArtifactLayout, MtimeCache, PackageTable, Soundness};
    use std::fs::{self, File};
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Records invocations and writes artifacts into the project root
    struct FakeCompiler {
        root: PathBuf,
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
        reject: Option<PathBuf>,
    }

    impl FakeCompiler {
        fn new(root: &Path) -> Self {
            Self {
                root: root.to_path_buf(),
                calls: Mutex::new(Vec::new()),
                reject: None,
            }
        }

        fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    impl Compiler for FakeCompiler {
        fn compile(&self, source: &Path, artifact: &Path) -> Result<(), ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push((source.to_path_buf(), artifact.to_path_buf()));

            if self.reject.as_deref() == Some(source) {
                return Err(ToolError::Failed {
                    tool: "moc".to_string(),
                    code: Some(1),
                    stderr: "type error".to_string(),
                });
            }

            fs::write(self.root.join(artifact), b"\0asm").unwrap();
            Ok(())
        }
    }

    /// Passes every artifact except those listed as failing
    struct FakeRuntime {
        runs: Mutex<Vec<PathBuf>>,
        failing: Vec<PathBuf>,
        launchable: bool,
    }

    impl FakeRuntime {
        fn new() -> Self {
            Self {
                runs: Mutex::new(Vec::new()),
                failing: Vec::new(),
                launchable: true,
            }
        }
    }

    impl Runtime for FakeRuntime {
        fn run(&self, artifact: &Path) -> Result<RunStatus, ToolError> {
            if !self.launchable {
                return Err(ToolError::Launch {
                    tool: "wasmtime".to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }

            self.runs.lock().unwrap().push(artifact.to_path_buf());
            if self.failing.iter().any(|f| f == artifact) {
                Ok(RunStatus::Failed { code: Some(1) })
            } else {
                Ok(RunStatus::Passed)
            }
        }
    }

    struct Project {
        dir: TempDir,
        layout: ArtifactLayout,
    }

    impl Project {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                layout: ArtifactLayout::default(),
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.root().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn set_mtime(&self, rel: &str, time: SystemTime) {
            File::options()
                .write(true)
                .open(self.root().join(rel))
                .unwrap()
                .set_modified(time)
                .unwrap();
        }

        fn module(&self, rel: &str) -> TestModule {
            TestModule::new(rel, &self.layout)
        }

        fn runner(
            &self,
            config: TestRunnerConfig,
            compiler: Arc<FakeCompiler>,
            runtime: Arc<FakeRuntime>,
        ) -> TestRunner {
            let oracle = StalenessOracle::new(
                Arc::new(PackageTable::empty()),
                Arc::new(MtimeCache::new()),
                Soundness::Lenient,
            );
            TestRunner::new(
                TestRunnerConfig {
                    root: self.root().to_path_buf(),
                    ..config
                },
                ArtifactStore::new(self.root(), self.layout.clone()),
                Arc::new(oracle),
                compiler,
                runtime,
            )
        }
    }

    #[tokio::test]
    async fn test_missing_artifact_is_compiled() {
        let project = Project::new();
        project.write("tests/foo.Test.mo", "actor {}");

        let compiler = Arc::new(FakeCompiler::new(project.root()));
        let runtime = Arc::new(FakeRuntime::new());
        let runner = project.runner(TestRunnerConfig::default(), compiler.clone(), runtime.clone());

        let report = runner
            .run(&[project.module("tests/foo.Test.mo")], Arc::new(NullReporter))
            .await
            .unwrap();

        assert_eq!(
            compiler.calls(),
            vec![(
                PathBuf::from("tests/foo.Test.mo"),
                PathBuf::from("tests/.wasm/foo.Test.wasm")
            )]
        );
        assert_eq!(
            report.records[0].compile,
            CompileOutcome::Compiled {
                reason: CompileReason::MissingArtifact
            }
        );
        assert_eq!(report.records[0].run, Some(RunStatus::Passed));
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_fresh_artifact_is_not_recompiled_but_still_runs() {
        let project = Project::new();
        let now = SystemTime::now();
        project.write("tests/foo.Test.mo", "import H \"./helper\";\nactor {}");
        project.write("tests/helper.mo", "module {}");
        project.write("tests/.wasm/foo.Test.wasm", "\0asm");
        project.set_mtime("tests/foo.Test.mo", now - Duration::from_secs(100));
        project.set_mtime("tests/helper.mo", now - Duration::from_secs(100));
        project.set_mtime("tests/.wasm/foo.Test.wasm", now - Duration::from_secs(50));

        let compiler = Arc::new(FakeCompiler::new(project.root()));
        let runtime = Arc::new(FakeRuntime::new());
        let runner = project.runner(TestRunnerConfig::default(), compiler.clone(), runtime.clone());

        let report = runner
            .run(&[project.module("tests/foo.Test.mo")], Arc::new(NullReporter))
            .await
            .unwrap();

        assert!(compiler.calls().is_empty());
        assert_eq!(report.records[0].compile, CompileOutcome::UpToDate);
        assert_eq!(
            *runtime.runs.lock().unwrap(),
            vec![PathBuf::from("tests/.wasm/foo.Test.wasm")]
        );
    }

    #[tokio::test]
    async fn test_stale_dependency_triggers_compile() {
        let project = Project::new();
        let now = SystemTime::now();
        project.write("tests/foo.Test.mo", "import H \"./helper\";\nactor {}");
        project.write("tests/helper.mo", "module {}");
        project.write("tests/.wasm/foo.Test.wasm", "\0asm");
        project.set_mtime("tests/foo.Test.mo", now - Duration::from_secs(100));
        project.set_mtime("tests/.wasm/foo.Test.wasm", now - Duration::from_secs(50));
        project.set_mtime("tests/helper.mo", now - Duration::from_secs(10));

        let compiler = Arc::new(FakeCompiler::new(project.root()));
        let runtime = Arc::new(FakeRuntime::new());
        let runner = project.runner(TestRunnerConfig::default(), compiler.clone(), runtime);

        let report = runner
            .run(&[project.module("tests/foo.Test.mo")], Arc::new(NullReporter))
            .await
            .unwrap();

        assert_eq!(compiler.calls().len(), 1);
        assert_eq!(
            report.records[0].compile,
            CompileOutcome::Compiled {
                reason: CompileReason::Stale {
                    culprit: PathBuf::from("tests/helper.mo")
                }
            }
        );
    }

    #[tokio::test]
    async fn test_force_rebuild() {
        let project = Project::new();
        project.write("tests/a.test.mo", "actor {}");
        project.write("tests/.wasm/a.test.wasm", "\0asm");

        let compiler = Arc::new(FakeCompiler::new(project.root()));
        let runner = project.runner(
            TestRunnerConfig {
                force_rebuild: true,
                ..TestRunnerConfig::default()
            },
            compiler.clone(),
            Arc::new(FakeRuntime::new()),
        );

        let report = runner
            .run(&[project.module("tests/a.test.mo")], Arc::new(NullReporter))
            .await
            .unwrap();

        assert_eq!(compiler.calls().len(), 1);
        assert_eq!(
            report.records[0].compile,
            CompileOutcome::Compiled {
                reason: CompileReason::Forced
            }
        );
    }

    #[tokio::test]
    async fn test_compile_failure_does_not_block_others() {
        let project = Project::new();
        project.write("tests/a.test.mo", "actor {}");
        project.write("tests/b.test.mo", "actor {}");
        project.write("tests/c.test.mo", "import Gone \"./gone\";\nactor {}");
        project.write("tests/.wasm/c.test.wasm", "\0asm");

        let mut compiler = FakeCompiler::new(project.root());
        compiler.reject = Some(PathBuf::from("tests/a.test.mo"));
        let compiler = Arc::new(compiler);
        let runtime = Arc::new(FakeRuntime::new());
        let runner = project.runner(
            TestRunnerConfig {
                jobs: Some(1),
                ..TestRunnerConfig::default()
            },
            compiler.clone(),
            runtime.clone(),
        );

        let modules = vec![
            project.module("tests/a.test.mo"),
            project.module("tests/b.test.mo"),
            project.module("tests/c.test.mo"),
        ];
        let report = runner.run(&modules, Arc::new(NullReporter)).await.unwrap();

        assert!(matches!(report.records[0].compile, CompileOutcome::CompileFailed { .. }));
        assert!(matches!(report.records[1].compile, CompileOutcome::Compiled { .. }));
        assert!(matches!(report.records[2].compile, CompileOutcome::CheckFailed { .. }));
        assert_eq!(
            *runtime.runs.lock().unwrap(),
            vec![PathBuf::from("tests/.wasm/b.test.wasm")]
        );
        assert_eq!(report.stats.compile_failed, 2);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_runs_in_discovery_order_and_continues_after_failure() {
        let project = Project::new();
        let names = ["tests/c.test.mo", "tests/a.test.mo", "tests/b.test.mo"];
        for name in names {
            project.write(name, "actor {}");
        }

        let mut runtime = FakeRuntime::new();
        runtime.failing = vec![PathBuf::from("tests/.wasm/c.test.wasm")];
        let runtime = Arc::new(runtime);
        let runner = project.runner(
            TestRunnerConfig::default(),
            Arc::new(FakeCompiler::new(project.root())),
            runtime.clone(),
        );

        let modules: Vec<_> = names.iter().map(|name| project.module(name)).collect();
        let report = runner.run(&modules, Arc::new(NullReporter)).await.unwrap();

        assert_eq!(
            *runtime.runs.lock().unwrap(),
            vec![
                PathBuf::from("tests/.wasm/c.test.wasm"),
                PathBuf::from("tests/.wasm/a.test.wasm"),
                PathBuf::from("tests/.wasm/b.test.wasm"),
            ]
        );
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.passed, 2);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_after_first_failure() {
        let project = Project::new();
        project.write("tests/a.test.mo", "actor {}");
        project.write("tests/b.test.mo", "actor {}");

        let mut runtime = FakeRuntime::new();
        runtime.failing = vec![PathBuf::from("tests/.wasm/a.test.wasm")];
        let runtime = Arc::new(runtime);
        let runner = project.runner(
            TestRunnerConfig {
                fail_fast: true,
                ..TestRunnerConfig::default()
            },
            Arc::new(FakeCompiler::new(project.root())),
            runtime.clone(),
        );

        let modules = vec![project.module("tests/a.test.mo"), project.module("tests/b.test.mo")];
        let report = runner.run(&modules, Arc::new(NullReporter)).await.unwrap();

        assert_eq!(runtime.runs.lock().unwrap().len(), 1);
        assert_eq!(report.records[1].run, None);
        assert_eq!(report.stats.not_run, 1);
    }

    #[tokio::test]
    async fn test_runtime_launch_failure_aborts() {
        let project = Project::new();
        project.write("tests/a.test.mo", "actor {}");

        let mut runtime = FakeRuntime::new();
        runtime.launchable = false;
        let runner = project.runner(
            TestRunnerConfig::default(),
            Arc::new(FakeCompiler::new(project.root())),
            Arc::new(runtime),
        );

        let error = runner
            .run(&[project.module("tests/a.test.mo")], Arc::new(NullReporter))
            .await
            .unwrap_err();
        assert!(matches!(error, RunnerError::Runtime { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_modules_compile_once() {
        let project = Project::new();
        project.write("tests/a.test.mo", "actor {}");

        let compiler = Arc::new(FakeCompiler::new(project.root()));
        let runner = project.runner(
            TestRunnerConfig::default(),
            compiler.clone(),
            Arc::new(FakeRuntime::new()),
        );

        let module = project.module("tests/a.test.mo");
        let report = runner
            .run(&[module.clone(), module], Arc::new(NullReporter))
            .await
            .unwrap();

        assert_eq!(compiler.calls().len(), 1);
        assert_eq!(report.records.len(), 1);
    }
}
