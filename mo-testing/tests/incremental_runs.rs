use mo_graph::{ArtifactLayout, MtimeCache, PackageTable, Soundness, StalenessOracle};
use mo_testing::test_discovery::default_patterns;
use mo_testing::{
    ArtifactStore, CompileOutcome, CompileReason, Compiler, NullReporter, RunStatus, Runtime, TestDiscovery,
    TestRunner, TestRunnerConfig, ToolError,
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

#[cfg(test)]
mod incremental_runs {
    use super::*;

    struct WritingCompiler {
        root: PathBuf,
        compiled: Mutex<Vec<PathBuf>>,
    }

    impl Compiler for WritingCompiler {
        fn compile(&self, source: &Path, artifact: &Path) -> Result<(), ToolError> {
            self.compiled.lock().unwrap().push(source.to_path_buf());
            fs::write(self.root.join(artifact), b"\0asm").unwrap();
            Ok(())
        }
    }

    struct PassingRuntime;

    impl Runtime for PassingRuntime {
        fn run(&self, _artifact: &Path) -> Result<RunStatus, ToolError> {
            Ok(RunStatus::Passed)
        }
    }

    struct Workspace {
        dir: TempDir,
        epoch: SystemTime,
    }

    impl Workspace {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                epoch: SystemTime::now() - Duration::from_secs(10_000),
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        /// Write a file with an mtime `offset` seconds after the epoch
        fn write(&self, rel: &str, content: &str, offset: u64) {
            let path = self.root().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            self.touch(rel, offset);
        }

        fn touch(&self, rel: &str, offset: u64) {
            File::options()
                .write(true)
                .open(self.root().join(rel))
                .unwrap()
                .set_modified(self.epoch + Duration::from_secs(offset))
                .unwrap();
        }

        /// Backdate every existing artifact to `offset` seconds after the epoch
        fn compiled_artifacts_at(&self, offset: u64) {
            for module in self.discovery().discover().unwrap() {
                let artifact = self.root().join(&module.artifact);
                if artifact.exists() {
                    File::options()
                        .write(true)
                        .open(&artifact)
                        .unwrap()
                        .set_modified(self.epoch + Duration::from_secs(offset))
                        .unwrap();
                }
            }
        }

        fn discovery(&self) -> TestDiscovery {
            TestDiscovery::new(self.root(), default_patterns(), ArtifactLayout::default())
        }

        /// One full run with a fresh mtime cache, as a new process would have
        async fn run(&self, packages: PackageTable) -> (Vec<PathBuf>, mo_testing::RunReport) {
            let compiler = Arc::new(WritingCompiler {
                root: self.root().to_path_buf(),
                compiled: Mutex::new(Vec::new()),
            });
            let oracle = StalenessOracle::new(Arc::new(packages), Arc::new(MtimeCache::new()), Soundness::Lenient);
            let runner = TestRunner::new(
                TestRunnerConfig {
                    root: self.root().to_path_buf(),
                    ..TestRunnerConfig::default()
                },
                ArtifactStore::new(self.root(), ArtifactLayout::default()),
                Arc::new(oracle),
                compiler.clone(),
                Arc::new(PassingRuntime),
            );

            let modules = self.discovery().discover().unwrap();
            let report = runner.run(&modules, Arc::new(NullReporter)).await.unwrap();

            let mut compiled = compiler.compiled.lock().unwrap().clone();
            compiled.sort();
            (compiled, report)
        }
    }

    #[tokio::test]
    async fn test_only_affected_modules_are_recompiled() {
        let ws = Workspace::new();
        ws.write("src/Math.mo", "module {}", 0);
        ws.write("src/Text.mo", "module {}", 0);
        ws.write("tests/math.test.mo", "import Math \"../src/Math\";\nactor {}", 0);
        ws.write("tests/text.test.mo", "import Text \"../src/Text\";\nactor {}", 0);
        ws.write(
            "tests/unit/both.test.mo",
            "import Math \"../../src/Math\";\nimport Text \"../../src/Text\";\nactor {}",
            0,
        );

        // First run: nothing has been built yet
        let (compiled, report) = ws.run(PackageTable::empty()).await;
        assert_eq!(compiled.len(), 3);
        assert!(report.records.iter().all(|r| matches!(
            r.compile,
            CompileOutcome::Compiled {
                reason: CompileReason::MissingArtifact
            }
        )));
        assert!(ws.root().join("tests/.wasm/unit/both.test.wasm").is_file());
        assert_eq!(report.stats.passed, 3);

        // Second run: everything is up to date
        ws.compiled_artifacts_at(100);
        let (compiled, report) = ws.run(PackageTable::empty()).await;
        assert!(compiled.is_empty());
        assert_eq!(report.stats.up_to_date, 3);
        assert_eq!(report.stats.passed, 3);

        // Editing a shared module rebuilds only its importers
        ws.touch("src/Text.mo", 200);
        let (compiled, report) = ws.run(PackageTable::empty()).await;
        assert_eq!(
            compiled,
            vec![
                PathBuf::from("tests/text.test.mo"),
                PathBuf::from("tests/unit/both.test.mo"),
            ]
        );
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_package_file_change_triggers_rebuild() {
        let ws = Workspace::new();
        ws.write(".mops/base/src/Array.mo", "module {}", 0);
        ws.write("tests/array.test.mo", "import Array \"mo:base/Array\";\nactor {}", 0);

        let packages = || {
            PackageTable::from_declarations("--package base .mops/base/src")
                .unwrap()
                .with_base(ws.root())
        };

        let (compiled, _) = ws.run(packages()).await;
        assert_eq!(compiled.len(), 1);

        ws.compiled_artifacts_at(100);
        let (compiled, _) = ws.run(packages()).await;
        assert!(compiled.is_empty());

        ws.touch(".mops/base/src/Array.mo", 200);
        let (compiled, report) = ws.run(packages()).await;
        assert_eq!(compiled, vec![PathBuf::from("tests/array.test.mo")]);
        assert_eq!(
            report.records[0].compile,
            CompileOutcome::Compiled {
                reason: CompileReason::Stale {
                    culprit: PathBuf::from(".mops/base/src/Array.mo")
                }
            }
        );
    }
}
