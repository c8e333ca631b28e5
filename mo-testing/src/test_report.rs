//! Test reporting module
//!
//! Reporters are notified from compile jobs running on several threads at
//! once, so they only take `&self` and print whole lines.

use colored::Colorize;
use serde::Serialize;

use crate::test_discovery::TestModule;
use crate::test_runner::{CompileOutcome, CompileReason, TestRecord};
use crate::toolchain::RunStatus;

/// Report of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// One record per test module, in discovery order
    pub records: Vec<TestRecord>,

    /// Total duration in milliseconds
    pub duration_ms: u64,

    /// Summary statistics
    pub stats: TestStats,
}

/// Test statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TestStats {
    pub total: usize,
    pub compiled: usize,
    pub up_to_date: usize,
    /// Modules whose staleness check or compilation failed
    pub compile_failed: usize,
    pub passed: usize,
    pub failed: usize,
    /// Ready modules skipped after a fail-fast stop
    pub not_run: usize,
}

impl RunReport {
    pub fn new(records: Vec<TestRecord>, duration_ms: u64) -> Self {
        let mut stats = TestStats {
            total: records.len(),
            ..TestStats::default()
        };

        for record in &records {
            match &record.compile {
                CompileOutcome::Compiled { .. } => stats.compiled += 1,
                CompileOutcome::UpToDate => stats.up_to_date += 1,
                CompileOutcome::CheckFailed { .. } | CompileOutcome::CompileFailed { .. } => {
                    stats.compile_failed += 1
                }
            }

            match record.run {
                Some(RunStatus::Passed) => stats.passed += 1,
                Some(RunStatus::Failed { .. }) => stats.failed += 1,
                None if record.compile.is_ready() => stats.not_run += 1,
                None => {}
            }
        }

        Self {
            records,
            duration_ms,
            stats,
        }
    }

    pub fn is_success(&self) -> bool {
        self.stats.compile_failed == 0 && self.stats.failed == 0 && self.stats.not_run == 0
    }

    /// Records whose module could not be compiled
    pub fn compile_failures(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.iter().filter(|record| record.compile.is_failure())
    }

    /// Records whose test ran and failed
    pub fn test_failures(&self) -> impl Iterator<Item = &TestRecord> {
        self.records
            .iter()
            .filter(|record| matches!(record.run, Some(RunStatus::Failed { .. })))
    }
}

/// Test reporter trait
pub trait Reporter: Send + Sync {
    /// Called once the set of test modules is known
    fn on_discovered(&self, count: usize);

    /// Called when a module is about to be compiled
    fn on_compile_start(&self, module: &TestModule, reason: &CompileReason);

    /// Called when a module's compile phase is over, compiled or not
    fn on_compile_finish(&self, module: &TestModule, outcome: &CompileOutcome);

    /// Called when an artifact starts running
    fn on_run_start(&self, module: &TestModule);

    /// Called when an artifact has finished running
    fn on_run_finish(&self, module: &TestModule, status: &RunStatus);

    /// Called when the run is complete
    fn on_finish(&self, report: &RunReport);
}

/// Console test reporter
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn print_summary(&self, report: &RunReport) {
        println!("\n{}", "Test Summary".bold().underline());
        println!();

        let stats = &report.stats;

        if stats.passed > 0 {
            println!("  {} passed", stats.passed.to_string().green());
        }
        if stats.failed > 0 {
            println!("  {} failed", stats.failed.to_string().red());
        }
        if stats.compile_failed > 0 {
            println!("  {} did not compile", stats.compile_failed.to_string().red());
        }
        if stats.not_run > 0 {
            println!("  {} not run", stats.not_run.to_string().yellow());
        }
        if stats.up_to_date > 0 {
            println!("  {} up to date", stats.up_to_date.to_string().cyan());
        }

        println!();
        println!(
            "Total: {} test modules ({} compiled) in {:.2}s",
            stats.total,
            stats.compiled,
            report.duration_ms as f64 / 1000.0
        );

        if report.is_success() {
            println!("\n{}", "All tests passed!".green().bold());
            return;
        }

        println!("\n{}", "Some tests failed.".red().bold());

        let mut compile_failures = report.compile_failures().peekable();
        if compile_failures.peek().is_some() {
            println!("\nFailed to compile:");
            for record in compile_failures {
                let error = match &record.compile {
                    CompileOutcome::CheckFailed { error } | CompileOutcome::CompileFailed { error } => {
                        error.as_str()
                    }
                    _ => "",
                };
                println!("  - {}: {}", record.module.source.display(), error);
            }
        }

        let mut test_failures = report.test_failures().peekable();
        if test_failures.peek().is_some() {
            println!("\nFailed tests:");
            for record in test_failures {
                println!("  - {}", record.module.source.display());
            }
        }
    }
}

impl Reporter for ConsoleReporter {
    fn on_discovered(&self, count: usize) {
        println!("\n{} {} test modules\n", "Found".bold(), count);
    }

    fn on_compile_start(&self, module: &TestModule, reason: &CompileReason) {
        match reason {
            CompileReason::Stale { culprit } if self.verbose => println!(
                "{} {} ({} changed)",
                "Compiling".cyan(),
                module.source.display(),
                culprit.display()
            ),
            _ => println!("{} {}", "Compiling".cyan(), module.source.display()),
        }
    }

    fn on_compile_finish(&self, module: &TestModule, outcome: &CompileOutcome) {
        match outcome {
            CompileOutcome::CheckFailed { error } | CompileOutcome::CompileFailed { error } => {
                println!("{} {}: {}", "ERROR".red(), module.source.display(), error);
            }
            CompileOutcome::UpToDate if self.verbose => {
                println!("{} {}", "Fresh".dimmed(), module.source.display());
            }
            _ => {}
        }
    }

    fn on_run_start(&self, module: &TestModule) {
        println!("{} {}", "Running".bold(), module.source.display());
    }

    fn on_run_finish(&self, module: &TestModule, status: &RunStatus) {
        match status {
            RunStatus::Passed => println!("{} ... {}", module.source.display(), "PASS".green()),
            RunStatus::Failed { code } => println!(
                "{} ... {} (exit code {})",
                module.source.display(),
                "FAIL".red(),
                code.map_or_else(|| "none".to_string(), |c| c.to_string())
            ),
        }
    }

    fn on_finish(&self, report: &RunReport) {
        self.print_summary(report);
    }
}

/// JSON test reporter; prints the full report once the run is complete
#[derive(Debug, Default)]
pub struct JsonReporter;

impl JsonReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(report: &RunReport) -> serde_json::Result<String> {
        let json_report = serde_json::json!({
            "duration_ms": report.duration_ms,
            "success": report.is_success(),
            "stats": report.stats,
            "records": report.records,
        });
        serde_json::to_string_pretty(&json_report)
    }
}

impl Reporter for JsonReporter {
    fn on_discovered(&self, _count: usize) {}

    fn on_compile_start(&self, _module: &TestModule, _reason: &CompileReason) {}

    fn on_compile_finish(&self, _module: &TestModule, _outcome: &CompileOutcome) {}

    fn on_run_start(&self, _module: &TestModule) {}

    fn on_run_finish(&self, _module: &TestModule, _status: &RunStatus) {}

    fn on_finish(&self, report: &RunReport) {
        match Self::render(report) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::error!("Cannot serialize report: {}", e),
        }
    }
}

/// Reporter that discards every event
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_discovered(&self, _count: usize) {}

    fn on_compile_start(&self, _module: &TestModule, _reason: &CompileReason) {}

    fn on_compile_finish(&self, _module: &TestModule, _outcome: &CompileOutcome) {}

    fn on_run_start(&self, _module: &TestModule) {}

    fn on_run_finish(&self, _module: &TestModule, _status: &RunStatus) {}

    fn on_finish(&self, _report: &RunReport) {}
}
