//! mo-test - incremental test runner for Motoko projects
//!
//! Test modules are recompiled only when their artifact is older than a file
//! in their import closure, then run one by one under a WASI runtime.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing::{error, info};

mod commands;
mod config;
mod utils;

use commands::*;
use config::MoTestConfig;

/// mo-test - incremental test runner for Motoko projects
#[derive(Parser)]
#[command(name = "mo-test")]
#[command(about = "Compile stale Motoko test modules and run them")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile stale test modules and run all tests
    Test {
        /// Only run test modules whose path contains this string
        #[arg(long)]
        filter: Option<String>,
        /// Recompile every test module
        #[arg(long)]
        force: bool,
        /// Follow package imports transitively and reject unresolved imports
        #[arg(long)]
        strict: bool,
        /// Maximum number of concurrent compilations
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Stop after the first failing test
        #[arg(long)]
        fail_fast: bool,
        /// Reporter (console, json)
        #[arg(long, value_enum, default_value = "console")]
        reporter: ReporterKind,
    },

    /// Explain whether a test module needs recompiling
    Stale {
        /// Test module
        file: PathBuf,
        /// Follow package imports transitively and reject unresolved imports
        #[arg(long)]
        strict: bool,
    },

    /// Show the imports of a module and how they resolve
    Imports(ImportsArgs),

    /// Remove compiled artifacts
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    let result = run(cli).await;

    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let root = std::fs::canonicalize(&cli.root)
        .with_context(|| format!("Project root not found: {}", cli.root.display()))?;

    // Load configuration
    let mut config = MoTestConfig::load(cli.config.as_deref(), &root)?;

    match cli.command {
        Commands::Test {
            filter,
            force,
            strict,
            jobs,
            fail_fast,
            reporter,
        } => {
            config.run.strict |= strict;
            config.run.fail_fast |= fail_fast;
            if jobs.is_some() {
                config.run.jobs = jobs;
            }
            test_command(&root, &config, filter, force, reporter, cli.verbose).await
        }
        Commands::Stale { file, strict } => {
            config.run.strict |= strict;
            stale_command(&root, &config, &file)
        }
        Commands::Imports(args) => imports::run(&root, &config, args),
        Commands::Clean => clean_command(&root, &config),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // Logs go to stderr so reports keep stdout
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
