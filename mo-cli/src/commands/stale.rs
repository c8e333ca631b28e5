//! Explain the compile decision for a single test module

use anyhow::{Context, Result};
use colored::*;
use mo_graph::{CompileDecision, MtimeCache, StalenessOracle};
use mo_testing::load_packages;
use std::path::Path;
use std::sync::Arc;

use crate::config::MoTestConfig;
use crate::utils::{display_path, project_file};

pub fn stale_command(root: &Path, config: &MoTestConfig, file: &Path) -> Result<()> {
    let source = project_file(root, file)?;
    let artifact = config.tests.layout().artifact_path(&source.relative);

    let packages = load_packages(&config.toolchain, root).context("Failed to list package sources")?;
    let oracle = StalenessOracle::new(Arc::new(packages), Arc::new(MtimeCache::new()), config.run.soundness());

    let decision = oracle
        .needs_compile(&source.absolute, &root.join(&artifact))
        .with_context(|| format!("Cannot decide whether {} is stale", source.relative.display()))?;

    println!("{} {}", "Module:".bold(), source.relative.display());
    println!("{} {}", "Artifact:".bold(), artifact.display());

    match decision {
        CompileDecision::MissingArtifact => {
            println!("{} artifact does not exist", "compile".yellow().bold());
        }
        CompileDecision::Stale { culprit } => {
            println!(
                "{} {} changed after the artifact was built",
                "compile".yellow().bold(),
                display_path(root, &culprit)
            );
        }
        CompileDecision::UpToDate => {
            println!("{}", "up to date".green().bold());
        }
    }

    Ok(())
}
