//! Remove compiled artifacts

use anyhow::{Context, Result};
use colored::*;
use mo_testing::{ArtifactStore, TestDiscovery};
use std::path::Path;

use crate::config::MoTestConfig;

pub fn clean_command(root: &Path, config: &MoTestConfig) -> Result<()> {
    let layout = config.tests.layout();
    let test_roots = TestDiscovery::new(root, config.tests.patterns.clone(), layout.clone()).test_roots();
    let store = ArtifactStore::new(root, layout);

    let stats = store.stats(&test_roots).context("Failed to inspect artifacts")?;
    let removed = store.clear_all(&test_roots).context("Failed to remove artifacts")?;

    if removed == 0 {
        println!("{}", "Nothing to clean".dimmed());
    } else {
        println!(
            "{} {} artifacts ({:.2} MB) from {} output directories",
            "Removed".green().bold(),
            stats.total_artifacts,
            stats.size_mb(),
            removed
        );
    }

    Ok(())
}
