//! Extract and display import information

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::*;
use mo_graph::staleness::resolve_local;
use mo_graph::{extract_imports, ImportTarget, PackageTable, Soundness};
use mo_testing::load_packages;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::MoTestConfig;
use crate::utils::{display_path, project_file};

/// Extract and display import information
#[derive(Debug, Args)]
pub struct ImportsArgs {
    /// Input module
    input: PathBuf,
    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
    /// Show transitive dependencies
    #[arg(short, long)]
    transitive: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Tree,
}

/// One import of a module and where it leads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ImportEdge {
    import: String,
    kind: &'static str,
    /// Resolved file, relative to the project root when inside it
    resolved: Option<String>,
    #[serde(skip)]
    target: Option<PathBuf>,
}

/// A module together with its imports
#[derive(Debug, Clone, Serialize)]
struct ModuleImports {
    module: String,
    imports: Vec<ImportEdge>,
}

struct ImportWalker<'a> {
    root: &'a Path,
    packages: &'a PackageTable,
    soundness: Soundness,
}

impl ImportWalker<'_> {
    fn edges(&self, module: &Path) -> Result<Vec<ImportEdge>> {
        let dir = module.parent().unwrap_or(self.root);
        let raw_imports =
            extract_imports(module).with_context(|| format!("Failed to read imports of {}", module.display()))?;

        Ok(raw_imports
            .into_iter()
            .map(|raw| {
                let (kind, target) = match ImportTarget::parse(&raw) {
                    ImportTarget::Local(rel) => ("local", Some(resolve_local(dir, &rel))),
                    ImportTarget::Package { name, path } => {
                        ("package", self.packages.source_file(&name, path.as_deref()))
                    }
                    ImportTarget::Actor(_) => ("actor", None),
                    ImportTarget::Builtin(_) => ("builtin", None),
                };
                ImportEdge {
                    import: raw,
                    kind,
                    resolved: target.as_deref().map(|path| display_path(self.root, path)),
                    target,
                }
            })
            .collect())
    }

    /// Whether the walk continues through an edge
    fn follows(&self, edge: &ImportEdge) -> bool {
        let traversable = match edge.kind {
            "local" => true,
            "package" => self.soundness == Soundness::Strict,
            _ => false,
        };
        traversable && edge.target.as_deref().map_or(false, Path::is_file)
    }

    /// Every module reachable from `start`, each listed once in discovery order
    fn closure(&self, start: &Path) -> Result<Vec<ModuleImports>> {
        let mut visited = HashSet::new();
        let mut stack = vec![start.to_path_buf()];
        let mut modules = Vec::new();
        visited.insert(start.to_path_buf());

        while let Some(module) = stack.pop() {
            let edges = self.edges(&module)?;
            let next: Vec<PathBuf> = edges
                .iter()
                .filter(|edge| self.follows(edge))
                .filter_map(|edge| edge.target.clone())
                .filter(|target| visited.insert(target.clone()))
                .collect();
            stack.extend(next.into_iter().rev());

            modules.push(ModuleImports {
                module: display_path(self.root, &module),
                imports: edges,
            });
        }

        Ok(modules)
    }

    fn print_tree(&self, module: &Path, depth: usize, seen: &mut HashSet<PathBuf>, transitive: bool) -> Result<()> {
        for edge in self.edges(module)? {
            let indent = "  ".repeat(depth + 1);
            let resolved = match &edge.resolved {
                Some(resolved) => resolved.dimmed().to_string(),
                None if edge.kind == "actor" || edge.kind == "builtin" => edge.kind.dimmed().to_string(),
                None => "unresolved".red().to_string(),
            };
            println!("{}{} {} {}", indent, "├─".dimmed(), edge.import.yellow(), resolved);

            if !transitive || !self.follows(&edge) {
                continue;
            }
            if let Some(target) = &edge.target {
                if seen.insert(target.clone()) {
                    self.print_tree(target, depth + 1, seen, transitive)?;
                } else {
                    println!("{}  {}", indent, "(already shown)".dimmed());
                }
            }
        }
        Ok(())
    }
}

pub fn run(root: &Path, config: &MoTestConfig, args: ImportsArgs) -> Result<()> {
    let input = project_file(root, &args.input)?;
    let packages = load_packages(&config.toolchain, root).context("Failed to list package sources")?;

    let walker = ImportWalker {
        root,
        packages: &packages,
        soundness: config.run.soundness(),
    };

    let modules = if args.transitive {
        walker.closure(&input.absolute)?
    } else {
        vec![ModuleImports {
            module: input.relative.display().to_string(),
            imports: walker.edges(&input.absolute)?,
        }]
    };

    match args.format {
        OutputFormat::Text => display_imports_text(&modules),
        OutputFormat::Json => display_imports_json(&modules)?,
        OutputFormat::Tree => {
            println!("{}", input.relative.display().to_string().bold());
            let mut seen = HashSet::from([input.absolute.clone()]);
            walker.print_tree(&input.absolute, 0, &mut seen, args.transitive)?;
        }
    }

    Ok(())
}

fn display_imports_text(modules: &[ModuleImports]) {
    for module in modules {
        println!("{}", module.module.bold().underline());

        if module.imports.is_empty() {
            println!("  {} No imports", "○".dimmed());
        }

        for edge in &module.imports {
            match &edge.resolved {
                Some(resolved) => println!(
                    "  {} {} {} {}",
                    "◆".cyan(),
                    edge.import.yellow(),
                    format!("({})", edge.kind).dimmed(),
                    resolved
                ),
                None if edge.kind == "actor" || edge.kind == "builtin" => println!(
                    "  {} {} {}",
                    "◇".dimmed(),
                    edge.import.yellow(),
                    format!("({})", edge.kind).dimmed()
                ),
                None => println!("  {} {} {}", "◆".red(), edge.import.yellow(), "unresolved".red()),
            }
        }
    }
}

fn display_imports_json(modules: &[ModuleImports]) -> Result<()> {
    let json = serde_json::to_string_pretty(modules).context("Failed to serialize imports")?;
    println!("{}", json);
    Ok(())
}
