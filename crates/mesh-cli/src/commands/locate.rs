//! mesh-tetra locate command - show where the mesher executables are.

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use mesh_tetra::ExecutableLocator;
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct LocateResult {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_path: Option<String>,
    searched: Vec<String>,
}

fn locate(mut locator: ExecutableLocator, custom: Option<PathBuf>, root: Option<&Path>) -> LocateResult {
    locator.set_custom_path(custom);
    locator.set_search_root(root.map(Path::to_path_buf));
    let searched = locator
        .search_paths()
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    LocateResult {
        name: locator.file_name().to_string(),
        path: locator.resolve().ok().map(|p| p.display().to_string()),
        custom_path: locator.custom_path().map(|p| p.display().to_string()),
        searched,
    }
}

pub fn run(search_root: Option<&Path>, cli: &Cli) -> Result<()> {
    let settings = cli.settings()?;
    let results = vec![
        locate(
            ExecutableLocator::cleaver(),
            settings.executables.cleaver.clone(),
            search_root,
        ),
        locate(
            ExecutableLocator::tetgen(),
            settings.executables.tetgen.clone(),
            search_root,
        ),
    ];

    match cli.format {
        OutputFormat::Json => output::print(&results, cli.format, cli.quiet),
        OutputFormat::Text => {
            if cli.quiet {
                return Ok(());
            }
            for result in &results {
                match &result.path {
                    Some(path) => println!("{} {}: {}", "✓".green().bold(), result.name, path),
                    None => {
                        println!("{} {}: not found", "✗".red().bold(), result.name);
                        for candidate in &result.searched {
                            println!("    {}", candidate.dimmed());
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
