//! List detected projects

use std::path::Path;

use anyhow::{Context, Result};
use sitemerge_runtime::Exporter;

/// Run the projects command
pub async fn run(config_path: &str, src: &str) -> Result<()> {
    let config = super::load_or_default(config_path)?;
    let exporter = Exporter::from_config(&config)?;

    let projects = exporter
        .projects(Path::new(src))
        .await
        .with_context(|| format!("Failed to scan {src}"))?;

    if projects.is_empty() {
        println!("No projects found in {src}");
        return Ok(());
    }

    for project in &projects {
        println!(
            "{}\t{}\t{}",
            project.prefix(),
            project.name(),
            project.src().display()
        );
    }
    tracing::info!("Found {} projects", projects.len());
    Ok(())
}
