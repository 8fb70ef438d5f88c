//! Export command

use std::path::Path;

use anyhow::{Context, Result};
use sitemerge_runtime::Exporter;

/// Run the export command
pub async fn run(config_path: &str, src: &str, dest: &str, json: bool) -> Result<()> {
    let config = super::load_or_default(config_path)?;
    let exporter = Exporter::from_config(&config).context("Invalid transform rules")?;

    tracing::info!("Exporting {} into {}", src, dest);
    let report = exporter
        .export(Path::new(src), Path::new(dest))
        .await
        .with_context(|| format!("Failed to export {src}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.summaries())?);
    } else {
        for project in &report.projects {
            match &project.error {
                None => println!(
                    "✓ {} ({}): {} files, {} copied, {} linked",
                    project.prefix, project.name, project.files, project.copied, project.linked
                ),
                Some(err) => println!("✗ {} ({}): {}", project.prefix, project.name, err),
            }
        }
    }

    let failed = report.failed().count();
    if failed > 0 {
        anyhow::bail!(
            "{} of {} projects failed to export",
            failed,
            report.project_count()
        );
    }

    tracing::info!("✓ Exported {} projects", report.project_count());
    Ok(())
}
