//! Validate configuration command

use anyhow::{Context, Result};
use sitemerge_core::Config;

/// Run the validate command
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;
    let template = config.project_template()?;

    println!("✓ Site: {}", config.site.name);
    println!("✓ Ignore: {}", config.site.ignore.join(", "));
    println!("✓ Match mode: {:?}", config.site.match_mode);
    println!("✓ Rules: {}", template.rules().len());
    for rule in template.rules() {
        println!("  {} {} → {}", rule.id(), rule.pattern(), rule.factory().name());
    }

    tracing::info!("✓ Configuration is valid");
    Ok(())
}
