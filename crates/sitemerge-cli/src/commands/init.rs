//! Initialize a new sitemerge configuration

use anyhow::Result;
use sitemerge_core::config::CONFIG_FILE;
use std::fs;
use std::path::Path;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let site_dir = Path::new(path);

    // Create directory if it doesn't exist
    if !site_dir.exists() {
        fs::create_dir_all(site_dir)?;
    }

    let abs_path = site_dir.canonicalize()?;

    // Derive site name from directory name if not provided
    let site_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine site name from path"))?,
    };

    let config_path = site_dir.join(CONFIG_FILE);
    if config_path.exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {}",
            site_dir.display(),
            CONFIG_FILE
        );
    }

    tracing::info!("Creating sitemerge configuration: {}", site_name);

    let config = format!(
        r#"# Sitemerge configuration
name: {site_name}

# Skipped in every project
ignore:
  - "{{node_modules,bower_components}}/**"

# Read files into memory (false streams them)
buffer: true

# File pipelines in flight per project, and queue sizes between stages
concurrency: 16
channel_capacity: 64

# all: every matching rule runs, in order; longest_pattern: only the most specific
match_mode: all

# Prefix site-root and relative URLs in HTML and CSS with the project prefix
rewrite_urls: true

rules:
  - pattern: "**/*.html"
    transform:
      inject:
        before: "</body>"
        content: "<!-- {site_name} -->"

  # Link everything that is not rewritten back to its source
  - pattern: "**/*.*"
    transform:
      symlink:
        patterns: ["!**/*.{{html,htm,css}}"]
"#
    );
    fs::write(&config_path, config)?;

    tracing::info!("✓ Created {} at {}", CONFIG_FILE, abs_path.display());
    tracing::info!("");
    tracing::info!("Next steps:");
    tracing::info!("  sitemerge --config {} validate", config_path.display());
    tracing::info!(
        "  sitemerge --config {} export <SRC> <DEST>",
        config_path.display()
    );

    Ok(())
}
