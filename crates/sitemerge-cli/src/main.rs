//! Sitemerge CLI
//!
//! Exports symlinked site projects into one merged tree.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Sitemerge - merge symlinked site projects into one tree
#[derive(Parser)]
#[command(name = "sitemerge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "sitemerge.yaml", env = "SITEMERGE_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export every project under SRC into DEST
    Export {
        /// Site root holding the project symlinks
        src: String,

        /// Destination directory
        dest: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the projects found under SRC
    Projects {
        /// Site root holding the project symlinks
        src: String,
    },

    /// Validate configuration without exporting
    Validate,

    /// Write a starter configuration
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Site name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Export { src, dest, json } => {
            commands::export::run(&cli.config, &src, &dest, json).await?;
        }
        Commands::Projects { src } => {
            commands::projects::run(&cli.config, &src).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
    }

    Ok(())
}
