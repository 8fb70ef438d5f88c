//! Configuration parsing and validation
//!
//! This module handles loading and validating `sitemerge.yaml`, the file
//! that declares the ignore list, export tuning and transform rules shared
//! by every project of a merged site.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::project::{DEFAULT_IGNORE, MatchMode, ProjectConfig};
use crate::stages;
use crate::transforms::{StageKind, TransformConfig};

/// Configuration file name looked up inside a directory
pub const CONFIG_FILE: &str = "sitemerge.yaml";

/// Root configuration from `sitemerge.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site name
    #[serde(default = "default_name")]
    pub name: String,

    /// Ignore patterns, relative to each project root
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// Read file contents into memory instead of streaming them
    #[serde(default = "default_true")]
    pub buffer: bool,

    /// Files processed at once per project
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Capacity of the bounded queues between stages
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Rule selection policy
    #[serde(default)]
    pub match_mode: MatchMode,

    /// Register URL rewriting for HTML and CSS ahead of the configured rules
    #[serde(default = "default_true")]
    pub rewrite_urls: bool,

    /// Transform rules, in registration order
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            ignore: default_ignore(),
            buffer: true,
            concurrency: default_concurrency(),
            channel_capacity: default_channel_capacity(),
            match_mode: MatchMode::default(),
            rewrite_urls: true,
            rules: Vec::new(),
        }
    }
}

fn default_name() -> String {
    "site".to_string()
}

fn default_ignore() -> Vec<String> {
    vec![DEFAULT_IGNORE.to_string()]
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    16
}

fn default_channel_capacity() -> usize {
    64
}

/// A single `pattern` → `transform` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Glob pattern over project-relative paths
    pub pattern: String,
    /// Transform applied to matching files
    pub transform: TransformConfig,
}

/// Main configuration container
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Site configuration
    pub site: SiteConfig,

    /// Directory the configuration was loaded from
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory or file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a directory holding `sitemerge.yaml`, or the file itself
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./site")?;
    /// println!("Rules: {}", config.site.rules.len());
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let site: SiteConfig = serde_yaml::from_str(&contents)?;
        let config = Self { site, base_path };
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.site.concurrency == 0 {
            return Err(Error::ConfigInvalid {
                message: "concurrency must be at least 1".to_string(),
            });
        }
        if self.site.channel_capacity == 0 {
            return Err(Error::ConfigInvalid {
                message: "channel_capacity must be at least 1".to_string(),
            });
        }
        // Compiles every glob and stage once
        self.project_template()?;
        Ok(())
    }

    /// Project config holding every configured rule, ready for `for_project`
    pub fn project_template(&self) -> Result<ProjectConfig> {
        let mut project = ProjectConfig::default();
        project.set_ignore(self.site.ignore.iter().cloned());
        project.buffer = self.site.buffer;
        project.match_mode = self.site.match_mode;

        if self.site.rewrite_urls {
            for pattern in ["**/*.{html,htm}", "**/*.css"] {
                project.add_rule(
                    pattern,
                    stages::factory(StageKind::RewriteUrl),
                    serde_json::Value::Null,
                )?;
            }
        }

        for rule in &self.site.rules {
            let (factory, args) = rule.transform.to_rule_parts()?;
            factory.create(&args).map_err(|e| Error::ConfigInvalid {
                message: format!("rule '{}': {e}", rule.pattern),
            })?;
            project.add_rule(&rule.pattern, factory, args)?;
        }

        Ok(project)
    }
}
